//! Test-only helpers: a scripted process runner and throwaway project directories.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::assemblyscript::COMPILER;
use crate::io::npm::NPM;
use crate::io::process::{CommandOutput, ExecContext};
use crate::io::runner::{ProcessRequest, ProcessRunner};
use crate::toolchain::Project;

/// Canned response for a scripted command.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// The command ran and exited with this output.
    Exit(CommandOutput),
    /// The command could not be started.
    SpawnError,
    /// The command was killed after exceeding its timeout.
    TimedOut,
}

impl Scripted {
    pub fn exit(code: i32) -> Self {
        Self::Exit(CommandOutput {
            exit_code: Some(code),
            ..CommandOutput::default()
        })
    }

    pub fn ok() -> Self {
        Self::exit(0)
    }

    pub fn with_stdout(self, stdout: &str) -> Self {
        match self {
            Self::Exit(output) => Self::Exit(CommandOutput {
                stdout: stdout.as_bytes().to_vec(),
                ..output
            }),
            other => other,
        }
    }

    pub fn with_stderr(self, stderr: &str) -> Self {
        match self {
            Self::Exit(output) => Self::Exit(CommandOutput {
                stderr: stderr.as_bytes().to_vec(),
                ..output
            }),
            other => other,
        }
    }
}

/// Runner that answers from a script and records every request.
///
/// Rules match on the request's display command (`<program file name> <args..>`): a rule
/// `"npm ls"` matches `npm ls --json --depth 0 x` but not `npm lsx`. First match wins;
/// unmatched commands fail as if they could not be started.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    programs: BTreeMap<String, PathBuf>,
    rules: Vec<(String, Scripted)>,
    calls: Mutex<Vec<ProcessRequest>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` resolvable on the search path.
    pub fn with_program(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.programs.insert(name.to_string(), path.into());
        self
    }

    pub fn respond(mut self, command: &str, response: Scripted) -> Self {
        self.rules.push((command.to_string(), response));
        self
    }

    pub fn calls(&self) -> Vec<ProcessRequest> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(ProcessRequest::display_command)
            .collect()
    }

    fn lookup(&self, command: &str) -> Option<Scripted> {
        self.rules
            .iter()
            .find(|(rule, _)| command == rule || command.starts_with(&format!("{rule} ")))
            .map(|(_, response)| response.clone())
    }
}

impl ProcessRunner for ScriptedRunner {
    fn which(&self, program: &str) -> Option<PathBuf> {
        self.programs.get(program).cloned()
    }

    fn run(
        &self,
        request: &ProcessRequest,
        _ctx: &ExecContext,
        out: &mut (dyn Write + Send),
    ) -> Result<CommandOutput> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(request.clone());
        let command = request.display_command();
        match self.lookup(&command) {
            None => Err(anyhow!("no scripted response for `{command}`")),
            Some(Scripted::SpawnError) => {
                Err(io::Error::from(io::ErrorKind::NotFound)).context("spawn command")
            }
            Some(Scripted::TimedOut) => Ok(CommandOutput {
                timed_out: true,
                ..CommandOutput::default()
            }),
            Some(Scripted::Exit(output)) => {
                if request.stream {
                    out.write_all(&output.stdout).context("stream stdout")?;
                    out.write_all(&output.stderr).context("stream stderr")?;
                }
                Ok(output)
            }
        }
    }
}

/// A project root in a temporary directory, removed on drop.
pub struct TestProject {
    temp: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn project<'a>(&self, runner: &'a dyn ProcessRunner) -> Project<'a> {
        Project::new(self.root(), runner, ExecContext::default())
    }

    pub fn write_manifest(&self, contents: &str) -> Result<PathBuf> {
        let path = self.root().join("package.json");
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Manifest declaring the compiler as a dev dependency.
    pub fn write_assemblyscript_manifest(&self) -> Result<PathBuf> {
        self.write_manifest(
            r#"{"name":"app","version":"0.1.0","devDependencies":{"assemblyscript":"^0.19.0"}}"#,
        )
    }

    pub fn npm_bin_dir(&self) -> PathBuf {
        self.root().join("node_modules").join(".bin")
    }

    /// Place an executable compiler stub in the npm bin directory.
    pub fn install_compiler(&self) -> Result<PathBuf> {
        let bin_dir = self.npm_bin_dir();
        fs::create_dir_all(&bin_dir)
            .with_context(|| format!("create directory {}", bin_dir.display()))?;
        let path = bin_dir.join(COMPILER);
        fs::write(&path, "#!/bin/sh\n").with_context(|| format!("write {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("chmod {}", path.display()))?;
        }
        Ok(path)
    }

    /// Runner for a host where npm works and answers for this project.
    pub fn ready_runner(&self) -> ScriptedRunner {
        let bin_dir = format!("{}\n", self.npm_bin_dir().display());
        ScriptedRunner::new()
            .with_program(NPM, "/usr/local/bin/npm")
            .respond("npm bin", Scripted::ok().with_stdout(&bin_dir))
            .respond("npm ls", Scripted::ok())
            .respond("npm install", Scripted::ok().with_stdout("added 1 package\n"))
            .respond(COMPILER, Scripted::ok().with_stdout("compiled\n"))
    }
}
