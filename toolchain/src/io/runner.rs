//! Process runner abstraction for external tool invocation.
//!
//! The [`ProcessRunner`] trait decouples toolchains from actually spawning
//! `npm` or the compiler. Tests use a scripted runner that records invocations
//! and returns predetermined outputs without spawning processes.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::process::{CommandOutput, ExecContext, run_command};

/// An external command to run, with its arguments, environment and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(OsString, OsString)>,
    pub workdir: PathBuf,
    /// Stream combined output to the caller's sink while the child runs.
    pub stream: bool,
}

impl ProcessRequest {
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            workdir: workdir.into(),
            stream: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Program file name followed by the arguments, for logs and error messages.
    pub fn display_command(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());
        let mut parts = vec![program];
        parts.extend(self.args.iter().map(|arg| arg.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

/// Abstraction over search-path lookup and subprocess execution.
pub trait ProcessRunner {
    /// Locate `program` on the process search path.
    fn which(&self, program: &str) -> Option<PathBuf>;

    /// Run the request to completion under `ctx`.
    ///
    /// Output is written to `out` only when `request.stream` is set. Returns an error only when
    /// the child could not be started or waited on; a non-zero exit is reported in the output.
    fn run(
        &self,
        request: &ProcessRequest,
        ctx: &ExecContext,
        out: &mut (dyn Write + Send),
    ) -> Result<CommandOutput>;
}

/// Runner that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn which(&self, program: &str) -> Option<PathBuf> {
        match which::which(program) {
            Ok(path) => Some(path),
            Err(err) => {
                debug!(program, err = %err, "program not found on search path");
                None
            }
        }
    }

    #[instrument(skip_all, fields(command = %request.display_command(), streaming = request.stream))]
    fn run(
        &self,
        request: &ProcessRequest,
        ctx: &ExecContext,
        out: &mut (dyn Write + Send),
    ) -> Result<CommandOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(request.env.iter().map(|(key, value)| (key, value)))
            .current_dir(&request.workdir);
        let sink = if request.stream { Some(out) } else { None };
        run_command(cmd, ctx, sink)
    }
}

/// Run the request and turn timeouts, cancellation and non-zero exits into errors.
///
/// When output was not streamed, the captured transcript is attached to the error so the
/// user still sees what the tool printed.
pub fn run_checked(
    runner: &dyn ProcessRunner,
    request: &ProcessRequest,
    ctx: &ExecContext,
    out: &mut (dyn Write + Send),
) -> Result<CommandOutput> {
    let command = request.display_command();
    let output = runner
        .run(request, ctx, out)
        .map_err(|err| err.context(format!("run `{command}`")))?;
    if output.success() {
        return Ok(output);
    }

    let reason = if output.timed_out {
        format!("`{command}` timed out after {:?}", ctx.timeout)
    } else if output.cancelled {
        format!("`{command}` was cancelled")
    } else {
        format!("`{command}` failed with status {:?}", output.exit_code)
    };
    warn!(%reason, "command failed");
    if request.stream {
        return Err(anyhow!(reason));
    }
    let transcript = output.transcript(program_label(&request.program));
    if transcript.is_empty() {
        Err(anyhow!(reason))
    } else {
        Err(anyhow!("{reason}\n{transcript}"))
    }
}

fn program_label(program: &Path) -> &str {
    program
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("command")
}
