//! Adapter for the `npm` package manager.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::manifest::parse_manifest;
use crate::io::runner::{ProcessRequest, ProcessRunner, run_checked};
use crate::toolchain::Project;

pub const NPM: &str = "npm";

/// An `npm` executable resolved from the search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Npm {
    path: PathBuf,
}

impl Npm {
    pub fn locate(runner: &dyn ProcessRunner) -> Option<Self> {
        runner.which(NPM).map(|path| Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn request(&self, project: &Project<'_>) -> ProcessRequest {
        ProcessRequest::new(&self.path, project.root())
    }

    /// Directory npm installs package executables into (`npm bin`, trimmed).
    #[instrument(skip_all)]
    pub fn bin_dir(&self, project: &Project<'_>) -> Result<PathBuf> {
        let request = self.request(project).arg("bin");
        let output = run_checked(project.runner(), &request, project.exec(), &mut io::sink())
            .context("get npm bin path")?;
        let path = output.stdout_lossy().trim().to_string();
        if path.is_empty() {
            return Err(anyhow!("`npm bin` printed an empty path"));
        }
        debug!(bin_dir = %path, "resolved npm bin directory");
        Ok(PathBuf::from(path))
    }

    /// `npm install` with no extra arguments, streaming output to `out`.
    #[instrument(skip_all)]
    pub fn install(&self, project: &Project<'_>, out: &mut (dyn Write + Send)) -> Result<()> {
        let request = self.request(project).arg("install").streaming(true);
        run_checked(project.runner(), &request, project.exec(), out)?;
        Ok(())
    }

    /// Whether `name` is available to the project.
    ///
    /// The manifest's dependency tables are consulted first; if they do not declare the
    /// package, npm is asked (`npm ls --json --depth 0 <name>`) and a zero exit means yes.
    /// Never errors: an unreadable manifest or a probe that cannot start means "absent".
    #[instrument(skip(self, project, manifest_path))]
    pub fn dependency_exists(
        &self,
        project: &Project<'_>,
        manifest_path: &Path,
        name: &str,
    ) -> bool {
        let declared = fs::read_to_string(manifest_path)
            .with_context(|| format!("read {}", manifest_path.display()))
            .and_then(|raw| parse_manifest(&raw));
        match declared {
            Ok(manifest) if manifest.declares(name) => {
                debug!("dependency declared in manifest");
                return true;
            }
            Ok(_) => debug!("dependency not declared in manifest, probing npm"),
            Err(err) => warn!(err = %format!("{err:#}"), "manifest unreadable, probing npm"),
        }
        self.probe_dependency(project, name)
    }

    fn probe_dependency(&self, project: &Project<'_>, name: &str) -> bool {
        let request = self
            .request(project)
            .args(["ls", "--json", "--depth", "0", name]);
        match project
            .runner()
            .run(&request, project.exec(), &mut io::sink())
        {
            Ok(output) => {
                debug!(exit_code = ?output.exit_code, "dependency probe finished");
                output.success()
            }
            Err(err) => {
                debug!(err = %format!("{err:#}"), "dependency probe could not start");
                false
            }
        }
    }
}
