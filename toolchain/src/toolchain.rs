//! The contract every source-language toolchain implements.
//!
//! Callers hold a `&dyn Toolchain` and never depend on a concrete variant:
//! supporting a new language means adding one implementation and registering
//! it in [`crate::registry`].

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::descriptor::{StarterKit, ToolchainDescriptor};
use crate::error::ToolchainResult;
use crate::io::process::ExecContext;
use crate::io::runner::ProcessRunner;

/// Project a toolchain operates on, plus the collaborators it may use.
pub struct Project<'a> {
    root: PathBuf,
    runner: &'a dyn ProcessRunner,
    exec: ExecContext,
}

impl<'a> Project<'a> {
    pub fn new(root: impl Into<PathBuf>, runner: &'a dyn ProcessRunner, exec: ExecContext) -> Self {
        Self {
            root: root.into(),
            runner,
            exec,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runner(&self) -> &'a dyn ProcessRunner {
        self.runner
    }

    pub fn exec(&self) -> &ExecContext {
        &self.exec
    }
}

/// Options for a single build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildRequest {
    pub verbose: bool,
}

/// A source-language toolchain.
///
/// `verify` must not mutate the project. `initialize` and `build` may write
/// files but must be safe to re-run.
pub trait Toolchain {
    fn descriptor(&self) -> &'static ToolchainDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    fn display_name(&self) -> &'static str {
        self.descriptor().display_name
    }

    fn starter_kits(&self) -> &'static [StarterKit] {
        self.descriptor().starter_kits
    }

    fn source_directory(&self) -> &'static str {
        self.descriptor().source_directory
    }

    fn include_files(&self) -> &'static [&'static str] {
        self.descriptor().include_files
    }

    /// Check the host can build this project, stopping at the first problem.
    fn verify(&self, project: &Project<'_>, out: &mut (dyn Write + Send)) -> ToolchainResult<()>;

    /// Install dependencies for a freshly created project.
    fn initialize(
        &self,
        project: &Project<'_>,
        out: &mut (dyn Write + Send),
    ) -> ToolchainResult<()>;

    /// Compile the project into its binary artifact.
    fn build(
        &self,
        project: &Project<'_>,
        request: BuildRequest,
        out: &mut (dyn Write + Send),
    ) -> ToolchainResult<()>;
}
