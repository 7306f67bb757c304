//! AssemblyScript toolchain: npm-managed `asc` compiling `src/index.ts` to Wasm.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::descriptor::{StarterKit, ToolchainDescriptor};
use crate::error::{RemediationError, ToolchainResult};
use crate::io::fs::{executable_exists, file_exists, make_directory_if_not_exists};
use crate::io::npm::Npm;
use crate::io::runner::{ProcessRequest, run_checked};
use crate::pipeline::{Check, run_checks};
use crate::toolchain::{BuildRequest, Project, Toolchain};

pub const MANIFEST: &str = "package.json";
pub const COMPILER_PACKAGE: &str = "assemblyscript";
pub const COMPILER: &str = "asc";
pub const ENTRY_POINT: &str = "src/index.ts";
pub const OUTPUT_DIR: &str = "bin";
pub const ARTIFACT: &str = "main.wasm";

const NODE_URL: &str = "https://nodejs.org/";
const NPM_INIT: &str = "npm init";
const INSTALL_COMPILER: &str = "npm install --save-dev assemblyscript";
const UPGRADE_NPM: &str = "npm install --global npm@latest";

static DESCRIPTOR: ToolchainDescriptor = ToolchainDescriptor {
    name: "assemblyscript",
    display_name: "AssemblyScript (beta)",
    source_directory: "src",
    include_files: &[MANIFEST],
    starter_kits: &[StarterKit {
        name: "Default",
        path: "https://github.com/fastly/compute-starter-kit-assemblyscript-default",
        tag: "v0.1.0",
    }],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyScript;

impl Toolchain for AssemblyScript {
    fn descriptor(&self) -> &'static ToolchainDescriptor {
        &DESCRIPTOR
    }

    #[instrument(skip_all, fields(root = %project.root().display()))]
    fn verify(&self, project: &Project<'_>, out: &mut (dyn Write + Send)) -> ToolchainResult<()> {
        let mut probe = Probe::new(project);
        run_checks(&mut probe, &verify_checks(), out)
    }

    #[instrument(skip_all, fields(root = %project.root().display()))]
    fn initialize(
        &self,
        project: &Project<'_>,
        out: &mut (dyn Write + Send),
    ) -> ToolchainResult<()> {
        let mut probe = Probe::new(project);
        run_checks(&mut probe, &environment_checks(), &mut *out)?;
        let npm = probe.npm()?;
        npm.install(project, out).context("install dependencies")?;
        Ok(())
    }

    #[instrument(skip_all, fields(root = %project.root().display(), verbose = request.verbose))]
    fn build(
        &self,
        project: &Project<'_>,
        request: BuildRequest,
        out: &mut (dyn Write + Send),
    ) -> ToolchainResult<()> {
        let output_dir = project.root().join(OUTPUT_DIR);
        if make_directory_if_not_exists(&output_dir).context("make bin directory")? {
            info!(dir = %output_dir.display(), "created output directory");
        }

        let npm = Npm::locate(project.runner())
            .ok_or_else(|| anyhow!("`npm` not found in $PATH"))?;
        let bin_dir = npm.bin_dir(project)?;

        let compile = ProcessRequest::new(bin_dir.join(COMPILER), project.root())
            .args(compiler_arguments(&output_dir, request))
            .streaming(request.verbose);
        run_checked(project.runner(), &compile, project.exec(), out)
            .context("compile AssemblyScript")?;

        info!(artifact = %output_dir.join(ARTIFACT).display(), "build finished");
        Ok(())
    }
}

/// Fixed-shape `asc` arguments. Only `output_dir` varies, and it is derived from the project root.
pub fn compiler_arguments(output_dir: &Path, request: BuildRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        ENTRY_POINT.into(),
        "--binaryFile".into(),
        output_dir.join(ARTIFACT).into_os_string(),
        "--optimize".into(),
        "--noAssert".into(),
    ];
    if request.verbose {
        args.push("--verbose".into());
    }
    args
}

/// State shared between verification checks.
struct Probe<'p, 'r> {
    project: &'p Project<'r>,
    npm: Option<Npm>,
    manifest: Option<PathBuf>,
}

impl<'p, 'r> Probe<'p, 'r> {
    fn new(project: &'p Project<'r>) -> Self {
        Self {
            project,
            npm: None,
            manifest: None,
        }
    }

    fn npm(&self) -> anyhow::Result<&Npm> {
        self.npm
            .as_ref()
            .ok_or_else(|| anyhow!("npm has not been located"))
    }

    fn manifest(&self) -> anyhow::Result<&Path> {
        self.manifest
            .as_deref()
            .ok_or_else(|| anyhow!("package.json has not been located"))
    }
}

fn environment_checks<'p, 'r>() -> [Check<Probe<'p, 'r>>; 2] {
    [
        Check::new("npm", find_npm),
        Check::new("manifest", find_manifest),
    ]
}

fn verify_checks<'p, 'r>() -> [Check<Probe<'p, 'r>>; 4] {
    let [npm, manifest] = environment_checks();
    [
        npm,
        manifest,
        Check::new("compiler dependency", find_compiler_dependency),
        Check::new("compiler binary", find_compiler),
    ]
}

fn find_npm(probe: &mut Probe<'_, '_>) -> ToolchainResult<String> {
    info!("checking if npm is installed");
    let npm = Npm::locate(probe.project.runner()).ok_or_else(|| {
        RemediationError::visit("`npm` not found in $PATH", "Node.js and npm", NODE_URL)
    })?;
    let line = format!("Found npm at {}", npm.path().display());
    probe.npm = Some(npm);
    Ok(line)
}

fn find_manifest(probe: &mut Probe<'_, '_>) -> ToolchainResult<String> {
    let path = std::path::absolute(probe.project.root().join(MANIFEST))
        .context("get package.json path")?;
    if !file_exists(&path) {
        return Err(RemediationError::run("package.json not found", NPM_INIT).into());
    }
    let line = format!("Found package.json at {}", path.display());
    probe.manifest = Some(path);
    Ok(line)
}

fn find_compiler_dependency(probe: &mut Probe<'_, '_>) -> ToolchainResult<String> {
    info!("checking if AssemblyScript is installed");
    let npm = probe.npm()?;
    let manifest = probe.manifest()?;
    if !npm.dependency_exists(probe.project, manifest, COMPILER_PACKAGE) {
        return Err(RemediationError::run(
            format!("`{COMPILER_PACKAGE}` not found in {MANIFEST}"),
            INSTALL_COMPILER,
        )
        .into());
    }
    Ok(format!("Found {COMPILER_PACKAGE} in {MANIFEST}"))
}

fn find_compiler(probe: &mut Probe<'_, '_>) -> ToolchainResult<String> {
    let npm = probe.npm()?;
    let bin_dir = npm.bin_dir(probe.project).map_err(|err| {
        warn!(err = %format!("{err:#}"), "npm bin lookup failed");
        RemediationError::run("could not determine npm bin path", UPGRADE_NPM)
    })?;
    let path = bin_dir.join(COMPILER);
    if !executable_exists(&path) {
        debug!(path = %path.display(), "compiler binary missing or not executable");
        return Err(RemediationError::run(
            format!("`{COMPILER}` binary not found in {}", bin_dir.display()),
            INSTALL_COMPILER,
        )
        .into());
    }
    Ok(format!("Found {COMPILER} at {}", path.display()))
}
