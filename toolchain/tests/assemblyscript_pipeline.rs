//! End-to-end scenarios for the AssemblyScript toolchain.
//!
//! Each test drives `verify`, `initialize` or `build` through the `Toolchain`
//! contract against a temporary project and a scripted process runner, then
//! checks the progress output, the error classification and which external
//! commands were (or were not) invoked.

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use compute_toolchain::assemblyscript::AssemblyScript;
use compute_toolchain::error::{Remediation, RemediationError, ToolchainError};
use compute_toolchain::io::npm::NPM;
use compute_toolchain::registry::Registry;
use compute_toolchain::test_support::{Scripted, ScriptedRunner, TestProject};
use compute_toolchain::toolchain::{BuildRequest, Toolchain};

fn remediation(err: ToolchainError) -> RemediationError {
    match err {
        ToolchainError::Remediation(err) => err,
        ToolchainError::Internal(err) => panic!("expected remediation, got internal: {err:#}"),
    }
}

fn lines(out: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(out)
        .lines()
        .map(str::to_string)
        .collect()
}

fn entries(root: &Path) -> Vec<OsString> {
    let mut names: Vec<OsString> = fs::read_dir(root)
        .expect("read dir")
        .map(|entry| entry.expect("dir entry").file_name())
        .collect();
    names.sort();
    names
}

fn node_install_page() -> Remediation {
    Remediation::Visit {
        what: "Node.js and npm".to_string(),
        url: "https://nodejs.org/".to_string(),
    }
}

/// All prerequisites present: four progress lines, in check order, and no writes.
#[test]
fn verify_passes_with_four_progress_lines() {
    let test = TestProject::new().expect("project");
    let manifest = test.write_assemblyscript_manifest().expect("manifest");
    let compiler = test.install_compiler().expect("compiler");
    let runner = test.ready_runner();
    let project = test.project(&runner);
    let registry = Registry::default();
    let toolchain = registry.select("assemblyscript").expect("select");
    let before = entries(test.root());
    let mut out = Vec::new();

    toolchain.verify(&project, &mut out).expect("verify");

    assert_eq!(
        lines(&out),
        vec![
            "Found npm at /usr/local/bin/npm".to_string(),
            format!("Found package.json at {}", manifest.display()),
            "Found assemblyscript in package.json".to_string(),
            format!("Found asc at {}", compiler.display()),
        ]
    );
    // The manifest declares the compiler, so npm is only asked for its bin dir.
    assert_eq!(runner.command_lines(), vec!["npm bin"]);
    assert_eq!(entries(test.root()), before);
}

#[test]
fn verify_without_npm_points_at_node_install() {
    let test = TestProject::new().expect("project");
    test.write_assemblyscript_manifest().expect("manifest");
    let runner = ScriptedRunner::new();
    let project = test.project(&runner);
    let before = entries(test.root());
    let mut out = Vec::new();

    let err = remediation(AssemblyScript.verify(&project, &mut out).unwrap_err());

    assert_eq!(err.cause, "`npm` not found in $PATH");
    assert_eq!(err.remediation, node_install_page());
    assert!(out.is_empty());
    assert!(runner.calls().is_empty());
    assert_eq!(entries(test.root()), before);
}

#[test]
fn initialize_without_npm_points_at_node_install() {
    let test = TestProject::new().expect("project");
    test.write_assemblyscript_manifest().expect("manifest");
    let runner = ScriptedRunner::new();
    let project = test.project(&runner);
    let before = entries(test.root());
    let mut out = Vec::new();

    let err = remediation(AssemblyScript.initialize(&project, &mut out).unwrap_err());

    assert_eq!(err.remediation, node_install_page());
    assert!(runner.calls().is_empty());
    assert_eq!(entries(test.root()), before);
}

/// npm present, manifest absent: stops at the manifest check with `npm init`.
#[test]
fn verify_without_manifest_stops_before_later_checks() {
    let test = TestProject::new().expect("project");
    test.install_compiler().expect("compiler");
    let runner = test.ready_runner();
    let project = test.project(&runner);
    let mut out = Vec::new();

    let err = remediation(AssemblyScript.verify(&project, &mut out).unwrap_err());

    assert_eq!(err.cause, "package.json not found");
    assert_eq!(err.remediation, Remediation::Run("npm init".to_string()));
    assert_eq!(lines(&out), vec!["Found npm at /usr/local/bin/npm"]);
    assert!(runner.calls().is_empty());
}

#[test]
fn verify_reports_missing_compiler_dependency() {
    let test = TestProject::new().expect("project");
    test.write_manifest(r#"{"name":"app","dependencies":{}}"#)
        .expect("manifest");
    let runner = ScriptedRunner::new()
        .with_program(NPM, "/usr/local/bin/npm")
        .respond("npm ls", Scripted::exit(1).with_stdout("{}"));
    let project = test.project(&runner);
    let mut out = Vec::new();

    let err = remediation(AssemblyScript.verify(&project, &mut out).unwrap_err());

    assert_eq!(err.cause, "`assemblyscript` not found in package.json");
    assert_eq!(
        err.remediation,
        Remediation::Run("npm install --save-dev assemblyscript".to_string())
    );
    assert_eq!(
        runner.command_lines(),
        vec!["npm ls --json --depth 0 assemblyscript"]
    );
    assert_eq!(lines(&out).len(), 2);
}

#[test]
fn verify_accepts_dependency_resolved_by_npm() {
    let test = TestProject::new().expect("project");
    test.write_manifest(r#"{"name":"app"}"#).expect("manifest");
    test.install_compiler().expect("compiler");
    let runner = test.ready_runner();
    let project = test.project(&runner);
    let mut out = Vec::new();

    AssemblyScript.verify(&project, &mut out).expect("verify");

    assert_eq!(
        runner.command_lines(),
        vec!["npm ls --json --depth 0 assemblyscript", "npm bin"]
    );
}

/// An unresolvable bin directory and a missing compiler get different fixes.
#[test]
fn bin_dir_failure_and_missing_compiler_are_distinct() {
    let test = TestProject::new().expect("project");
    test.write_assemblyscript_manifest().expect("manifest");

    let broken_npm = ScriptedRunner::new()
        .with_program(NPM, "/usr/local/bin/npm")
        .respond("npm bin", Scripted::exit(1).with_stderr("Unknown command: \"bin\""));
    let project = test.project(&broken_npm);
    let err = remediation(AssemblyScript.verify(&project, &mut Vec::new()).unwrap_err());
    assert_eq!(err.cause, "could not determine npm bin path");
    assert_eq!(
        err.remediation,
        Remediation::Run("npm install --global npm@latest".to_string())
    );

    let runner = test.ready_runner();
    let project = test.project(&runner);
    let err = remediation(AssemblyScript.verify(&project, &mut Vec::new()).unwrap_err());
    assert_eq!(
        err.cause,
        format!("`asc` binary not found in {}", test.npm_bin_dir().display())
    );
    assert_eq!(
        err.remediation,
        Remediation::Run("npm install --save-dev assemblyscript".to_string())
    );
}

/// A compiler that is present but cannot be executed needs reinstalling, not a build attempt.
#[cfg(unix)]
#[test]
fn verify_rejects_non_executable_compiler() {
    use std::os::unix::fs::PermissionsExt;

    let test = TestProject::new().expect("project");
    test.write_assemblyscript_manifest().expect("manifest");
    let compiler = test.install_compiler().expect("compiler");
    fs::set_permissions(&compiler, fs::Permissions::from_mode(0o644)).expect("chmod");
    let runner = test.ready_runner();
    let project = test.project(&runner);

    let mut out = Vec::new();
    let err = remediation(AssemblyScript.verify(&project, &mut out).unwrap_err());
    assert_eq!(
        err.cause,
        format!("`asc` binary not found in {}", test.npm_bin_dir().display())
    );
    assert_eq!(
        err.remediation,
        Remediation::Run("npm install --save-dev assemblyscript".to_string())
    );
    assert_eq!(lines(&out).len(), 3);
}

#[test]
fn initialize_runs_npm_install_and_streams_output() {
    let test = TestProject::new().expect("project");
    test.write_assemblyscript_manifest().expect("manifest");
    let runner = test.ready_runner();
    let project = test.project(&runner);
    let mut out = Vec::new();

    AssemblyScript.initialize(&project, &mut out).expect("initialize");

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].display_command(), "npm install");
    assert!(calls[0].stream);
    assert_eq!(calls[0].workdir, test.root());
    let out = lines(&out);
    assert_eq!(out.len(), 3);
    assert!(out[0].starts_with("Found npm at"));
    assert!(out[1].starts_with("Found package.json at"));
    assert_eq!(out[2], "added 1 package");
}

#[test]
fn initialize_twice_succeeds() {
    let test = TestProject::new().expect("project");
    test.write_assemblyscript_manifest().expect("manifest");
    let runner = test.ready_runner();
    let project = test.project(&runner);

    AssemblyScript
        .initialize(&project, &mut Vec::new())
        .expect("first");
    AssemblyScript
        .initialize(&project, &mut Vec::new())
        .expect("second");
    assert_eq!(runner.command_lines(), vec!["npm install", "npm install"]);
}

#[test]
fn initialize_without_manifest_does_not_install() {
    let test = TestProject::new().expect("project");
    let runner = test.ready_runner();
    let project = test.project(&runner);

    let err = remediation(
        AssemblyScript
            .initialize(&project, &mut Vec::new())
            .unwrap_err(),
    );
    assert_eq!(err.remediation, Remediation::Run("npm init".to_string()));
    assert!(runner.calls().is_empty());
}

#[test]
fn failed_install_is_internal() {
    let test = TestProject::new().expect("project");
    test.write_assemblyscript_manifest().expect("manifest");
    let runner = ScriptedRunner::new()
        .with_program(NPM, "/usr/local/bin/npm")
        .respond("npm install", Scripted::exit(1).with_stderr("npm ERR! network"));
    let project = test.project(&runner);
    let mut out = Vec::new();

    let err = AssemblyScript.initialize(&project, &mut out).unwrap_err();
    assert!(!err.is_remediation());
    assert!(String::from_utf8_lossy(&out).contains("npm ERR! network"));
}

/// Building twice targets the same artifact and tolerates the existing bin dir.
#[test]
fn build_is_repeatable() {
    let test = TestProject::new().expect("project");
    test.write_assemblyscript_manifest().expect("manifest");
    let runner = test.ready_runner();
    let project = test.project(&runner);
    let request = BuildRequest { verbose: false };

    AssemblyScript
        .build(&project, request, &mut Vec::new())
        .expect("first build");
    assert!(test.root().join("bin").is_dir());
    AssemblyScript
        .build(&project, request, &mut Vec::new())
        .expect("second build");

    let compiles: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|call| call.program.ends_with("asc"))
        .collect();
    assert_eq!(compiles.len(), 2);
    assert_eq!(compiles[0], compiles[1]);
    assert_eq!(compiles[0].program, test.npm_bin_dir().join("asc"));
    assert_eq!(compiles[0].workdir, test.root());
    let artifact = test.root().join("bin").join("main.wasm");
    let output_arg = compiles[0]
        .args
        .iter()
        .position(|arg| arg == "--binaryFile")
        .map(|index| compiles[0].args[index + 1].clone());
    assert_eq!(output_arg, Some(artifact.into_os_string()));
}

#[test]
fn quiet_build_captures_compiler_output() {
    let test = TestProject::new().expect("project");
    let runner = test.ready_runner();
    let project = test.project(&runner);
    let mut out = Vec::new();

    AssemblyScript
        .build(&project, BuildRequest { verbose: false }, &mut out)
        .expect("build");

    let compile = runner.calls().pop().expect("compile call");
    assert!(!compile.stream);
    assert!(!compile.args.iter().any(|arg| arg == "--verbose"));
    assert!(out.is_empty());
}

#[test]
fn verbose_build_streams_and_passes_flag_last() {
    let test = TestProject::new().expect("project");
    let runner = test.ready_runner();
    let project = test.project(&runner);
    let mut out = Vec::new();

    AssemblyScript
        .build(&project, BuildRequest { verbose: true }, &mut out)
        .expect("build");

    let compile = runner.calls().pop().expect("compile call");
    assert!(compile.stream);
    assert_eq!(
        compile.args.last().map(|arg| arg.to_string_lossy().into_owned()),
        Some("--verbose".to_string())
    );
    assert_eq!(
        compile.args.iter().filter(|arg| *arg == "--verbose").count(),
        1
    );
    assert_eq!(lines(&out), vec!["compiled"]);
}

#[test]
fn compiler_failure_is_internal_with_output() {
    let test = TestProject::new().expect("project");
    let runner = ScriptedRunner::new()
        .with_program(NPM, "/usr/local/bin/npm")
        .respond(
            "npm bin",
            Scripted::ok().with_stdout(&format!("{}\n", test.npm_bin_dir().display())),
        )
        .respond(
            "asc",
            Scripted::exit(1).with_stderr("ERROR TS2304: Cannot find name 'foo'."),
        );
    let project = test.project(&runner);

    let err = AssemblyScript
        .build(&project, BuildRequest::default(), &mut Vec::new())
        .unwrap_err();

    assert!(!err.is_remediation());
    let msg = match err {
        ToolchainError::Internal(err) => format!("{err:#}"),
        ToolchainError::Remediation(err) => panic!("unexpected remediation: {err}"),
    };
    assert!(msg.contains("compile AssemblyScript"));
    assert!(msg.contains("Cannot find name 'foo'"));
}

#[test]
fn build_without_npm_is_internal() {
    let test = TestProject::new().expect("project");
    let runner = ScriptedRunner::new();
    let project = test.project(&runner);

    let err = AssemblyScript
        .build(&project, BuildRequest::default(), &mut Vec::new())
        .unwrap_err();
    assert!(!err.is_remediation());
    assert!(runner.calls().is_empty());
}

#[test]
fn build_fails_when_output_dir_is_a_file() {
    let test = TestProject::new().expect("project");
    fs::write(test.root().join("bin"), "not a directory").expect("write");
    let runner = test.ready_runner();
    let project = test.project(&runner);

    let err = AssemblyScript
        .build(&project, BuildRequest::default(), &mut Vec::new())
        .unwrap_err();
    assert!(!err.is_remediation());
    assert!(format!("{:#}", err_chain(err)).contains("make bin directory"));
    assert!(runner.calls().is_empty());
}

fn err_chain(err: ToolchainError) -> anyhow::Error {
    match err {
        ToolchainError::Internal(err) => err,
        ToolchainError::Remediation(err) => anyhow::Error::new(err),
    }
}
