//! Verify, initialize and build Compute packages with the project's toolchain.
//!
//! The toolchain is chosen from `language` in `compute.toml` (or `--language`).
//! Progress goes to stdout; errors go to stderr with a stable exit code.

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use compute_toolchain::error::{ToolchainError, ToolchainResult};
use compute_toolchain::exit_codes;
use compute_toolchain::io::config::{CONFIG_FILE, load_config};
use compute_toolchain::io::runner::SystemProcessRunner;
use compute_toolchain::io::signals;
use compute_toolchain::logging;
use compute_toolchain::registry::Registry;
use compute_toolchain::toolchain::{BuildRequest, Project, Toolchain};

#[derive(Parser)]
#[command(
    name = "compute-toolchain",
    version,
    about = "Verify, initialize and build Compute packages"
)]
struct Cli {
    /// Project root. Defaults to the current directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Override the language declared in compute.toml.
    #[arg(long, global = true)]
    language: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the host has everything needed to build the project.
    Verify,
    /// Install the project's dependencies.
    Init,
    /// Compile the project to bin/main.wasm.
    Build {
        /// Stream compiler output and pass its verbose flag.
        #[arg(short, long)]
        verbose: bool,
    },
    /// List supported languages.
    List,
    /// Describe the selected toolchain.
    Info,
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(()) => exit_codes::OK,
        Err(err) => report(&err),
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> ToolchainResult<()> {
    let registry = Registry::default();
    if matches!(cli.command, Command::List) {
        for toolchain in registry.iter() {
            println!("{}\t{}", toolchain.name(), toolchain.display_name());
        }
        return Ok(());
    }

    let root = match cli.dir {
        Some(dir) => std::path::absolute(&dir)
            .with_context(|| format!("resolve project directory {}", dir.display()))?,
        None => std::env::current_dir().context("get current directory")?,
    };
    let config = load_config(&root.join(CONFIG_FILE))?;
    let language = cli.language.unwrap_or_else(|| config.language.clone());
    let toolchain = registry.select(&language)?;

    let exec = config.exec_context();
    signals::cancel_on_interrupt(&exec.cancel)?;

    let runner = SystemProcessRunner;
    let project = Project::new(root, &runner, exec);
    let mut stdout = io::stdout();

    match cli.command {
        Command::Verify => toolchain.verify(&project, &mut stdout),
        Command::Init => toolchain.initialize(&project, &mut stdout),
        Command::Build { verbose } => {
            toolchain.build(&project, BuildRequest { verbose }, &mut stdout)
        }
        Command::Info => {
            print_info(toolchain);
            Ok(())
        }
        Command::List => Ok(()),
    }
}

fn print_info(toolchain: &dyn Toolchain) {
    println!("{} ({})", toolchain.display_name(), toolchain.name());
    println!("source directory: {}", toolchain.source_directory());
    println!("include files: {}", toolchain.include_files().join(", "));
    println!("starter kits:");
    for kit in toolchain.starter_kits() {
        println!("  {} {} @ {}", kit.name, kit.path, kit.tag);
    }
}

fn report(err: &ToolchainError) -> i32 {
    match err {
        ToolchainError::Remediation(err) => {
            eprintln!("Error: {err}");
            exit_codes::NEEDS_REMEDIATION
        }
        ToolchainError::Internal(err) => {
            eprintln!("Error: {err:#}");
            exit_codes::INTERNAL
        }
    }
}
