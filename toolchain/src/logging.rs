//! Diagnostics for toolchain runs, written to stderr.
//!
//! Tracing is separate from the progress sink handed to toolchain operations:
//! `RUST_LOG` changes what reaches stderr but never what a user sees on stdout.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Warnings and errors are shown by default; `RUST_LOG` narrows or widens that,
/// e.g. `RUST_LOG=compute_toolchain::io=debug` to trace every npm and asc call.
/// Invalid directives in `RUST_LOG` are ignored rather than aborting the run.
pub fn init() {
    let installed = tracing_subscriber::registry()
        .with(filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .compact(),
        )
        .try_init();
    if let Err(err) = installed {
        eprintln!("warning: tracing already initialised: {err}");
    }
}

fn filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
}
