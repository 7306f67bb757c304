//! Ordered, fail-fast verification checks.
//!
//! Each [`Check`] either succeeds with a progress line or fails with a
//! [`ToolchainError`]. [`run_checks`] runs them in order, writes one progress
//! line per passed check and returns the first failure untouched. Later checks
//! may rely on state recorded by earlier ones.

use std::io::Write;

use anyhow::Context;
use tracing::{info, warn};

use crate::error::ToolchainResult;

/// A single verification step over shared state `S`.
pub struct Check<S> {
    /// Short label used in logs.
    pub name: &'static str,
    pub run: fn(&mut S) -> ToolchainResult<String>,
}

impl<S> Check<S> {
    pub const fn new(name: &'static str, run: fn(&mut S) -> ToolchainResult<String>) -> Self {
        Self { name, run }
    }
}

/// Run `checks` in order, stopping at the first failure.
pub fn run_checks<S>(
    state: &mut S,
    checks: &[Check<S>],
    out: &mut dyn Write,
) -> ToolchainResult<()> {
    for check in checks {
        info!(check = check.name, "running check");
        match (check.run)(state) {
            Ok(line) => {
                writeln!(out, "{line}").context("write progress line")?;
            }
            Err(err) => {
                warn!(check = check.name, remediation = err.is_remediation(), "check failed");
                return Err(err);
            }
        }
    }
    Ok(())
}
