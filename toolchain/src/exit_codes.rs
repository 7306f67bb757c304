//! Stable exit codes for the `compute-toolchain` CLI.

/// Command succeeded.
pub const OK: i32 = 0;
/// Unexpected failure: bad config, filesystem errors, failed subprocesses.
pub const INTERNAL: i32 = 1;
/// The host or project needs a fix the user can apply (see the printed remediation).
pub const NEEDS_REMEDIATION: i32 = 2;
