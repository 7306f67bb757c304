//! Pluggable source-language toolchains for compiling Compute packages to Wasm.
//!
//! Every supported language implements the [`toolchain::Toolchain`] contract:
//! verify the host, install dependencies, build the artifact. The crate is
//! split the same way the work is:
//!
//! - **[`core`]**: Pure data (descriptors, manifest parsing). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, filesystem, process execution,
//!   npm). Process execution sits behind [`io::runner::ProcessRunner`] so tests
//!   can script it.
//!
//! [`pipeline`] runs ordered, fail-fast checks; [`assemblyscript`] is the
//! shipped toolchain and [`registry`] maps language names to toolchains.

pub mod assemblyscript;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod toolchain;
