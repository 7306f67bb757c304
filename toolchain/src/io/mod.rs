//! I/O adapters: configuration, filesystem probes, process execution and signals.

pub mod config;
pub mod fs;
pub mod npm;
pub mod process;
pub mod runner;
pub mod signals;
