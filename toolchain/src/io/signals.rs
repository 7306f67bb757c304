//! SIGINT/SIGTERM handling for the CLI.
//!
//! Children lead their own process groups, so a terminal Ctrl-C reaches only this
//! process. The handler trips the shared [`CancelToken`]; the wait loop in
//! [`crate::io::process`] then kills the running command's whole group.

use std::sync::OnceLock;

use anyhow::Result;

use crate::io::process::CancelToken;

static TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// Cancel `token` when the process receives SIGINT or SIGTERM. Installs once per process.
#[cfg(unix)]
pub fn cancel_on_interrupt(token: &CancelToken) -> Result<()> {
    use anyhow::{Context, anyhow};
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal};

    TOKEN
        .set(token.clone())
        .map_err(|_| anyhow!("interrupt handler already installed"))?;
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        install(signal, &action).with_context(|| format!("install {signal} handler"))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn cancel_on_interrupt(token: &CancelToken) -> Result<()> {
    let _ = TOKEN.set(token.clone());
    Ok(())
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn install(
    signal: nix::sys::signal::Signal,
    action: &nix::sys::signal::SigAction,
) -> nix::Result<nix::sys::signal::SigAction> {
    // SAFETY: `on_signal` only performs an atomic store through an initialised `OnceLock`.
    unsafe { nix::sys::signal::sigaction(signal, action) }
}

#[cfg(unix)]
extern "C" fn on_signal(_signal: std::ffi::c_int) {
    if let Some(token) = TOKEN.get() {
        token.cancel();
    }
}
