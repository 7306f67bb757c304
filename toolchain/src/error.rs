//! Error types returned by toolchain operations.
//!
//! Callers pattern-match on [`ToolchainError`] to decide how to display a
//! failure: remediation errors are shown verbatim with their fix, internal
//! errors are shown with their context chain.

use std::fmt;

use thiserror::Error;

/// Concrete corrective action attached to a [`RemediationError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
    /// Run a shell command in the project directory.
    Run(String),
    /// Install something by visiting a URL.
    Visit { what: String, url: String },
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(command) => write!(
                f,
                "To fix this error, run the following command:\n\n\t$ {command}"
            ),
            Self::Visit { what, url } => {
                write!(f, "To fix this error, install {what} by visiting:\n\n\t{url}")
            }
        }
    }
}

/// User-actionable misconfiguration: what is wrong and how to fix it.
///
/// Displays as two parts: the cause, a blank line, then the fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause}\n\n{remediation}")]
pub struct RemediationError {
    pub cause: String,
    pub remediation: Remediation,
}

impl RemediationError {
    /// Remediation that asks the user to run `command`.
    pub fn run(cause: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            remediation: Remediation::Run(command.into()),
        }
    }

    /// Remediation that points the user at an install page.
    pub fn visit(
        cause: impl Into<String>,
        what: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            cause: cause.into(),
            remediation: Remediation::Visit {
                what: what.into(),
                url: url.into(),
            },
        }
    }
}

/// Failure of a toolchain operation.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// The host or project needs a fix the user can apply.
    #[error(transparent)]
    Remediation(#[from] RemediationError),
    /// Anything else: path resolution, directory creation, subprocess failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ToolchainError {
    pub fn remediation(&self) -> Option<&RemediationError> {
        match self {
            Self::Remediation(err) => Some(err),
            Self::Internal(_) => None,
        }
    }

    pub fn is_remediation(&self) -> bool {
        self.remediation().is_some()
    }
}

pub type ToolchainResult<T> = Result<T, ToolchainError>;
