//! Error types for coursepress.
//!
//! Library crates use [`PublishError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// The three remote-store checks run before any content is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightCheck {
    /// The remote store answered at all.
    Reachability,
    /// The REST surface the publisher needs is mounted.
    ApiSurface,
    /// The configured principal can authenticate.
    Credentials,
}

impl std::fmt::Display for PreflightCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Reachability => "reachability",
            Self::ApiSurface => "api surface",
            Self::Credentials => "credentials",
        };
        f.write_str(name)
    }
}

/// Top-level error type for all coursepress operations.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Missing or invalid configuration/credentials. Raised before any remote call.
    #[error("config error: {message}")]
    Config { message: String },

    /// A preflight check against the remote store failed.
    #[error("preflight {check} check failed: {message}")]
    Preflight {
        check: PreflightCheck,
        message: String,
    },

    /// Transport-level HTTP failure.
    #[error("network error: {0}")]
    Network(String),

    /// The remote store rejected or mangled a create call.
    #[error("remote store error: {0}")]
    Remote(String),

    /// An enrichment provider call failed.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Input data failed validation.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The run was cancelled. Never treated as a recoverable node failure.
    #[error("publishing aborted")]
    Aborted,

    /// Anything the traversal did not anticipate.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PublishError>;

impl PublishError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a preflight error for the given check.
    pub fn preflight(check: PreflightCheck, msg: impl Into<String>) -> Self {
        Self::Preflight {
            check,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is the cancellation signal rather than a real failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Whether this error ends a publish run (as opposed to degrading one node).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Preflight { .. } | Self::Aborted | Self::Unexpected(_)
        )
    }

    /// Best-effort hint for the user, in place of the raw error string.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Config { .. } => {
                Some("check the env vars named in coursepress.toml (run `coursepress config show`)")
            }
            Self::Preflight {
                check: PreflightCheck::Reachability,
                ..
            } => Some("the remote store did not respond; verify [remote].base_url and your network"),
            Self::Preflight {
                check: PreflightCheck::ApiSurface,
                ..
            } => Some("the remote store is up but its REST API is missing or disabled"),
            Self::Preflight {
                check: PreflightCheck::Credentials,
                ..
            } => Some("the remote store rejected the username/application password"),
            Self::Aborted => Some("the run was cancelled; objects created so far were kept"),
            _ => None,
        }
    }
}
