//! Primary → fallback credential retry used by every enrichment call.
//!
//! Three outcomes: a value (from either key), exhaustion (caller substitutes
//! a placeholder or goes without), or a fatal error (abort included), which
//! propagates as `Err` and is never retried.

use std::future::Future;

use tracing::{debug, warn};

use coursepress_shared::{ApiKey, CredentialPair, Result};

use crate::cancel::CancelToken;

/// Where a piece of generated content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationSource {
    Primary,
    Fallback,
    Placeholder,
}

/// Outcome of [`with_fallback`] short of an abort.
#[derive(Debug)]
pub enum Generated<T> {
    Primary(T),
    Fallback(T),
    /// Every configured key failed. Messages are in attempt order.
    Exhausted { errors: Vec<String> },
}

impl<T> Generated<T> {
    pub fn used_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// The value, or `None` if exhausted.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Primary(v) | Self::Fallback(v) => Some(v),
            Self::Exhausted { .. } => None,
        }
    }

    /// The value, or the placeholder when exhausted.
    pub fn or_placeholder(self, placeholder: impl FnOnce() -> T) -> (T, GenerationSource) {
        match self {
            Self::Primary(v) => (v, GenerationSource::Primary),
            Self::Fallback(v) => (v, GenerationSource::Fallback),
            Self::Exhausted { .. } => (placeholder(), GenerationSource::Placeholder),
        }
    }
}

/// Run `call` with the primary key, then once with the fallback key.
///
/// Each attempt is guarded by `cancel`. An abort or any other fatal error is
/// returned as `Err` immediately, with no further attempt even if a fallback
/// key exists.
pub async fn with_fallback<T, F, Fut>(
    cancel: &CancelToken,
    keys: &CredentialPair,
    what: &str,
    mut call: F,
) -> Result<Generated<T>>
where
    F: FnMut(ApiKey) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut errors = Vec::new();

    if let Some(key) = &keys.primary {
        cancel.checkpoint()?;
        match cancel.guard(call(key.clone())).await {
            Ok(value) => return Ok(Generated::Primary(value)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(what, error = %e, "primary credential failed");
                errors.push(e.to_string());
            }
        }
    }

    if let Some(key) = &keys.fallback {
        cancel.checkpoint()?;
        debug!(what, "retrying with fallback credential");
        match cancel.guard(call(key.clone())).await {
            Ok(value) => return Ok(Generated::Fallback(value)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(what, error = %e, "fallback credential failed");
                errors.push(e.to_string());
            }
        }
    }

    Ok(Generated::Exhausted { errors })
}
