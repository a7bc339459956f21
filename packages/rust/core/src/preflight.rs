//! Remote-store checks that must all pass before any content is created.

use tracing::{info, instrument};

use coursepress_shared::{PreflightCheck, PublishError, Result};

use crate::cancel::CancelToken;
use crate::services::{CheckResult, RemoteStore};

/// Reachability → API surface → credentials. Stops at the first failure and
/// reports which check it was.
#[instrument(skip_all)]
pub async fn run_preflight(store: &dyn RemoteStore, cancel: &CancelToken) -> Result<()> {
    let reachable = cancel.guard_infallible(store.validate_connection()).await?;
    ensure(PreflightCheck::Reachability, reachable, "remote store is unreachable")?;

    let surface = cancel.guard_infallible(store.check_api_surface()).await?;
    ensure(PreflightCheck::ApiSurface, surface, "remote store API is not available")?;

    let credentials = cancel.guard_infallible(store.verify_credentials()).await?;
    ensure(PreflightCheck::Credentials, credentials, "remote store rejected the credentials")?;

    info!("preflight checks passed");
    Ok(())
}

fn ensure(check: PreflightCheck, result: CheckResult, default_message: &str) -> Result<()> {
    if result.ok {
        return Ok(());
    }
    Err(PublishError::preflight(
        check,
        result.error.unwrap_or_else(|| default_message.to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    #[tokio::test]
    async fn all_checks_pass() {
        let store = FakeStore::new();
        run_preflight(&store, &CancelToken::new()).await.unwrap();
        assert_eq!(store.check_calls(), 3);
    }

    #[tokio::test]
    async fn each_failure_is_reported_distinctly() {
        let cases = [
            (0, PreflightCheck::Reachability),
            (1, PreflightCheck::ApiSurface),
            (2, PreflightCheck::Credentials),
        ];
        for (failing, expected) in cases {
            let store = FakeStore::new().with_failing_check(failing, "nope");
            let err = run_preflight(&store, &CancelToken::new()).await.unwrap_err();
            match err {
                PublishError::Preflight { check, message } => {
                    assert_eq!(check, expected);
                    assert_eq!(message, "nope");
                }
                other => panic!("expected preflight error, got {other:?}"),
            }
            assert_eq!(store.check_calls(), failing + 1, "later checks must not run");
        }
    }

    #[tokio::test]
    async fn cancelled_before_preflight_aborts() {
        let store = FakeStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_preflight(&store, &cancel).await.unwrap_err();
        assert!(err.is_abort());
        assert_eq!(store.check_calls(), 0);
    }
}
