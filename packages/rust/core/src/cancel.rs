//! Cooperative cancellation for publish runs.
//!
//! A [`CancelToken`] is a one-way flag: once cancelled it stays cancelled.
//! The orchestrator polls it at every loop boundary via [`CancelToken::checkpoint`]
//! and wraps every remote call in [`CancelToken::guard`], which drops the
//! in-flight request as soon as cancellation is observed.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use coursepress_shared::{PublishError, Result};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared, cloneable cancellation handle. One per publish run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; never resets.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!("cancellation requested");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`PublishError::Aborted`] if cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PublishError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` unless cancellation is requested first.
    ///
    /// Checks before starting, then races the call against cancellation.
    /// A cancelled call is dropped and yields [`PublishError::Aborted`].
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.checkpoint()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(PublishError::Aborted),
            out = fut => out,
        }
    }

    /// Like [`guard`](Self::guard) for calls that cannot fail.
    pub async fn guard_infallible<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.guard(async { Ok(fut.await) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancel_is_one_way_and_idempotent() {
        let token = CancelToken::new();
        assert!(token.checkpoint().is_ok());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.checkpoint().unwrap_err().is_abort());
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let handle = token.clone();
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn guard_passes_result_through() {
        let token = CancelToken::new();
        let out = token.guard(async { Ok(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn guard_refuses_to_start_after_cancel() {
        let token = CancelToken::new();
        token.cancel();
        let started = std::sync::atomic::AtomicBool::new(false);
        let err = token
            .guard(async {
                started.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_abort());
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn guard_drops_hung_call_on_cancel() {
        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let hung = async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, PublishError>(())
        };
        let err = tokio::time::timeout(Duration::from_secs(5), token.guard(hung))
            .await
            .expect("guard returned promptly")
            .unwrap_err();
        assert!(err.is_abort());
    }
}
