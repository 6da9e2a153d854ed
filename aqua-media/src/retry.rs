//! Bounded exponential backoff for provider uploads.

use crate::error::StorageError;
use std::future::Future;
use std::time::Duration;

/// Run `op` up to `max_attempts` times, sleeping `base * 2^(attempt-1)`
/// between attempts. Only [`StorageError::is_retryable`] failures are
/// retried; anything else surfaces immediately.
pub(crate) async fn with_backoff<T, F, Fut>(
    max_attempts: u32,
    base: Duration,
    mut op: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < max_attempts.max(1) => {
                let delay = base * 2u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "storage upload failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(3, Duration::from_millis(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StorageError::Connection("refused".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(5, Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::InvalidUrl("nope".into())) }
        })
        .await;
        assert!(matches!(result, Err(StorageError::InvalidUrl(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let result: Result<(), _> = with_backoff(3, Duration::from_millis(10), || async {
            Err(StorageError::Http(503, "busy".into()))
        })
        .await;
        assert!(matches!(result, Err(StorageError::Http(503, _))));
    }
}
