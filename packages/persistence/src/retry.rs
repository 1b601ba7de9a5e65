//! Bounded retry for transient infrastructure failures.

use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

/// Retry schedule: 3 attempts with 1s/2s/4s backoff between them.
const BACKOFF: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];
const FINAL_BACKOFF: Duration = Duration::from_secs(4);

/// Run `op` with bounded exponential backoff on transient errors.
///
/// Non-transient errors surface immediately. When retries exhaust, the last
/// transient error is returned upward as-is for the caller's policy.
pub async fn retry_transient<T, F, Fut>(label: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut last_err = None;
    for (attempt, delay) in BACKOFF
        .iter()
        .copied()
        .chain(std::iter::once(FINAL_BACKOFF))
        .enumerate()
    {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() => {
                tracing::warn!(op = %label, attempt = attempt + 1, error = %e, "transient failure, backing off");
                last_err = Some(e);
                if attempt < 2 {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| StoreError::Transient(format!("{label}: retries exhausted"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_transient("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Transient("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Transient("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Validation("bad shape".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
