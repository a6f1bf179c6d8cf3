//! Retry utilities: re-run whole flows that lost an optimistic-concurrency race.
//!
//! Uses `backon` for exponential backoff with jitter. Only errors for which
//! [`ZingyError::is_retryable`] holds are retried; business rejections return
//! on the first attempt.

use std::future::Future;
use std::time::Duration;

use backon::Retryable;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Result, ZingyError};

/// Run `flow` until it succeeds, fails permanently, or the policy gives up.
///
/// Each attempt must be a complete transaction: a retried attempt re-reads
/// everything it guards on.
pub async fn retry_conflicts<T, F, Fut>(policy: &RetryConfig, operation: &str, flow: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    flow.retry(policy.backoff())
        .when(ZingyError::is_retryable)
        .notify(|err: &ZingyError, delay: Duration| {
            warn!(
                operation = %operation,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient conflict"
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn fast_policy(max_times: usize) -> RetryConfig {
        RetryConfig {
            max_times,
            min_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_conflict_is_retried_until_success() {
        let attempts = AtomicU32::new(0);

        let result = retry_conflicts(&fast_policy(5), "test", || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ZingyError::ConcurrencyConflict {
                    entity: "client",
                    id: Uuid::nil(),
                })
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = retry_conflicts(&fast_policy(5), "test", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ZingyError::DuplicatePhone)
        })
        .await;

        assert!(matches!(result, Err(ZingyError::DuplicatePhone)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_times() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = retry_conflicts(&fast_policy(2), "test", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ZingyError::ConcurrencyConflict {
                entity: "client",
                id: Uuid::nil(),
            })
        })
        .await;

        assert!(matches!(result, Err(ZingyError::ConcurrencyConflict { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
