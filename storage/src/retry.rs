//! Exponential backoff shared by every backend's transient-failure path.
use std::future::Future;
use std::time::Duration;
use vex_types::{Error, RetryConfig};

/// Runs `op`, retrying on `Error::StorageTransient` with exponential backoff
/// until `config.max_retries` is exhausted. Permanent errors and successes
/// both return immediately.
#[tracing::instrument(skip(op, config))]
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut delay_ms = config.initial_delay_ms;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                tracing::warn!(attempt, %err, delay_ms, "retrying after transient storage error");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = ((delay_ms as f64) * config.multiplier) as u64;
                delay_ms = delay_ms.min(config.max_delay_ms);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
        };
        let attempts = AtomicU32::new(0);
        let result = with_retry(&config, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::StorageTransient("timeout".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(&config, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::StorageTransient("down".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let config = RetryConfig::default();
        let attempts = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(&config, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::StoragePermanent("corrupt".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
