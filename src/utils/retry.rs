// Retry logic with exponential backoff for remote store calls
// Author: kelexine (https://github.com/kelexine)

use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that can tell whether trying again might help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for redis::RedisError {
    fn is_retryable(&self) -> bool {
        self.is_io_error()
            || self.is_connection_dropped()
            || self.is_timeout()
            || self.is_connection_refusal()
    }
}

/// Create exponential backoff configuration for retries
pub fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(50),      // Start at 50ms
        initial_interval: Duration::from_millis(50),
        randomization_factor: 0.3,                         // Add jitter
        multiplier: 2.0,                                   // Double each time
        max_interval: Duration::from_secs(2),              // Cap at 2s
        max_elapsed_time: Some(Duration::from_secs(10)),   // Give up after 10s
        ..Default::default()
    }
}

/// Execute operation, retrying transient failures
/// - Non-retryable errors return immediately
/// - `max_retries` counts retries, so the operation runs at most `max_retries + 1` times
/// - Gives up early once the backoff budget is spent
pub async fn with_retry<F, Fut, T, E>(
    operation_name: &str,
    max_retries: u32,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut backoff = create_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() || attempt > max_retries {
                    return Err(err);
                }

                let Some(delay) = backoff.next_backoff() else {
                    warn!("{} retry budget exhausted after {} attempts", operation_name, attempt);
                    return Err(err);
                };

                debug!(
                    "{} failed (attempt {}): {}, retrying after {}ms",
                    operation_name,
                    attempt,
                    err,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
