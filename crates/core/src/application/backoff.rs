// Bounded retry with linear backoff, shared by every provider call
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Delay before attempt `attempt + 1`: attempt * base
pub fn backoff_delay(attempt: u32, base_delay: Duration) -> Duration {
    base_delay * attempt
}

/// Run `operation` up to `max_attempts` times.
///
/// - The first success short-circuits.
/// - Transient errors (`AppError::is_transient`) are retried after
///   `attempt * base_delay`.
/// - Other errors, and the last transient error once attempts are exhausted,
///   are returned to the caller.
///
/// # Example
/// ```text
/// let job = retry_with_backoff("get_job", 3, Duration::from_secs(1), || {
///     provider.get_job(&job_id)
/// })
/// .await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = backoff_delay(attempt, base_delay);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    "Giving up"
                );
                return Err(e);
            }
        }
    }
}
