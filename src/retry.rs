use std::time::Duration;

use crate::error::SwapError;

/// Bounded exponential backoff for transient read failures.
///
/// Only [`SwapError::is_transient`] failures are retried; a decision or
/// chain-state failure surfaces on the first attempt. Submissions are
/// never routed through this, since a resent transaction could execute
/// twice.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubles per subsequent retry.
    pub base_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Runs `op`, retrying transient failures per `policy`.
pub async fn with_backoff<T, F, Fut>(policy: Backoff, mut op: F) -> Result<T, SwapError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SwapError>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.attempts => {
                tracing::debug!(%err, attempt, ?delay, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
