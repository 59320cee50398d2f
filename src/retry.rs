//! Shared bounded-retry-with-backoff primitive.
//!
//! Indexer and RPC search endpoints routinely return empty before they
//! catch up with the chain head; every such call site drives this one
//! primitive instead of open-coding its own attempt loop. The bound is
//! self-enforced, callers never need to cancel.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::XCallError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy for eventually-consistent indexer searches.
    pub const fn indexer() -> Self {
        Self::new(10, Duration::from_millis(500))
    }

    /// Policy for waiting on a freshly submitted transaction's receipt.
    pub const fn receipt() -> Self {
        Self::new(10, Duration::from_secs(1))
    }

    /// Exponential backoff, capped at 16x the base delay.
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.min(4))
    }
}

/// Drives `op` until it yields a value or the attempt bound is reached.
///
/// `Ok(Some(value))` completes the call, `Ok(None)` means "not indexed
/// yet" and schedules another attempt, `Err` is fatal and propagates
/// immediately.
pub async fn retry_until<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, XCallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, XCallError>>,
{
    for attempt in 0..policy.max_attempts {
        if let Some(value) = op().await? {
            return Ok(value);
        }
        if attempt + 1 < policy.max_attempts {
            let delay = policy.delay(attempt);
            debug!(attempt = attempt + 1, ?delay, "result not indexed yet, backing off");
            tokio::time::sleep(delay).await;
        }
    }
    Err(XCallError::IndexerLag(format!(
        "no result after {} attempts",
        policy.max_attempts
    )))
}
