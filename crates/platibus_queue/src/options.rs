use std::time::Duration;

use crate::error::QueueError;

/// Per-queue dispatch policy.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Maximum number of concurrently processed messages.
    pub concurrency_limit: usize,
    /// Treat a listener that returns without error as having acknowledged.
    pub auto_acknowledge: bool,
    /// Total dispatch attempts before a row is dead-lettered.
    pub max_attempts: u32,
    /// Delay between attempts for a non-acknowledged message.
    pub retry_delay: Duration,
    /// Bound on a row's life measured from enqueue; `None` is unbounded.
    pub ttl: Option<Duration>,
    /// Durable queues flush storage after enqueue and terminal updates.
    pub is_durable: bool,
    /// Bounded in-memory dispatch handoff. `None` applies backpressure
    /// instead of failing; `Some(n)` makes a saturated enqueue fail with
    /// `QueueFull`.
    pub handoff_buffer: Option<usize>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            auto_acknowledge: false,
            max_attempts: 10,
            retry_delay: Duration::from_secs(1),
            ttl: None,
            is_durable: true,
            handoff_buffer: None,
        }
    }
}

impl QueueOptions {
    pub(crate) fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency_limit == 0 {
            return Err(QueueError::InvalidOptions("concurrency_limit must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(QueueError::InvalidOptions("max_attempts must be at least 1"));
        }
        if self.retry_delay.is_zero() {
            return Err(QueueError::InvalidOptions("retry_delay must be positive"));
        }
        if self.handoff_buffer == Some(0) {
            return Err(QueueError::InvalidOptions("handoff_buffer must be at least 1"));
        }
        Ok(())
    }
}
