use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::traits::error::SocketError;

/// Metadata about the current reconnection cycle
///
/// Passed to [`QueryProvider`], [`UrlProvider`] and available to custom
/// [`RetryPolicy`] implementations through the attempt index.
///
/// [`QueryProvider`]: crate::traits::params::QueryProvider
/// [`UrlProvider`]: crate::traits::url::UrlProvider
#[derive(Debug, Clone)]
pub struct RetryInfo {
    /// Number of failed attempts in this cycle (0 for the first attempt)
    pub retry_count: u32,
    /// The error that failed the previous attempt, if any
    pub last_error: Option<Arc<SocketError>>,
    /// When this reconnection cycle started
    pub started_at: Instant,
}

/// Trait for computing the delay before the next reconnection attempt
///
/// Implement this trait to control the pacing of reconnection. The
/// returned duration is used unchanged. The retry cap is enforced
/// separately by the socket through its `max_retries` option, so a
/// policy only has to answer "how long until attempt N".
///
/// # Arguments
/// * `attempt` - The reconnection attempt number (0-indexed)
pub trait RetryPolicy: Send + Sync {
    /// Get the delay to wait before the given attempt
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff reconnection policy
///
/// Delays grow geometrically: `min * growth_factor^attempt`, clamped to
/// the `[min, max]` range. This is the default policy; the socket builder
/// rolls a randomized minimum delay once per socket unless one is
/// configured explicitly.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
    growth_factor: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy
    ///
    /// # Arguments
    /// * `min` - Delay before the first retry, and the lower clamp bound
    /// * `max` - The upper clamp bound
    /// * `growth_factor` - Multiplier applied per attempt
    pub fn new(min: Duration, max: Duration, growth_factor: f64) -> Self {
        Self { min, max, growth_factor }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let min_ms = self.min.as_millis() as f64;
        let delay_ms = min_ms * self.growth_factor.powi(attempt as i32);
        let delay_ms = delay_ms.clamp(min_ms, self.max.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Fixed delay reconnection policy
///
/// Always waits the same amount of time between attempts.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    /// Create a new fixed delay policy
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
