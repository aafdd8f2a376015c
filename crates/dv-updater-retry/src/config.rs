use std::{fmt, time::Duration};

use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// How the engine spaces and bounds attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Constant delay between a bounded number of attempts.
    Linear,
    /// Delay doubles after every failed attempt, bounded number of attempts.
    #[default]
    Backoff,
    /// Unbounded attempts with constant delay, stopped only by success,
    /// abort or cancellation.
    Infinite,
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetryPolicy::Linear => "linear",
            RetryPolicy::Backoff => "backoff",
            RetryPolicy::Infinite => "infinite",
        };
        f.write_str(name)
    }
}

/// Parameters of one retry execution.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Upper bound on attempts, ignored by [`RetryPolicy::Infinite`].
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub delay: Duration,
    pub policy: RetryPolicy,
    /// Log every failed attempt at debug level.
    pub debug: bool,
    /// Required by [`RetryPolicy::Infinite`]; optional otherwise, where it
    /// interrupts the delay between attempts.
    pub cancel: Option<CancellationToken>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
            policy: RetryPolicy::default(),
            debug: false,
            cancel: None,
        }
    }
}

impl RetryConfig {
    pub fn linear(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            policy: RetryPolicy::Linear,
            ..Default::default()
        }
    }

    pub fn backoff(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            policy: RetryPolicy::Backoff,
            ..Default::default()
        }
    }

    pub fn infinite(delay: Duration, cancel: CancellationToken) -> Self {
        Self {
            delay,
            policy: RetryPolicy::Infinite,
            cancel: Some(cancel),
            ..Default::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    ///
    /// Backoff doubles the base delay per attempt with no jitter and no cap;
    /// the value saturates at [`Duration::MAX`] instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.policy {
            RetryPolicy::Linear | RetryPolicy::Infinite => self.delay,
            RetryPolicy::Backoff => {
                2u32.checked_pow(attempt.saturating_sub(1))
                    .and_then(|factor| self.delay.checked_mul(factor))
                    .unwrap_or(Duration::MAX)
            }
        }
    }
}
