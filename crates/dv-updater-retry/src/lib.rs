//! Generic retry execution for operations that contend for external
//! resources such as package database locks.
//!
//! An operation reports one of three [`Outcome`]s on every attempt. The
//! engine consumes [`Outcome::Retry`] according to the configured
//! [`RetryPolicy`], stops immediately on [`Outcome::Abort`] and returns the
//! value carried by [`Outcome::Success`].

use std::{fmt, future::Future, time::Duration};

use dv_updater_utils::time::format_duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod config;
pub mod error;

pub use config::{RetryConfig, RetryPolicy};
pub use error::{RetryError, RetryResult};

/// Result of a single attempt.
#[derive(Debug)]
pub enum Outcome<T, E> {
    Success(T),
    /// Try again; the optional cause is kept as the last error on exhaustion.
    Retry(Option<E>),
    /// Stop now and surface the cause unchanged.
    Abort(E),
}

#[derive(Debug, Clone, Default)]
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `operation` until it succeeds, aborts, or the policy gives up.
    ///
    /// Bounded policies run on the calling task. [`RetryPolicy::Infinite`]
    /// runs on a spawned task that the caller awaits, and requires a
    /// cancellation token.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> RetryResult<T, E>
    where
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        match self.config.policy {
            RetryPolicy::Linear | RetryPolicy::Backoff => self.run_bounded(operation).await,
            RetryPolicy::Infinite => self.run_infinite(operation).await,
        }
    }

    async fn run_bounded<T, E, F, Fut>(&self, mut operation: F) -> RetryResult<T, E>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T, E>>,
    {
        let config = &self.config;
        let mut last = None;

        for attempt in 1..=config.max_attempts {
            match operation().await {
                Outcome::Success(value) => return Ok(value),
                Outcome::Abort(err) => return Err(RetryError::Aborted(err)),
                Outcome::Retry(cause) => {
                    if attempt == config.max_attempts {
                        last = cause;
                        break;
                    }

                    let delay = config.delay_for(attempt);
                    if config.debug {
                        log_attempt(config.policy, attempt, delay, cause.as_ref());
                    }
                    last = cause;

                    if !pause(delay, config.cancel.as_ref()).await {
                        return Err(RetryError::Cancelled {
                            policy: config.policy,
                            attempts: attempt,
                        });
                    }
                }
            }
        }

        Err(RetryError::Exhausted {
            policy: config.policy,
            attempts: config.max_attempts,
            last,
        })
    }

    async fn run_infinite<T, E, F, Fut>(&self, mut operation: F) -> RetryResult<T, E>
    where
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        let Some(cancel) = self.config.cancel.clone() else {
            return Err(RetryError::MissingCancellationToken);
        };
        let delay = self.config.delay;
        let verbose = self.config.debug;

        let handle = tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                if cancel.is_cancelled() {
                    return Err(RetryError::Cancelled {
                        policy: RetryPolicy::Infinite,
                        attempts: attempt,
                    });
                }

                attempt = attempt.saturating_add(1);
                match operation().await {
                    Outcome::Success(value) => return Ok(value),
                    Outcome::Abort(err) => return Err(RetryError::Aborted(err)),
                    Outcome::Retry(cause) => {
                        if verbose {
                            log_attempt(RetryPolicy::Infinite, attempt, delay, cause.as_ref());
                        }
                    }
                }

                if !pause(delay, Some(&cancel)).await {
                    return Err(RetryError::Cancelled {
                        policy: RetryPolicy::Infinite,
                        attempts: attempt,
                    });
                }
            }
        });

        handle
            .await
            .map_err(|err| RetryError::TaskFailed(err.to_string()))?
    }
}

/// Sleeps for `delay`; returns `false` when `cancel` fired first.
async fn pause(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

fn log_attempt<E: fmt::Display>(
    policy: RetryPolicy,
    attempt: u32,
    delay: Duration,
    cause: Option<&E>,
) {
    match cause {
        Some(cause) => {
            debug!(
                %policy,
                attempt,
                "attempt failed: {}, retrying in {}",
                cause,
                format_duration(delay)
            )
        }
        None => {
            debug!(
                %policy,
                attempt,
                "attempt failed, retrying in {}",
                format_duration(delay)
            )
        }
    }
}
