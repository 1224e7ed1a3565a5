//! Bounded retries with growing delays for the foreground calendar load.
//!
//! Retried: timeouts, connection failures, 5xx, 408 and 429.
//! Not retried: other 4xx and payloads that fail to decode.
//!
//! Once the attempts run out the failure is terminal. Nothing retries it
//! again until the caller starts a new load.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use majic_core::ClientConfig;
use thiserror::Error;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    /// Delay before the second attempt (doubles each time after).
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_base_delay_ms,
            config.retry_max_delay_ms,
        )
    }

    /// Upper bound on calls to the operation, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the failed attempt number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

impl RetryDecision {
    pub fn for_status(status: u16) -> Self {
        match status {
            500..=599 | 408 | 429 => RetryDecision::Retry,
            _ => RetryDecision::NoRetry,
        }
    }
}

/// Errors that know whether another attempt could help.
pub trait Retryable {
    fn retry_decision(&self) -> RetryDecision;
}

/// Progress shown to the user between two attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStatus {
    /// 1-based number of the attempt about to start.
    pub next_attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub reason: String,
}

impl fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Retrying in {}s (attempt {} of {})...",
            self.reason,
            self.delay.as_secs_f32().ceil() as u64,
            self.next_attempt,
            self.max_attempts
        )
    }
}

/// Terminal outcome of a retried operation. Never retryable itself.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    #[error("Request failed: {0}")]
    Permanent(E),
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Permanent(_) => 1,
        }
    }

    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// `on_status` is called before each wait with a line suitable for display.
pub async fn with_retry<T, E, F, Fut, S>(
    config: &RetryConfig,
    mut on_status: S,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + Retryable + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    S: FnMut(&RetryStatus),
{
    let max_attempts = config.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("Request succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if error.retry_decision() == RetryDecision::NoRetry {
            tracing::debug!("Non-retryable error: {}", error);
            return Err(if attempt == 1 {
                RetryError::Permanent(error)
            } else {
                RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                }
            });
        }

        if attempt >= max_attempts {
            tracing::error!("All {} attempts failed: {}", attempt, error);
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = config.delay_for_attempt(attempt - 1);
        tracing::warn!(
            "Retryable error on attempt {} of {}: {}",
            attempt,
            max_attempts,
            error
        );
        on_status(&RetryStatus {
            next_attempt: attempt + 1,
            max_attempts,
            delay,
            reason: error.to_string(),
        });
        tokio::time::sleep(delay).await;
    }
}
