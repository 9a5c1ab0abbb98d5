//! Retry-until-success evaluation.
//!
//! Decouples *how to check* (the probe) from *how long to wait* (the policy).
//! The delay between attempts is fixed: with `max_attempts = N` and `delay = D`
//! the worst-case wait is `(N - 1) * D`, with no sleep after the final attempt.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{RunnerError, RunnerResult};

/// Bounded fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Wait between consecutive attempts
    #[serde(with = "duration_secs")]
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy, rejecting `max_attempts == 0`.
    pub fn new(max_attempts: u32, delay: Duration) -> RunnerResult<Self> {
        if max_attempts == 0 {
            return Err(RunnerError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self { max_attempts, delay })
    }

    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Worst-case time spent sleeping between attempts.
    pub fn worst_case_wait(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempts, {:?} apart", self.max_attempts, self.delay)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Failure of a retried operation.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed.
    #[error("{description} did not succeed after {attempts} attempts: {last_error}")]
    Exhausted {
        description: String,
        attempts: u32,
        last_error: E,
    },

    /// A non-retryable error stopped the loop early.
    #[error("{description} failed with a non-retryable error on attempt {attempts}: {error}")]
    Aborted {
        description: String,
        attempts: u32,
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Aborted { attempts, .. } => *attempts,
        }
    }

    /// The last error observed.
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Aborted { error, .. } => error,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Aborted { error, .. } => error,
        }
    }
}

/// Run `probe` until it succeeds or `policy.max_attempts` attempts have failed.
pub async fn retry_until_success<T, E, F, Fut>(
    description: &str,
    policy: &RetryPolicy,
    probe: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_retryable_errors(description, policy, |_| true, probe).await
}

/// Like [`retry_until_success`], but stops immediately on errors `is_retryable` rejects.
pub async fn retry_with_retryable_errors<T, E, F, Fut, P>(
    description: &str,
    policy: &RetryPolicy,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!("{}: attempt {}/{}", description, attempt, max_attempts);

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable(&error) {
            return Err(RetryError::Aborted {
                description: description.to_string(),
                attempts: attempt,
                error,
            });
        }

        if attempt >= max_attempts {
            warn!("{} gave up after {} attempts: {}", description, attempt, error);
            return Err(RetryError::Exhausted {
                description: description.to_string(),
                attempts: attempt,
                last_error: error,
            });
        }

        warn!(
            "{} returned an error: {}. Sleeping for {:?} and will try again.",
            description, error, policy.delay
        );
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}
