//! git::retry
//!
//! Bounded retry with exponential backoff for pushes.
//!
//! # Classification
//!
//! A failure is either retried or returned immediately:
//!
//! 1. Typed [`GitError`] categories decide first: authentication failures,
//!    rejected ref updates and configuration problems are fatal, network
//!    errors are retryable.
//! 2. Otherwise the message is matched case-insensitively against known
//!    fatal and transient phrases.
//! 3. Anything unrecognized is retried.
//!
//! # Timing
//!
//! The sleep before attempt `i + 1` is `base * 2^(i - 1)`, so a push that
//! fails `n` times in a row sleeps `base * (2^n - 1)` in total. Sleeps go
//! through the [`Sleeper`] trait so tests can record them instead of
//! waiting, and a [`CancellationToken`] aborts both sleeps and further
//! attempts.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::interface::GitError;

/// Message fragments that mark a failure as permanent.
pub const FATAL_PATTERNS: &[&str] = &[
    "authentication required",
    "authentication failed",
    "permission denied",
    "non-fast-forward",
    "conflict",
];

/// Message fragments that mark a failure as transient.
pub const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "connection refused",
    "connection reset",
    "no route to host",
    "temporary failure",
    "network is unreachable",
];

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Retryable,
    Fatal,
}

/// Classify a push failure.
pub fn classify(err: &GitError) -> Retryability {
    match err {
        GitError::AuthFailed { .. }
        | GitError::Rejected { .. }
        | GitError::NotARepo { .. }
        | GitError::BareRepo
        | GitError::RemoteNotFound { .. }
        | GitError::InvalidAuth { .. }
        | GitError::BranchMismatch { .. }
        | GitError::InvalidInput(_) => Retryability::Fatal,
        // Transport errors can still carry an auth refusal in the message.
        GitError::Network { message }
        | GitError::AccessError { message }
        | GitError::Internal { message } => classify_message(message),
    }
}

/// Classify a failure by its message alone.
pub fn classify_message(message: &str) -> Retryability {
    let lower = message.to_lowercase();
    if FATAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Retryability::Fatal;
    }
    if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Retryability::Retryable;
    }
    Retryability::Retryable
}

/// Attempt limit and base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; an attempt count of zero is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A single attempt with no retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Maximum number of attempts (at least 1).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Sleep after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// Why retrying stopped without success.
#[derive(Debug, Error)]
pub enum RetryError {
    /// A non-retryable failure.
    #[error("attempt {attempt} failed permanently: {source}")]
    Fatal {
        attempt: u32,
        #[source]
        source: GitError,
    },

    /// Every attempt failed.
    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: GitError,
    },

    /// The cancellation token fired.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl RetryError {
    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempt, .. } => *attempt,
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => {
                *attempts
            }
        }
    }

    /// The last underlying failure, if an attempt ran.
    pub fn last_error(&self) -> Option<&GitError> {
        match self {
            RetryError::Fatal { source, .. } | RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Sum of requested sleeps.
    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        match self.slept.lock() {
            Ok(mut slept) => slept.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}

/// Run `operation` until it succeeds, fails fatally, runs out of attempts
/// or is cancelled.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GitError>>,
{
    let max = policy.max_attempts();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }
        attempt += 1;

        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if classify(&err) == Retryability::Fatal {
            return Err(RetryError::Fatal {
                attempt,
                source: err,
            });
        }
        if attempt >= max {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: err,
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(
            attempt,
            max_attempts = max,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            _ = sleeper.sleep(delay) => {}
        }
    }
}
