//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::LLMError;

/// Retries performed after the first failed attempt unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How many times to retry a transient failure and how long to wait in between.
///
/// The wait before retry `n` (0-based) is `(n + 1) * backoff_unit`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use agentkit::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_retries, 3);
/// assert_eq!(policy.backoff_for(0), Duration::from_secs(1));
/// assert_eq!(policy.backoff_for(2), Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.saturating_add(1))
    }
}

/// Progress of one [`with_retry`] call.
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
}

/// Runs `operation` until it succeeds, fails terminally, or exhausts `policy`.
///
/// Terminal errors (see [`LLMError::is_retryable`]) are returned at once without
/// sleeping. Transient errors are retried up to `policy.max_retries` times, so the
/// operation runs at most `max_retries + 1` times; the error of the last attempt is
/// returned. Each call starts from a fresh attempt counter.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
/// use agentkit::error::LLMError;
/// use agentkit::retry::{RetryPolicy, with_retry};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let calls = AtomicU32::new(0);
/// let policy = RetryPolicy::default().with_backoff_unit(Duration::from_millis(1));
/// let value = with_retry(
///     || async {
///         if calls.fetch_add(1, Ordering::SeqCst) == 0 {
///             Err(LLMError::transport("connection reset"))
///         } else {
///             Ok("done")
///         }
///     },
///     &policy,
/// )
/// .await
/// .unwrap();
/// assert_eq!(value, "done");
/// assert_eq!(calls.load(Ordering::SeqCst), 2);
/// # });
/// ```
pub async fn with_retry<T, F, Fut>(mut operation: F, policy: &RetryPolicy) -> Result<T, LLMError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LLMError>>,
{
    let mut state = RetryState::default();
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        error!(attempt = state.attempt, error = %err, "request failed");
        if state.attempt >= policy.max_retries {
            warn!(attempts = state.attempt + 1, "retries exhausted");
            return Err(err);
        }

        let delay = policy.backoff_for(state.attempt);
        info!(?delay, "sleeping before retry");
        tokio::time::sleep(delay).await;
        state.attempt += 1;
    }
}
