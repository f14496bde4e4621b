//! Bounded Retry with a Retryable-Error Predicate
//!
//! Blobstream retries exactly one thing internally: resolving the partitioner
//! when several producers race to create it. Exactly one conditional create wins,
//! every loser must re-read, so the whole resolution is re-run.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  resolve partitioner │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────────────┐
//! │  RetryPolicy                 │
//! │  - max_attempts: 10          │
//! │  - initial_backoff: 0ms      │
//! │  - max_backoff: 0ms          │
//! │  - backoff_multiplier: 1.0   │
//! └──────────┬───────────────────┘
//!            │
//!            ├─→ Attempt 1: Immediate
//!            ├─→ Attempt 2: Immediate (retryable error)
//!            ├─→ ...
//!            └─→ Attempt 10 fails: RetriesExhausted
//! ```
//!
//! Non-retryable errors are returned unchanged on the first occurrence. A
//! retryable error on the last attempt becomes `ClientError::RetriesExhausted`.
//!
//! ## Examples
//!
//! ```ignore
//! use blobstream_client::retry::{retry_with_predicate, RetryPolicy};
//!
//! let partitioner = retry_with_predicate(
//!     &RetryPolicy::immediate(10),
//!     "Unable to initialize partitioner",
//!     |e| e.is_condition_failed(),
//!     || async { resolve_once().await },
//! )
//! .await?;
//! ```

use crate::error::{ClientError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for [`retry_with_predicate`].
///
/// `backoff = min(initial_backoff * multiplier^attempt, max_backoff)`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: usize,

    /// Backoff before the second attempt
    pub initial_backoff: Duration,

    /// Upper bound on any single backoff
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(10)
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Retry without any delay between attempts.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Backoff before retry number `attempt` (0-indexed).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        backoff.min(self.max_backoff)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have failed with retryable errors.
///
/// # Returns
///
/// - `Ok(T)` from the first successful attempt
/// - the original error if `is_retryable` rejects it
/// - `ClientError::RetriesExhausted { attempts, message }` once attempts run out
pub async fn retry_with_predicate<F, Fut, T, P>(
    policy: &RetryPolicy,
    message: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&ClientError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }

                attempt += 1;
                if attempt >= max_attempts {
                    warn!(
                        attempts = attempt,
                        error = %err,
                        "Max attempts exhausted, giving up"
                    );
                    return Err(ClientError::RetriesExhausted {
                        attempts: attempt,
                        message: message.to_string(),
                    });
                }

                let backoff = policy.backoff(attempt - 1);
                debug!(
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retryable error, trying again"
                );
                if !backoff.is_zero() {
                    sleep(backoff).await;
                }
            }
        }
    }
}
