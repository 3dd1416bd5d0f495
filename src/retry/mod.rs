//! Bounded retry shared by attribute extraction and action verification.

mod policy;

pub use policy::RetryPolicy;

use std::future::Future;
use std::time::Duration;

/// Classification of transient retry causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Element missing or still rendering.
    NotReady,
    /// Value present but not parseable yet.
    Unparseable,
    /// An action has not shown its effect yet.
    NotApplied,
    /// The attempt ran past its per-attempt timeout.
    Timeout,
}

impl RetryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::Unparseable => "unparseable",
            Self::NotApplied => "not_applied",
            Self::Timeout => "timeout",
        }
    }
}

/// Retry decision for one attempt result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { reason: RetryReason },
    DoNotRetry,
}

/// Metadata for one scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub delay: Duration,
    pub reason: RetryReason,
}

/// A single attempt exceeded [`RetryPolicy::attempt_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimedOut {
    pub attempt: u32,
    pub after: Duration,
}

/// Retry an async operation according to `policy`.
///
/// - `operation(attempt)` is called with a 1-based attempt number.
/// - `classify(result)` decides whether to retry.
/// - `on_retry(info)` is called right before sleeping.
///
/// The result of the last attempt is returned as-is once the budget is spent.
/// An attempt that overruns the policy's attempt timeout yields
/// `E::from(AttemptTimedOut)` and is classified like any other result.
pub async fn retry_with_backoff<T, E, Op, Fut, Classify, OnRetry>(
    policy: &RetryPolicy,
    mut operation: Op,
    mut classify: Classify,
    mut on_retry: OnRetry,
) -> std::result::Result<T, E>
where
    E: From<AttemptTimedOut>,
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    Classify: FnMut(&std::result::Result<T, E>) -> RetryDecision,
    OnRetry: FnMut(RetryAttempt),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(E::from(AttemptTimedOut {
                    attempt,
                    after: limit,
                })),
            },
            None => operation(attempt).await,
        };

        if attempt >= max_attempts {
            return result;
        }

        match classify(&result) {
            RetryDecision::Retry { reason } => {
                let delay = policy.with_jitter(policy.backoff_delay(attempt));
                on_retry(RetryAttempt {
                    attempt,
                    delay,
                    reason,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::DoNotRetry => return result,
        }
    }
}
