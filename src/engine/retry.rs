//! Bounded retry driver
//!
//! Runs a fallible async unit of work until it succeeds, fails with an error the
//! classifier marks terminal, or runs out of attempts. The driver never returns an
//! error; every ending is a [`RetryOutcome`].

use std::future::Future;
use std::time::Duration;

/// Upper bound on attempts for one command.
pub const MAX_ATTEMPTS: u32 = 10;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after the n-th failed attempt is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff,
        }
    }

    /// No pause between attempts.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    fn pause_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    /// Terminal error, or the last retryable error once attempts ran out.
    Failure { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Failure { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }
}

/// Run `work` under `policy`, consulting `classify` after each failure.
///
/// `work` receives the 1-based attempt number.
pub async fn run_bounded<T, E, W, Fut, C>(
    policy: &RetryPolicy,
    classify: C,
    mut work: W,
) -> RetryOutcome<T, E>
where
    W: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Disposition,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match work(attempt).await {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(error) => error,
        };

        if classify(&error) == Disposition::Terminal || attempt >= max_attempts {
            return RetryOutcome::Failure {
                error,
                attempts: attempt,
            };
        }

        log::warn!(
            "Attempt {}/{} failed, retrying: {}",
            attempt,
            max_attempts,
            error
        );

        let pause = policy.pause_after(attempt);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}
