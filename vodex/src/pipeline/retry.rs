//! Bounded retry with per-attempt and overall timeouts.
//!
//! Each attempt runs as its own spawned task joined under a per-attempt
//! timeout. An overall deadline caps the whole sequence; when it fires the
//! in-flight attempt is aborted and abandoned best-effort. Work the attempt
//! delegated outside the task (an external process, a remote job) may keep
//! running, the pipeline just stops waiting for it.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{info, warn};

use crate::{Error, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 180;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_OVERALL_GRACE_SECS: u64 = 30;

/// Retry parameters for a flaky stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Cap on a single attempt.
    pub attempt_timeout_secs: u64,
    /// Delay between the end of one attempt and the start of the next.
    pub retry_delay_secs: u64,
    /// Slack added on top of the worst-case attempt schedule when deriving
    /// the overall deadline.
    pub overall_grace_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            overall_grace_secs: DEFAULT_OVERALL_GRACE_SECS,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_attempt_timeout_secs(mut self, secs: u64) -> Self {
        self.attempt_timeout_secs = secs;
        self
    }

    pub fn with_retry_delay_secs(mut self, secs: u64) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    /// Overall deadline for the whole retry sequence: every attempt running
    /// to its timeout, every inter-attempt delay, plus the grace period.
    pub fn overall_timeout_secs(&self) -> u64 {
        let attempts = u64::from(self.max_attempts.max(1));
        attempts * self.attempt_timeout_secs
            + (attempts - 1) * self.retry_delay_secs
            + self.overall_grace_secs
    }
}

/// Runs a fallible operation under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `make_attempt` until it succeeds, attempts are exhausted, or the
    /// overall deadline passes.
    ///
    /// A panicking attempt counts as a failed attempt. On overall timeout the
    /// current attempt task is aborted and [`Error::OverallTimeout`] is
    /// returned; on exhaustion the last attempt's error is returned.
    pub async fn run<F, Fut>(&self, label: &str, mut make_attempt: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let overall_secs = self.policy.overall_timeout_secs();
        let deadline = Instant::now() + Duration::from_secs(overall_secs);
        let attempt_cap = Duration::from_secs(self.policy.attempt_timeout_secs);
        let mut last_error: Option<Error> = None;

        for attempt in 1..=max_attempts {
            let mut handle = tokio::spawn(make_attempt());
            let attempt_deadline = Instant::now() + attempt_cap;

            // Biased so a finished attempt always wins, and the overall
            // deadline takes precedence over the per-attempt one when both
            // expire in the same tick.
            let attempt_error = tokio::select! {
                biased;
                joined = &mut handle => match joined {
                    Ok(Ok(())) => {
                        info!(stage = label, attempt, "Attempt succeeded");
                        return Ok(());
                    }
                    Ok(Err(e)) => {
                        warn!(stage = label, attempt, error = %e, "Attempt failed");
                        e
                    }
                    Err(join_err) => {
                        warn!(stage = label, attempt, error = %join_err, "Attempt panicked");
                        Error::producer(label, format!("attempt panicked: {join_err}"))
                    }
                },
                _ = sleep_until(deadline) => {
                    handle.abort();
                    warn!(stage = label, attempt, timeout_secs = overall_secs,
                        "Overall deadline reached, abandoning attempt");
                    return Err(Error::OverallTimeout(overall_secs));
                }
                _ = sleep_until(attempt_deadline) => {
                    handle.abort();
                    warn!(stage = label, attempt,
                        timeout_secs = self.policy.attempt_timeout_secs,
                        "Attempt timed out");
                    Error::AttemptTimeout(self.policy.attempt_timeout_secs)
                }
            };
            last_error = Some(attempt_error);

            if attempt < max_attempts {
                let delay = Duration::from_secs(self.policy.retry_delay_secs);
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = sleep_until(deadline) => {
                        warn!(stage = label, timeout_secs = overall_secs,
                            "Overall deadline reached during retry delay");
                        return Err(Error::OverallTimeout(overall_secs));
                    }
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| Error::producer(label, "no attempt was made"));
        warn!(stage = label, attempts = max_attempts, error = %last, "All attempts exhausted");
        Err(last)
    }
}
