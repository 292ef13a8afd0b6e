//! Retry policy for failed jobs.
//!
//! Stateless decision logic: the pipeline passes in the job's attempt count
//! and whether the failure budget has already been exceeded.

use crate::job::FailureReason;

/// Outcome of evaluating a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Resubmit the job for another attempt.
    Retry,
    /// Give up on the job and record it as a terminal failure.
    Abandon(FailureReason),
}

/// Retry limits applied by the completion stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (so `max_retries + 1` runs).
    pub max_retries: u32,
    /// Failed attempts tolerated before aborting. `None` is unlimited.
    pub max_failures: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_failures: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, max_failures: Option<usize>) -> Self {
        Self {
            max_retries,
            max_failures,
        }
    }

    /// Decide what to do with a job that just failed.
    ///
    /// `attempts` is 1-based (first execution is attempt 1). Once the run has
    /// been aborted no job is retried, whatever its attempt count.
    pub fn decide(&self, attempts: u32, aborted: bool) -> RetryDecision {
        if attempts > self.max_retries {
            return RetryDecision::Abandon(FailureReason::RetriesExhausted);
        }
        if aborted {
            return RetryDecision::Abandon(FailureReason::RetrySuppressed);
        }
        RetryDecision::Retry
    }

    /// Whether `failures` failed attempts exceed the failure budget.
    pub fn budget_exceeded(&self, failures: usize) -> bool {
        self.max_failures.is_some_and(|max| failures > max)
    }
}
