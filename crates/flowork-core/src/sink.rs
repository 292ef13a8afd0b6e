//! Job sinks: observers notified when a job leaves the pipeline.
//!
//! Sinks are synchronous and must be cheap; they run on the pipeline's
//! completion and dispatch tasks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::job::{Job, JobFailure};

/// Observer of terminal job states. All methods default to no-ops.
pub trait JobSink: Send + Sync {
    /// The job completed every task and its outputs were extracted.
    fn success(&self, _job: &Job) {}

    /// The job reached a terminal failure and was recorded in the error set.
    fn failure(&self, _job: &Job, _failure: &JobFailure) {}

    /// The job was dropped without running because the run was aborted.
    fn discarded(&self, _job: &Job) {}
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Logs every terminal job state through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl JobSink for LogSink {
    fn success(&self, job: &Job) {
        info!(job_id = %job.id(), input = %job.input(), attempts = job.attempts(), "job succeeded");
    }

    fn failure(&self, job: &Job, failure: &JobFailure) {
        error!(
            job_id = %job.id(),
            input = %job.input(),
            attempts = job.attempts(),
            reason = %failure.reason,
            error = %failure.error,
            "job failed"
        );
    }

    fn discarded(&self, job: &Job) {
        warn!(job_id = %job.id(), input = %job.input(), "job discarded after abort");
    }
}

// ---------------------------------------------------------------------------
// SummarySink
// ---------------------------------------------------------------------------

/// Totals for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub discarded: usize,
    /// Engine executions across all finished jobs, retries included.
    pub attempts: u64,
}

impl RunSummary {
    /// Jobs that reached any terminal state.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.discarded
    }
}

/// Counts terminal job states with lock-free counters.
#[derive(Debug, Default)]
pub struct SummarySink {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    discarded: AtomicUsize,
    attempts: AtomicU64,
}

impl SummarySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
            attempts: self.attempts.load(Ordering::SeqCst),
        }
    }
}

impl JobSink for SummarySink {
    fn success(&self, job: &Job) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.attempts.fetch_add(u64::from(job.attempts()), Ordering::SeqCst);
    }

    fn failure(&self, job: &Job, _failure: &JobFailure) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.attempts.fetch_add(u64::from(job.attempts()), Ordering::SeqCst);
    }

    fn discarded(&self, _job: &Job) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}
