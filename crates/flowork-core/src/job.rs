//! Jobs: one workflow execution over one input path.
//!
//! A [`Job`] is an owned value that moves between pipeline stages, so it is
//! always in exactly one place: in flight, waiting for redispatch, or at a
//! sink. [`JobFactory`] builds jobs with fresh task instances; [`JobFailure`]
//! is the terminal record kept in the error set.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use flowork_types::files::{StoreDir, StorePath};
use flowork_types::task::{TaskInstance, TaskSpec};

use crate::engine::EngineError;
use crate::runner::BoxRunner;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A unit of work: run every task instance in order against one input.
pub struct Job {
    id: Uuid,
    runner: Arc<BoxRunner>,
    tasks: Vec<TaskInstance>,
    input: StorePath,
    output_dir: StoreDir,
    error: Option<EngineError>,
    attempts: u32,
}

impl Job {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn runner(&self) -> &Arc<BoxRunner> {
        &self.runner
    }

    /// Task instances in execution order. Never empty.
    pub fn tasks(&self) -> &[TaskInstance] {
        &self.tasks
    }

    /// Mutable access for the engine. The list itself cannot change length.
    pub fn tasks_mut(&mut self) -> &mut [TaskInstance] {
        &mut self.tasks
    }

    pub fn input(&self) -> &StorePath {
        &self.input
    }

    pub fn output_dir(&self) -> &StoreDir {
        &self.output_dir
    }

    /// 1-based attempt counter: the first execution is attempt 1.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The error from the most recent execution, if it failed.
    pub fn error(&self) -> Option<&EngineError> {
        self.error.as_ref()
    }

    pub(crate) fn record_error(&mut self, error: EngineError) {
        self.error = Some(error);
    }

    pub(crate) fn take_error(&mut self) -> Option<EngineError> {
        self.error.take()
    }

    /// Reset for resubmission: clear the error and the previous attempt's
    /// captures, and count the next attempt.
    pub(crate) fn prepare_retry(&mut self) {
        self.error = None;
        self.attempts += 1;
        for task in &mut self.tasks {
            task.clear_capture();
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("runner", &self.runner)
            .field("tasks", &self.tasks.len())
            .field("input", &self.input)
            .field("output_dir", &self.output_dir)
            .field("error", &self.error)
            .field("attempts", &self.attempts)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// JobFactory
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum JobError {
    #[error("workflow has no tasks")]
    EmptyWorkflow,
}

/// Builds one [`Job`] per input path from a shared task list.
#[derive(Debug, Clone)]
pub struct JobFactory {
    tasks: Vec<Arc<TaskSpec>>,
    runner: Arc<BoxRunner>,
    output_dir: StoreDir,
}

impl JobFactory {
    pub fn new(tasks: Vec<Arc<TaskSpec>>, runner: Arc<BoxRunner>, output_dir: StoreDir) -> Self {
        Self {
            tasks,
            runner,
            output_dir,
        }
    }

    /// Build a factory from owned task specs.
    pub fn from_specs(
        tasks: impl IntoIterator<Item = TaskSpec>,
        runner: Arc<BoxRunner>,
        output_dir: StoreDir,
    ) -> Self {
        Self::new(tasks.into_iter().map(Arc::new).collect(), runner, output_dir)
    }

    /// Create a job for `input` with fresh task instances and attempt 1.
    pub fn create(&self, input: StorePath) -> Result<Job, JobError> {
        if self.tasks.is_empty() {
            return Err(JobError::EmptyWorkflow);
        }
        Ok(Job {
            id: Uuid::now_v7(),
            runner: Arc::clone(&self.runner),
            tasks: self
                .tasks
                .iter()
                .map(|spec| TaskInstance::new(Arc::clone(spec)))
                .collect(),
            input,
            output_dir: self.output_dir.clone(),
            error: None,
            attempts: 1,
        })
    }
}

// ---------------------------------------------------------------------------
// JobFailure
// ---------------------------------------------------------------------------

/// Why a failed job was not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The job used all of its retries.
    RetriesExhausted,
    /// Retries were suppressed because the failure budget was exceeded.
    RetrySuppressed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetriesExhausted => write!(f, "retries exhausted"),
            FailureReason::RetrySuppressed => write!(f, "retry suppressed"),
        }
    }
}

/// Terminal failure record for one job.
#[derive(Debug, Error)]
#[error("job {job_id} for '{input}' failed after {attempts} attempt(s) ({reason}): {error}")]
pub struct JobFailure {
    pub job_id: Uuid,
    pub input: StorePath,
    pub attempts: u32,
    pub reason: FailureReason,
    #[source]
    pub error: EngineError,
    pub failed_at: DateTime<Utc>,
}

impl JobFailure {
    pub fn new(job: &Job, reason: FailureReason, error: EngineError) -> Self {
        Self {
            job_id: job.id(),
            input: job.input().clone(),
            attempts: job.attempts(),
            reason,
            error,
            failed_at: Utc::now(),
        }
    }
}
