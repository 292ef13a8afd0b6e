//! Task domain types.
//!
//! A [`TaskSpec`] is the immutable, loaded description of one pipeline step.
//! A [`TaskInstance`] is a single run of that step inside one job: it shares
//! the `TaskSpec` by reference and owns only its per-run fields.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::files::StorePath;

/// Working directory used inside the container when a task leaves it blank.
pub const DEFAULT_TASK_WORK_DIR: &str = "/work";

// ---------------------------------------------------------------------------
// TaskSpec
// ---------------------------------------------------------------------------

/// Description of a single containerized pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Short human-readable name used in logs ("parse", "train").
    pub name: String,
    /// One-sentence description for documentation.
    #[serde(default, rename = "desc")]
    pub description: String,
    /// Command argv, including the executable.
    #[serde(default)]
    pub cmd: Vec<String>,
    /// Container image the command runs in (e.g. "debian:bookworm-slim").
    #[serde(default)]
    pub image: String,
    /// Where the volume is mounted inside the container. Blank means
    /// [`DEFAULT_TASK_WORK_DIR`].
    #[serde(default, rename = "workdir")]
    pub work_dir: String,
    /// Bare file names that must exist in the working directory before the
    /// task runs.
    #[serde(default)]
    pub inputs: Vec<StorePath>,
    /// Bare file names guaranteed to exist in the working directory after the
    /// task completes.
    #[serde(default)]
    pub outputs: Vec<StorePath>,
}

impl TaskSpec {
    /// The in-container working directory, falling back to the default.
    pub fn work_dir(&self) -> &str {
        if self.work_dir.is_empty() {
            DEFAULT_TASK_WORK_DIR
        } else {
            &self.work_dir
        }
    }
}

// ---------------------------------------------------------------------------
// TaskInstance
// ---------------------------------------------------------------------------

/// Process output captured by a runner for one task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Process exit code (`-1` when terminated by a signal).
    pub exit_code: i32,
    /// Where the captured stdout was saved.
    pub stdout: StorePath,
    /// Where the captured stderr was saved.
    pub stderr: StorePath,
    pub finished_at: DateTime<Utc>,
}

/// One run of a [`TaskSpec`] within a job.
///
/// Mutable only while it passes through a runner; each run replaces the
/// captured output. Owned exclusively by the job that created it.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    spec: Arc<TaskSpec>,
    id: Uuid,
    captured: Option<CapturedOutput>,
}

impl TaskInstance {
    /// Create a fresh instance with a new UUIDv7 identifier.
    pub fn new(spec: Arc<TaskSpec>) -> Self {
        Self {
            spec,
            id: Uuid::now_v7(),
            captured: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Output captured by the most recent run of this instance.
    pub fn captured(&self) -> Option<&CapturedOutput> {
        self.captured.as_ref()
    }

    /// Record the runner's captured output, replacing any earlier run's.
    pub fn record_capture(&mut self, output: CapturedOutput) {
        self.captured = Some(output);
    }

    /// Forget the captured output before the instance runs again.
    pub fn clear_capture(&mut self) {
        self.captured = None;
    }
}
