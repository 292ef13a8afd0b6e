//! Job engines: drive one job through its volume lifecycle.
//!
//! `VolumeEngine` is the production engine:
//! 1. Ask the job's runner for a volume.
//! 2. Stage the job input under every input name of the first task.
//! 3. Run each task instance in order, stopping at the first failure.
//! 4. Extract every output of the last task into
//!    `<output_dir>/<last_task_instance_id>/`.
//! 5. Delete the volume, whatever happened above, including a runner panic.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use flowork_types::error::RunnerError;
use flowork_types::volume::{Volume, VolumeSize};

use crate::job::Job;
use crate::runner::{BoxRunner, Runner};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from a single job execution. Each wraps the runner error with the
/// lifecycle step it happened in.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create volume: {0}")]
    CreateVolume(#[source] RunnerError),

    #[error("failed to stage input '{input}' as '{file}': {source}")]
    StageInput {
        input: String,
        file: String,
        #[source]
        source: RunnerError,
    },

    #[error("task '{task}' ({id}) failed: {source}")]
    Task {
        task: String,
        id: Uuid,
        #[source]
        source: RunnerError,
    },

    #[error("failed to extract output '{output}' to '{dest}': {source}")]
    ExtractOutput {
        output: String,
        dest: String,
        #[source]
        source: RunnerError,
    },

    #[error("job has no tasks")]
    NoTasks,

    #[error("job engine panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// JobEngine trait
// ---------------------------------------------------------------------------

/// Trait for job execution engines.
///
/// Uses RPITIT for the async method, like the runner and store traits.
pub trait JobEngine: Send + Sync {
    /// Execute one job to completion.
    ///
    /// Engines never touch the job's attempt counter or error field; the
    /// pipeline records the returned error and decides about retries.
    fn execute(&self, job: &mut Job) -> impl Future<Output = Result<(), EngineError>> + Send;
}

// ---------------------------------------------------------------------------
// VolumeEngine
// ---------------------------------------------------------------------------

/// Engine that runs a job inside one runner-allocated volume.
#[derive(Debug, Clone, Default)]
pub struct VolumeEngine {
    volume_size: VolumeSize,
}

impl VolumeEngine {
    /// Create an engine requesting volumes of at least `volume_size` bytes.
    /// Zero asks for the runner's default minimum.
    pub fn new(volume_size: VolumeSize) -> Self {
        Self { volume_size }
    }

    async fn run_in_volume(
        &self,
        runner: &BoxRunner,
        job: &mut Job,
        volume: &Volume,
    ) -> Result<(), EngineError> {
        let input = job.input().clone();
        let job_id = job.id();

        let first = job.tasks().first().ok_or(EngineError::NoTasks)?;
        for name in &first.spec().inputs {
            let file = name.file_name();
            debug!(job_id = %job_id, input = %input, file, volume = %volume, "staging input");
            runner
                .add_file(&input, volume, file)
                .await
                .map_err(|source| EngineError::StageInput {
                    input: input.to_string(),
                    file: file.to_string(),
                    source,
                })?;
        }

        for task in job.tasks_mut() {
            debug!(job_id = %job_id, task = task.name(), instance = %task.id(), "running task");
            runner
                .run(task, volume)
                .await
                .map_err(|source| EngineError::Task {
                    task: task.name().to_string(),
                    id: task.id(),
                    source,
                })?;
        }

        let last = job.tasks().last().ok_or(EngineError::NoTasks)?;
        let dest = job.output_dir().sub_dir(&last.id().to_string());
        for output in &last.spec().outputs {
            debug!(job_id = %job_id, output = %output, dest = %dest, "extracting output");
            runner
                .extract_file(output, volume, &dest)
                .await
                .map_err(|source| EngineError::ExtractOutput {
                    output: output.to_string(),
                    dest: dest.to_string(),
                    source,
                })?;
        }

        Ok(())
    }
}

impl JobEngine for VolumeEngine {
    async fn execute(&self, job: &mut Job) -> Result<(), EngineError> {
        if job.tasks().is_empty() {
            return Err(EngineError::NoTasks);
        }

        let runner = std::sync::Arc::clone(job.runner());
        let volume = runner
            .create_volume(self.volume_size)
            .await
            .map_err(EngineError::CreateVolume)?;
        debug!(job_id = %job.id(), runner = runner.name(), volume = %volume, "volume created");

        let result = AssertUnwindSafe(self.run_in_volume(&runner, job, &volume))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(EngineError::Panicked(panic_message(panic.as_ref()))));

        if let Err(e) = runner.delete_volume(&volume).await {
            error!(job_id = %job.id(), volume = %volume, error = %e, "failed to delete volume");
        }

        result
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// NoopEngine
// ---------------------------------------------------------------------------

/// Engine that logs the job and succeeds without running anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEngine;

impl JobEngine for NoopEngine {
    async fn execute(&self, job: &mut Job) -> Result<(), EngineError> {
        let tasks: Vec<&str> = job.tasks().iter().map(|t| t.name()).collect();
        info!(
            job_id = %job.id(),
            input = %job.input(),
            attempt = job.attempts(),
            tasks = ?tasks,
            "dry run: skipping job"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use flowork_types::files::{StoreDir, StorePath};
    use flowork_types::task::TaskInstance;

    use super::*;
    use crate::job::JobFactory;
    use crate::job::tests::task_spec;

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum FailAt {
        Nowhere,
        Create,
        Stage,
        Run,
        Extract,
        Delete,
        Panic,
    }

    /// Runner that records every call and can fail at one step.
    struct RecordingRunner {
        fail_at: FailAt,
        calls: Arc<Mutex<Vec<String>>>,
        deletes: Arc<AtomicUsize>,
    }

    impl RecordingRunner {
        fn log(&self, entry: String) {
            self.calls.lock().expect("calls lock poisoned").push(entry);
        }

        fn fail(&self, step: FailAt) -> Result<(), RunnerError> {
            if self.fail_at == step {
                return Err(RunnerError::Volume("boom".to_string()));
            }
            Ok(())
        }
    }

    impl Runner for RecordingRunner {
        fn name(&self) -> &str {
            "recording"
        }

        async fn create_volume(&self, min_size: VolumeSize) -> Result<Volume, RunnerError> {
            self.log(format!("create:{min_size}"));
            self.fail(FailAt::Create)?;
            Ok(Volume::new("vol-1"))
        }

        async fn delete_volume(&self, volume: &Volume) -> Result<(), RunnerError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.log(format!("delete:{volume}"));
            self.fail(FailAt::Delete)
        }

        async fn add_file(
            &self,
            source: &StorePath,
            _volume: &Volume,
            dest_name: &str,
        ) -> Result<(), RunnerError> {
            self.log(format!("add:{source}->{dest_name}"));
            self.fail(FailAt::Stage)
        }

        async fn extract_file(
            &self,
            source: &StorePath,
            _volume: &Volume,
            dest_dir: &StoreDir,
        ) -> Result<(), RunnerError> {
            self.log(format!("extract:{source}->{dest_dir}"));
            self.fail(FailAt::Extract)
        }

        async fn run(&self, task: &mut TaskInstance, _volume: &Volume) -> Result<(), RunnerError> {
            self.log(format!("run:{}", task.name()));
            if self.fail_at == FailAt::Panic {
                panic!("runner blew up on {}", task.name());
            }
            self.fail(FailAt::Run)
        }
    }

    struct Harness {
        job: Job,
        calls: Arc<Mutex<Vec<String>>>,
        deletes: Arc<AtomicUsize>,
    }

    fn harness(fail_at: FailAt) -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let deletes = Arc::new(AtomicUsize::new(0));
        let runner = RecordingRunner {
            fail_at,
            calls: Arc::clone(&calls),
            deletes: Arc::clone(&deletes),
        };

        let mut first = task_spec("first");
        first.inputs = vec![StorePath::new("a.txt"), StorePath::new("b.txt")];
        let mut last = task_spec("last");
        last.outputs = vec![StorePath::new("result.txt")];

        let factory = JobFactory::from_specs(
            vec![first, last],
            Arc::new(BoxRunner::new(runner)),
            StoreDir::new("/out"),
        );
        let job = factory.create(StorePath::new("/in/data.csv")).unwrap();
        Harness {
            job,
            calls,
            deletes,
        }
    }

    fn calls(h: &Harness) -> Vec<String> {
        h.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn runs_full_lifecycle_in_order() {
        let mut h = harness(FailAt::Nowhere);
        VolumeEngine::new(1024).execute(&mut h.job).await.unwrap();

        let last_id = h.job.tasks()[1].id();
        assert_eq!(
            calls(&h),
            vec![
                "create:1024".to_string(),
                "add:/in/data.csv->a.txt".to_string(),
                "add:/in/data.csv->b.txt".to_string(),
                "run:first".to_string(),
                "run:last".to_string(),
                format!("extract:result.txt->/out/{last_id}"),
                "delete:vol-1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn volume_deleted_once_when_staging_fails() {
        let mut h = harness(FailAt::Stage);
        let err = VolumeEngine::default().execute(&mut h.job).await.unwrap_err();
        assert!(matches!(err, EngineError::StageInput { ref file, .. } if file == "a.txt"));
        assert_eq!(h.deletes.load(Ordering::SeqCst), 1);
        assert!(!calls(&h).iter().any(|c| c.starts_with("run:")));
    }

    #[tokio::test]
    async fn first_task_failure_stops_the_job() {
        let mut h = harness(FailAt::Run);
        let err = VolumeEngine::default().execute(&mut h.job).await.unwrap_err();
        assert!(matches!(err, EngineError::Task { ref task, .. } if task == "first"));
        assert!(!calls(&h).contains(&"run:last".to_string()));
        assert_eq!(h.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn volume_deleted_once_when_extraction_fails() {
        let mut h = harness(FailAt::Extract);
        let err = VolumeEngine::default().execute(&mut h.job).await.unwrap_err();
        assert!(matches!(err, EngineError::ExtractOutput { .. }));
        assert_eq!(h.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn runner_panic_still_deletes_volume() {
        let mut h = harness(FailAt::Panic);
        let err = VolumeEngine::default().execute(&mut h.job).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Panicked(ref msg) if msg.contains("runner blew up on first")
        ));
        assert_eq!(h.deletes.load(Ordering::SeqCst), 1);
        assert_eq!(calls(&h).last().map(String::as_str), Some("delete:vol-1"));
    }

    #[tokio::test]
    async fn delete_failure_is_not_propagated() {
        let mut h = harness(FailAt::Delete);
        VolumeEngine::default().execute(&mut h.job).await.unwrap();
        assert_eq!(h.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_failure_skips_delete() {
        let mut h = harness(FailAt::Create);
        let err = VolumeEngine::default().execute(&mut h.job).await.unwrap_err();
        assert!(matches!(err, EngineError::CreateVolume(_)));
        assert_eq!(h.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn noop_engine_touches_nothing() {
        let mut h = harness(FailAt::Create);
        NoopEngine.execute(&mut h.job).await.unwrap();
        assert!(calls(&h).is_empty());
    }
}
