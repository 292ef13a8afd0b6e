//! Orchestration pipeline: turns a stream of input paths into job executions.
//!
//! Three long-lived stages connected by channels, plus one task per job in
//! flight:
//!
//! ```text
//!  PathSource -> [intake] --work--> [dispatch] --spawn--> job task
//!                                     ^    |                 |
//!                                     |  permit             done
//!                                     |    |                 v
//!                                     +--feedback------ [completion] -> sinks
//! ```
//!
//! - **intake** pulls paths, builds jobs and sends them on the bounded work
//!   queue. It owns the work sender and drops it when the source ends.
//! - **dispatch** acquires a semaphore permit per job and spawns the engine.
//!   It counts outstanding jobs and owns the done sender, which it drops once
//!   intake has closed and nothing is outstanding.
//! - **completion** releases permits, applies the retry policy and sends a
//!   verdict back to dispatch on an unbounded feedback channel, so it never
//!   blocks on dispatch.
//!
//! Every failed attempt counts against the failure budget, retried or not.
//! Once the count exceeds the budget the abort token is cancelled: intake
//! stops the source, fresh queued jobs are discarded and no job is retried.
//! Jobs already running drain normally.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flowork_types::config::PipelineSettings;

use crate::engine::{EngineError, JobEngine, panic_message};
use crate::error_set::{ErrorSet, JoinedError};
use crate::inputs::PathSource;
use crate::job::{Job, JobFactory, JobFailure};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::sink::JobSink;

/// Work-queue capacity when concurrency is unlimited and none is configured.
pub const DEFAULT_UNBOUNDED_QUEUE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Concurrency and retry parameters for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineConfig {
    /// Maximum jobs in flight. `None` is unlimited.
    pub concurrency: Option<usize>,
    pub retry: RetryPolicy,
    /// Work-queue capacity. Defaults to `concurrency + 1`.
    pub queue_capacity: Option<usize>,
}

impl PipelineConfig {
    pub fn new(concurrency: i64, retry: RetryPolicy) -> Self {
        Self {
            concurrency: normalize_concurrency(concurrency),
            retry,
            queue_capacity: None,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    fn permits(&self) -> usize {
        self.concurrency
            .map_or(Semaphore::MAX_PERMITS, |c| c.min(Semaphore::MAX_PERMITS))
    }

    fn work_capacity(&self) -> usize {
        let default = self
            .concurrency
            .map_or(DEFAULT_UNBOUNDED_QUEUE_CAPACITY, |c| c.saturating_add(1));
        self.queue_capacity.unwrap_or(default).max(1)
    }
}

impl From<&PipelineSettings> for PipelineConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            concurrency: normalize_concurrency(settings.concurrency),
            retry: RetryPolicy::new(settings.max_retries, settings.max_failures),
            queue_capacity: settings.queue_capacity,
        }
    }
}

/// Non-positive limits mean unlimited.
fn normalize_concurrency(limit: i64) -> Option<usize> {
    if limit <= 0 {
        None
    } else {
        Some(usize::try_from(limit).unwrap_or(usize::MAX))
    }
}

// ---------------------------------------------------------------------------
// Stage messages
// ---------------------------------------------------------------------------

/// A job returning from the engine, still holding its permit.
struct Finished {
    job: Job,
    permit: OwnedSemaphorePermit,
}

/// Completion's verdict on a finished job, sent back to dispatch.
enum Feedback {
    /// The job reached a sink; it is no longer outstanding.
    Settled,
    /// The job must run again. It stays outstanding.
    Retry(Job),
}

type Sinks = Arc<[Arc<dyn JobSink>]>;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs a workflow over every path of a [`PathSource`].
pub struct Pipeline<E> {
    engine: Arc<E>,
    factory: JobFactory,
    config: PipelineConfig,
    errors: Arc<ErrorSet>,
    sinks: Vec<Arc<dyn JobSink>>,
    shutdown: CancellationToken,
}

impl<E: JobEngine + 'static> Pipeline<E> {
    pub fn new(
        engine: E,
        factory: JobFactory,
        config: PipelineConfig,
        errors: Arc<ErrorSet>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            factory,
            config,
            errors,
            sinks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a sink. Sinks are called in registration order.
    pub fn with_sink(mut self, sink: Arc<dyn JobSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Token cancelled when the run has fully completed.
    ///
    /// Cancelling it from outside forces an early shutdown: nothing new is
    /// dispatched, queued jobs and pending retries are reported as discarded
    /// and running jobs drain.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until every job has reached a terminal state.
    ///
    /// Returns `Err` joining every terminal failure if at least one job
    /// failed, `Ok(())` otherwise.
    pub async fn run(self, source: PathSource) -> Result<(), JoinedError> {
        let Pipeline {
            engine,
            factory,
            config,
            errors,
            sinks,
            shutdown,
        } = self;
        let sinks: Sinks = sinks.into();
        let abort = shutdown.child_token();
        let permits = config.permits();
        let capacity = config.work_capacity();

        info!(
            concurrency = ?config.concurrency,
            max_retries = config.retry.max_retries,
            max_failures = ?config.retry.max_failures,
            queue_capacity = capacity,
            "pipeline starting"
        );

        let (work_tx, work_rx) = mpsc::channel(capacity);
        let (done_tx, done_rx) = mpsc::channel(capacity);
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

        let intake_handle = tokio::spawn(intake(
            source,
            factory,
            work_tx,
            abort.clone(),
            Arc::clone(&sinks),
        ));
        let dispatch_handle = tokio::spawn(dispatch(DispatchStage {
            engine,
            semaphore: Arc::new(Semaphore::new(permits)),
            work_rx,
            feedback_rx,
            done_tx,
            abort: abort.clone(),
            shutdown: shutdown.clone(),
            sinks: Arc::clone(&sinks),
        }));
        let completion_handle = tokio::spawn(completion(CompletionStage {
            done_rx,
            feedback_tx,
            policy: config.retry,
            errors: Arc::clone(&errors),
            abort,
            shutdown,
            sinks,
        }));

        let (intake_result, dispatch_result, completion_result) =
            tokio::join!(intake_handle, dispatch_handle, completion_handle);
        for (stage, result) in [
            ("intake", intake_result),
            ("dispatch", dispatch_result),
            ("completion", completion_result),
        ] {
            if let Err(e) = result {
                error!(stage, error = %e, "pipeline stage panicked");
            }
        }

        match errors.join() {
            Some(joined) => {
                info!(failures = joined.len(), "pipeline finished with failures");
                Err(joined)
            }
            None => {
                info!("pipeline finished");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Intake
// ---------------------------------------------------------------------------

async fn intake(
    mut source: PathSource,
    factory: JobFactory,
    work_tx: mpsc::Sender<Job>,
    abort: CancellationToken,
    sinks: Sinks,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = abort.cancelled() => break,
            next = source.next() => next,
        };
        let Some(entry) = next else { break };

        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "skipping input entry");
                continue;
            }
        };
        let job = match factory.create(path.clone()) {
            Ok(job) => job,
            Err(e) => {
                warn!(input = %path, error = %e, "failed to create job");
                continue;
            }
        };

        let slot = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                discard(&sinks, &job);
                break;
            }
            slot = work_tx.reserve() => slot,
        };
        match slot {
            Ok(slot) => {
                debug!(job_id = %job.id(), input = %job.input(), "job queued");
                slot.send(job);
            }
            Err(_) => break,
        }
    }

    source.stop();
    debug!("intake finished");
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

struct DispatchStage<E> {
    engine: Arc<E>,
    semaphore: Arc<Semaphore>,
    work_rx: mpsc::Receiver<Job>,
    feedback_rx: mpsc::UnboundedReceiver<Feedback>,
    done_tx: mpsc::Sender<Finished>,
    abort: CancellationToken,
    shutdown: CancellationToken,
    sinks: Sinks,
}

async fn dispatch<E: JobEngine + 'static>(mut stage: DispatchStage<E>) {
    let mut outstanding: usize = 0;
    let mut intake_open = true;

    loop {
        if !intake_open && outstanding == 0 {
            break;
        }

        let job = tokio::select! {
            biased;
            _ = stage.shutdown.cancelled() => break,
            feedback = stage.feedback_rx.recv() => match feedback {
                Some(Feedback::Settled) => {
                    outstanding = outstanding.saturating_sub(1);
                    continue;
                }
                Some(Feedback::Retry(job)) => job,
                None => break,
            },
            next = stage.work_rx.recv(), if intake_open => match next {
                Some(job) if stage.abort.is_cancelled() => {
                    discard(&stage.sinks, &job);
                    continue;
                }
                Some(job) => {
                    outstanding += 1;
                    job
                }
                None => {
                    intake_open = false;
                    continue;
                }
            },
        };

        let permit = tokio::select! {
            biased;
            _ = stage.shutdown.cancelled() => {
                discard(&stage.sinks, &job);
                break;
            }
            permit = Arc::clone(&stage.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        debug!(job_id = %job.id(), attempt = job.attempts(), "dispatching job");
        tokio::spawn(run_job(
            Arc::clone(&stage.engine),
            job,
            permit,
            stage.done_tx.clone(),
        ));
    }

    // Anything still queued after an early exit never reaches the engine.
    stage.work_rx.close();
    while let Ok(job) = stage.work_rx.try_recv() {
        discard(&stage.sinks, &job);
    }
    stage.feedback_rx.close();
    while let Ok(feedback) = stage.feedback_rx.try_recv() {
        if let Feedback::Retry(job) = feedback {
            discard(&stage.sinks, &job);
        }
    }

    debug!(outstanding, "dispatch finished");
}

fn discard(sinks: &Sinks, job: &Job) {
    for sink in sinks.iter() {
        sink.discarded(job);
    }
}

/// Execute one job and hand it to the completion stage with its permit.
async fn run_job<E: JobEngine>(
    engine: Arc<E>,
    mut job: Job,
    permit: OwnedSemaphorePermit,
    done_tx: mpsc::Sender<Finished>,
) {
    let outcome = AssertUnwindSafe(engine.execute(&mut job))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => job.record_error(e),
        Err(panic) => job.record_error(EngineError::Panicked(panic_message(panic.as_ref()))),
    }

    if done_tx.send(Finished { job, permit }).await.is_err() {
        error!("completion stage is gone, dropping finished job");
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

struct CompletionStage {
    done_rx: mpsc::Receiver<Finished>,
    feedback_tx: mpsc::UnboundedSender<Feedback>,
    policy: RetryPolicy,
    errors: Arc<ErrorSet>,
    abort: CancellationToken,
    shutdown: CancellationToken,
    sinks: Sinks,
}

async fn completion(mut stage: CompletionStage) {
    let mut failed_attempts: usize = 0;

    while let Some(Finished { mut job, permit }) = stage.done_rx.recv().await {
        drop(permit);

        let Some(error) = job.take_error() else {
            for sink in stage.sinks.iter() {
                sink.success(&job);
            }
            let _ = stage.feedback_tx.send(Feedback::Settled);
            continue;
        };

        let decision = stage.policy.decide(job.attempts(), stage.abort.is_cancelled());
        failed_attempts += 1;
        if stage.policy.budget_exceeded(failed_attempts) && !stage.abort.is_cancelled() {
            warn!(
                failures = failed_attempts,
                max_failures = ?stage.policy.max_failures,
                "failure budget exceeded, aborting run"
            );
            stage.abort.cancel();
        }

        match decision {
            RetryDecision::Retry => {
                warn!(
                    job_id = %job.id(),
                    input = %job.input(),
                    attempt = job.attempts(),
                    error = %error,
                    "job failed, retrying"
                );
                job.prepare_retry();
                if let Err(mpsc::error::SendError(Feedback::Retry(job))) =
                    stage.feedback_tx.send(Feedback::Retry(job))
                {
                    discard(&stage.sinks, &job);
                }
            }
            RetryDecision::Abandon(reason) => {
                let failure = Arc::new(JobFailure::new(&job, reason, error));
                stage.errors.push(Arc::clone(&failure));
                for sink in stage.sinks.iter() {
                    sink.failure(&job, &failure);
                }
                let _ = stage.feedback_tx.send(Feedback::Settled);
            }
        }
    }

    debug!("completion finished");
    stage.shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use flowork_types::error::RunnerError;
    use flowork_types::files::StorePath;

    use super::*;
    use crate::job::FailureReason;
    use crate::job::tests::factory;
    use crate::sink::SummarySink;

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Per-input behavior for [`ScriptedEngine`].
    #[derive(Clone, Copy)]
    enum Script {
        /// Always succeed.
        Pass,
        /// Fail this many times, then succeed.
        FailTimes(u32),
        /// Always fail.
        Fail,
        /// Panic on every attempt.
        Panic,
    }

    /// Engine whose outcome depends on the job's input path.
    #[derive(Default)]
    struct ScriptedEngine {
        scripts: HashMap<String, Script>,
        calls: Mutex<HashMap<String, u32>>,
        attempts_seen: Mutex<Vec<(String, u32)>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
        delay: Duration,
        /// Notified when the given input starts any attempt.
        announce: Vec<(String, Arc<Notify>)>,
        /// The given input waits for the notification before this attempt.
        wait_for: Vec<(String, u32, Arc<Notify>)>,
    }

    impl ScriptedEngine {
        fn with(mut self, input: &str, script: Script) -> Self {
            self.scripts.insert(input.to_string(), script);
            self
        }

        fn calls(&self, input: &str) -> u32 {
            self.calls
                .lock()
                .unwrap()
                .get(input)
                .copied()
                .unwrap_or(0)
        }

        fn fail() -> EngineError {
            EngineError::Task {
                task: "first".to_string(),
                id: uuid::Uuid::now_v7(),
                source: RunnerError::Volume("scripted".to_string()),
            }
        }
    }

    impl JobEngine for ScriptedEngine {
        async fn execute(&self, job: &mut Job) -> Result<(), EngineError> {
            let input = job.input().to_string();
            for (announced, notify) in &self.announce {
                if *announced == input {
                    notify.notify_one();
                }
            }
            for (gated, attempt, notify) in &self.wait_for {
                if *gated == input && *attempt == job.attempts() {
                    notify.notified().await;
                }
            }

            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let entry = calls.entry(input.clone()).or_insert(0);
                *entry += 1;
                *entry
            };
            self.attempts_seen
                .lock()
                .unwrap()
                .push((input.clone(), job.attempts()));

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            match self.scripts.get(&input).copied().unwrap_or(Script::Pass) {
                Script::Pass => Ok(()),
                Script::FailTimes(n) if call <= n => Err(Self::fail()),
                Script::FailTimes(_) => Ok(()),
                Script::Fail => Err(Self::fail()),
                Script::Panic => panic!("engine exploded on {input}"),
            }
        }
    }

    /// Engine reference shared with the test after the pipeline takes it.
    struct Shared(Arc<ScriptedEngine>);

    impl JobEngine for Shared {
        async fn execute(&self, job: &mut Job) -> Result<(), EngineError> {
            self.0.execute(job).await
        }
    }

    /// Sink that fires a notification on the first failure it sees.
    struct NotifyOnFailure(Arc<Notify>);

    impl JobSink for NotifyOnFailure {
        fn failure(&self, _job: &Job, _failure: &JobFailure) {
            self.0.notify_one();
        }
    }

    fn paths(names: &[&str]) -> Vec<StorePath> {
        names.iter().map(|n| StorePath::new(*n)).collect()
    }

    struct Outcome {
        result: Result<(), JoinedError>,
        errors: Arc<ErrorSet>,
        summary: crate::sink::RunSummary,
    }

    async fn run_pipeline(
        engine: Arc<ScriptedEngine>,
        config: PipelineConfig,
        source: PathSource,
        extra_sink: Option<Arc<dyn JobSink>>,
    ) -> Outcome {
        let errors = Arc::new(ErrorSet::new());
        let summary = Arc::new(SummarySink::new());
        let mut pipeline = Pipeline::new(Shared(engine), factory(), config, Arc::clone(&errors))
            .with_sink(summary.clone());
        if let Some(sink) = extra_sink {
            pipeline = pipeline.with_sink(sink);
        }
        let result = tokio::time::timeout(TIMEOUT, pipeline.run(source))
            .await
            .expect("pipeline hung");
        Outcome {
            result,
            errors,
            summary: summary.summary(),
        }
    }

    fn config(concurrency: i64, max_retries: u32, max_failures: Option<usize>) -> PipelineConfig {
        PipelineConfig::new(concurrency, RetryPolicy::new(max_retries, max_failures))
    }

    #[test]
    fn config_normalizes_concurrency() {
        assert_eq!(config(0, 0, None).concurrency, None);
        assert_eq!(config(-3, 0, None).concurrency, None);
        assert_eq!(config(4, 0, None).concurrency, Some(4));
        assert_eq!(config(4, 0, None).work_capacity(), 5);
        assert_eq!(config(4, 0, None).with_queue_capacity(2).work_capacity(), 2);
        assert_eq!(config(0, 0, None).permits(), Semaphore::MAX_PERMITS);
    }

    #[test]
    fn config_from_settings() {
        let settings = PipelineSettings {
            concurrency: 3,
            max_retries: 1,
            max_failures: Some(2),
            queue_capacity: None,
            volume_size: 0,
        };
        let config = PipelineConfig::from(&settings);
        assert_eq!(config.concurrency, Some(3));
        assert_eq!(config.retry, RetryPolicy::new(1, Some(2)));
    }

    #[tokio::test]
    async fn all_jobs_succeed() {
        let engine = Arc::new(ScriptedEngine::default());
        let names = ["/in/a", "/in/b", "/in/c", "/in/d", "/in/e"];
        let out = run_pipeline(
            Arc::clone(&engine),
            config(2, 1, None),
            PathSource::from_paths(paths(&names)),
            None,
        )
        .await;

        assert!(out.result.is_ok());
        assert!(out.errors.is_empty());
        assert_eq!(out.summary.succeeded, names.len());
        for name in names {
            assert_eq!(engine.calls(name), 1);
        }
    }

    #[tokio::test]
    async fn empty_source_finishes_cleanly() {
        let engine = Arc::new(ScriptedEngine::default());
        let out = run_pipeline(
            engine,
            config(2, 1, None),
            PathSource::from_paths(Vec::<StorePath>::new()),
            None,
        )
        .await;
        assert!(out.result.is_ok());
        assert_eq!(out.summary.total(), 0);
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected() {
        let engine = Arc::new(ScriptedEngine {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let names: Vec<String> = (0..12).map(|i| format!("/in/{i}")).collect();
        let out = run_pipeline(
            Arc::clone(&engine),
            config(3, 0, None),
            PathSource::from_paths(names.iter().map(StorePath::new)),
            None,
        )
        .await;

        assert!(out.result.is_ok());
        assert_eq!(out.summary.succeeded, 12);
        let max = engine.max_running.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {max} concurrent executions");
        assert!(max >= 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let engine = Arc::new(ScriptedEngine::default().with("/in/a", Script::FailTimes(1)));
        let out = run_pipeline(
            Arc::clone(&engine),
            config(1, 1, None),
            PathSource::from_paths(paths(&["/in/a"])),
            None,
        )
        .await;

        assert!(out.result.is_ok());
        assert_eq!(engine.calls("/in/a"), 2);
        assert_eq!(out.summary.attempts, 2);

        let seen = engine.attempts_seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![("/in/a".to_string(), 1), ("/in/a".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn attempts_never_exceed_retry_limit() {
        let engine = Arc::new(ScriptedEngine::default().with("/in/a", Script::Fail));
        let out = run_pipeline(
            Arc::clone(&engine),
            config(2, 3, None),
            PathSource::from_paths(paths(&["/in/a", "/in/b"])),
            None,
        )
        .await;

        assert_eq!(engine.calls("/in/a"), 4);
        let seen: Vec<u32> = engine
            .attempts_seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(input, _)| input == "/in/a")
            .map(|(_, attempt)| *attempt)
            .collect();
        assert_eq!(seen, vec![1, 2, 3, 4]);

        let joined = out.result.unwrap_err();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.failures()[0].attempts, 4);
        assert_eq!(joined.failures()[0].reason, FailureReason::RetriesExhausted);
    }

    #[tokio::test]
    async fn one_terminal_failure_among_three() {
        let engine = Arc::new(ScriptedEngine::default().with("/in/b", Script::Fail));
        let out = run_pipeline(
            Arc::clone(&engine),
            config(3, 0, None),
            PathSource::from_paths(paths(&["/in/a", "/in/b", "/in/c"])),
            None,
        )
        .await;

        let joined = out.result.unwrap_err();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.failures()[0].input.as_str(), "/in/b");
        assert_eq!(out.summary.succeeded, 2);
        assert_eq!(out.summary.failed, 1);
        assert_eq!(engine.calls("/in/b"), 1);
    }

    #[tokio::test]
    async fn exceeded_budget_suppresses_later_retries() {
        // "/in/a" starts only once "/in/b" is running, and "/in/b" fails only
        // after "/in/a" has exhausted its retries. The abort comes with the
        // first failure of "/in/a", whose retry was already decided.
        let b_started = Arc::new(Notify::new());
        let a_failed = Arc::new(Notify::new());
        let engine = Arc::new(ScriptedEngine {
            announce: vec![("/in/b".to_string(), Arc::clone(&b_started))],
            wait_for: vec![
                ("/in/a".to_string(), 1, b_started),
                ("/in/b".to_string(), 1, Arc::clone(&a_failed)),
            ],
            ..ScriptedEngine::default()
                .with("/in/a", Script::Fail)
                .with("/in/b", Script::Fail)
        });

        let out = run_pipeline(
            Arc::clone(&engine),
            config(2, 1, Some(0)),
            PathSource::from_paths(paths(&["/in/a", "/in/b"])),
            Some(Arc::new(NotifyOnFailure(a_failed))),
        )
        .await;

        let joined = out.result.unwrap_err();
        assert_eq!(joined.len(), 2);

        let reason_of = |input: &str| {
            joined
                .failures()
                .iter()
                .find(|f| f.input.as_str() == input)
                .map(|f| f.reason)
        };
        assert_eq!(reason_of("/in/a"), Some(FailureReason::RetriesExhausted));
        assert_eq!(reason_of("/in/b"), Some(FailureReason::RetrySuppressed));
        assert_eq!(engine.calls("/in/a"), 2);
        assert_eq!(engine.calls("/in/b"), 1);
    }

    #[tokio::test]
    async fn zero_budget_suppresses_second_failures_retry() {
        let engine = Arc::new(
            ScriptedEngine {
                delay: Duration::from_millis(20),
                ..Default::default()
            }
            .with("/in/a", Script::FailTimes(1))
            .with("/in/b", Script::FailTimes(1)),
        );
        let out = run_pipeline(
            Arc::clone(&engine),
            config(2, 1, Some(0)),
            PathSource::from_paths(paths(&["/in/a", "/in/b"])),
            None,
        )
        .await;

        // Whichever failure completion sees first is retried and succeeds;
        // the other is abandoned without a retry.
        let joined = out.result.unwrap_err();
        assert_eq!(joined.len(), 1);
        let failure = &joined.failures()[0];
        assert_eq!(failure.reason, FailureReason::RetrySuppressed);
        assert_eq!(failure.attempts, 1);
        assert_eq!(engine.calls(failure.input.as_str()), 1);
        assert_eq!(engine.calls("/in/a") + engine.calls("/in/b"), 3);
        assert_eq!(out.summary.succeeded, 1);
        assert_eq!(out.summary.failed, 1);
    }

    #[tokio::test]
    async fn abort_stops_intake_and_discards_queued_jobs() {
        let engine = Arc::new(
            ScriptedEngine {
                delay: Duration::from_millis(5),
                ..Default::default()
            }
            .with("/in/0", Script::Fail),
        );
        let names: Vec<String> = (0..50).map(|i| format!("/in/{i}")).collect();
        let out = run_pipeline(
            Arc::clone(&engine),
            config(1, 0, Some(0)),
            PathSource::from_paths(names.iter().map(StorePath::new)),
            None,
        )
        .await;

        assert_eq!(out.result.unwrap_err().len(), 1);
        assert!(out.summary.succeeded < 49, "intake kept going after abort");
        assert_eq!(out.summary.failed, 1);
    }

    #[tokio::test]
    async fn stopping_source_drains_in_flight_jobs() {
        let engine = Arc::new(ScriptedEngine {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let (feed, source) = PathSource::channel(1);
        let stopper = source.stopper();

        let producer = tokio::spawn(async move {
            let mut i = 0;
            while feed.send(Ok(StorePath::new(format!("/in/{i}")))).await {
                i += 1;
            }
        });

        let run = tokio::spawn(run_pipeline(
            Arc::clone(&engine),
            config(2, 0, None),
            source,
            None,
        ));
        tokio::time::sleep(Duration::from_millis(120)).await;
        stopper.stop();

        let out = run.await.unwrap();
        producer.await.unwrap();
        assert!(out.result.is_ok());
        assert!(out.summary.succeeded >= 1);
        assert_eq!(engine.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn source_errors_are_skipped() {
        let engine = Arc::new(ScriptedEngine::default());
        let source = PathSource::spawn(4, |feed| async move {
            feed.send(Ok(StorePath::new("/in/a"))).await;
            feed.send(Err(flowork_types::error::SourceError::NonUtf8(
                "/in/\u{fffd}".to_string(),
            )))
            .await;
            feed.send(Ok(StorePath::new("/in/b"))).await;
        });
        let out = run_pipeline(Arc::clone(&engine), config(2, 0, None), source, None).await;

        assert!(out.result.is_ok());
        assert_eq!(out.summary.succeeded, 2);
    }

    #[tokio::test]
    async fn engine_panic_becomes_job_failure() {
        let engine = Arc::new(ScriptedEngine::default().with("/in/a", Script::Panic));
        let out = run_pipeline(
            Arc::clone(&engine),
            config(2, 1, None),
            PathSource::from_paths(paths(&["/in/a", "/in/b"])),
            None,
        )
        .await;

        let joined = out.result.unwrap_err();
        assert_eq!(joined.len(), 1);
        assert!(matches!(
            joined.failures()[0].error,
            EngineError::Panicked(ref msg) if msg.contains("engine exploded")
        ));
        assert_eq!(engine.calls("/in/a"), 2);
        assert_eq!(out.summary.succeeded, 1);
    }

    #[tokio::test]
    async fn unlimited_concurrency_runs_everything() {
        let engine = Arc::new(ScriptedEngine {
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let names: Vec<String> = (0..20).map(|i| format!("/in/{i}")).collect();
        let out = run_pipeline(
            Arc::clone(&engine),
            config(0, 0, None),
            PathSource::from_paths(names.iter().map(StorePath::new)),
            None,
        )
        .await;
        assert!(out.result.is_ok());
        assert_eq!(out.summary.succeeded, 20);
    }

    #[tokio::test]
    async fn forced_shutdown_reports_queued_jobs_as_discarded() {
        let engine = Arc::new(ScriptedEngine {
            delay: Duration::from_millis(150),
            ..Default::default()
        });
        let errors = Arc::new(ErrorSet::new());
        let summary = Arc::new(SummarySink::new());
        let pipeline = Pipeline::new(
            Shared(Arc::clone(&engine)),
            factory(),
            config(1, 0, None).with_queue_capacity(8),
            errors,
        )
        .with_sink(summary.clone());
        let token = pipeline.shutdown_token();

        let run = tokio::spawn(
            pipeline.run(PathSource::from_paths(paths(&["/in/a", "/in/b", "/in/c"]))),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();

        let result = tokio::time::timeout(TIMEOUT, run)
            .await
            .expect("pipeline hung")
            .unwrap();
        assert!(result.is_ok());

        let totals = summary.summary();
        assert_eq!(totals.succeeded, 1);
        assert_eq!(totals.discarded, 2);
        assert_eq!(engine.calls("/in/b") + engine.calls("/in/c"), 0);
    }

    #[tokio::test]
    async fn shutdown_token_fires_after_run() {
        let errors = Arc::new(ErrorSet::new());
        let pipeline = Pipeline::new(
            Shared(Arc::new(ScriptedEngine::default())),
            factory(),
            config(1, 0, None),
            errors,
        );
        let token = pipeline.shutdown_token();
        assert!(!token.is_cancelled());
        tokio::time::timeout(TIMEOUT, pipeline.run(PathSource::from_paths(paths(&["/in/a"]))))
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }
}
