//! BoxRunner -- object-safe dynamic dispatch wrapper for Runner.
//!
//! Same blanket-impl pattern as `BoxStore`:
//! 1. Define an object-safe `RunnerDyn` trait with boxed futures
//! 2. Blanket-impl `RunnerDyn` for all `T: Runner`
//! 3. `BoxRunner` wraps `Box<dyn RunnerDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use flowork_types::error::RunnerError;
use flowork_types::files::{StoreDir, StorePath};
use flowork_types::task::TaskInstance;
use flowork_types::volume::{Volume, VolumeSize};

use super::Runner;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RunnerError>> + Send + 'a>>;

/// Object-safe version of [`Runner`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `Runner`.
pub trait RunnerDyn: Send + Sync {
    fn name(&self) -> &str;

    fn create_volume_boxed(&self, min_size: VolumeSize) -> BoxFuture<'_, Volume>;

    fn delete_volume_boxed<'a>(&'a self, volume: &'a Volume) -> BoxFuture<'a, ()>;

    fn add_file_boxed<'a>(
        &'a self,
        source: &'a StorePath,
        volume: &'a Volume,
        dest_name: &'a str,
    ) -> BoxFuture<'a, ()>;

    fn extract_file_boxed<'a>(
        &'a self,
        source: &'a StorePath,
        volume: &'a Volume,
        dest_dir: &'a StoreDir,
    ) -> BoxFuture<'a, ()>;

    fn run_boxed<'a>(&'a self, task: &'a mut TaskInstance, volume: &'a Volume)
    -> BoxFuture<'a, ()>;
}

impl<T: Runner> RunnerDyn for T {
    fn name(&self) -> &str {
        Runner::name(self)
    }

    fn create_volume_boxed(&self, min_size: VolumeSize) -> BoxFuture<'_, Volume> {
        Box::pin(self.create_volume(min_size))
    }

    fn delete_volume_boxed<'a>(&'a self, volume: &'a Volume) -> BoxFuture<'a, ()> {
        Box::pin(self.delete_volume(volume))
    }

    fn add_file_boxed<'a>(
        &'a self,
        source: &'a StorePath,
        volume: &'a Volume,
        dest_name: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.add_file(source, volume, dest_name))
    }

    fn extract_file_boxed<'a>(
        &'a self,
        source: &'a StorePath,
        volume: &'a Volume,
        dest_dir: &'a StoreDir,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.extract_file(source, volume, dest_dir))
    }

    fn run_boxed<'a>(
        &'a self,
        task: &'a mut TaskInstance,
        volume: &'a Volume,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.run(task, volume))
    }
}

/// Type-erased runner for runtime runner selection.
///
/// Since `Runner` uses RPITIT, it cannot be used as a trait object directly.
/// `BoxRunner` itself implements `Runner`, so it can be passed anywhere a
/// concrete runner is expected.
pub struct BoxRunner {
    inner: Box<dyn RunnerDyn + Send + Sync>,
}

impl BoxRunner {
    /// Wrap a concrete `Runner` in a type-erased box.
    pub fn new<T: Runner + 'static>(runner: T) -> Self {
        Self {
            inner: Box::new(runner),
        }
    }
}

impl std::fmt::Debug for BoxRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRunner")
            .field("name", &self.inner.name())
            .finish()
    }
}

impl Runner for BoxRunner {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create_volume(&self, min_size: VolumeSize) -> Result<Volume, RunnerError> {
        self.inner.create_volume_boxed(min_size).await
    }

    async fn delete_volume(&self, volume: &Volume) -> Result<(), RunnerError> {
        self.inner.delete_volume_boxed(volume).await
    }

    async fn add_file(
        &self,
        source: &StorePath,
        volume: &Volume,
        dest_name: &str,
    ) -> Result<(), RunnerError> {
        self.inner.add_file_boxed(source, volume, dest_name).await
    }

    async fn extract_file(
        &self,
        source: &StorePath,
        volume: &Volume,
        dest_dir: &StoreDir,
    ) -> Result<(), RunnerError> {
        self.inner.extract_file_boxed(source, volume, dest_dir).await
    }

    async fn run(&self, task: &mut TaskInstance, volume: &Volume) -> Result<(), RunnerError> {
        self.inner.run_boxed(task, volume).await
    }
}
