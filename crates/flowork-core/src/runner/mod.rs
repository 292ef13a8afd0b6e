//! Runner abstractions for Flowork.
//!
//! - `Runner`: RPITIT trait for concrete executors (Docker, SSH)
//! - `BoxRunner`: object-safe wrapper for runtime runner selection

pub mod box_runner;

use std::future::Future;

use flowork_types::error::RunnerError;
use flowork_types::files::{StoreDir, StorePath};
use flowork_types::task::TaskInstance;
use flowork_types::volume::{Volume, VolumeSize};

pub use box_runner::{BoxRunner, RunnerDyn};

/// Trait for task executors.
///
/// A runner owns the volumes it creates: a volume handle returned by
/// `create_volume` is only meaningful to the same runner. Implementations
/// must be safe to share across concurrently executing jobs.
///
/// Implementations live in flowork-infra (e.g., `DockerRunner`).
pub trait Runner: Send + Sync {
    /// Human-readable runner name (e.g., "docker", "ssh").
    fn name(&self) -> &str;

    /// Allocate a fresh, empty volume of at least `min_size` bytes.
    fn create_volume(
        &self,
        min_size: VolumeSize,
    ) -> impl Future<Output = Result<Volume, RunnerError>> + Send;

    /// Release a volume and everything in it.
    fn delete_volume(&self, volume: &Volume) -> impl Future<Output = Result<(), RunnerError>> + Send;

    /// Copy `source` into the root of `volume` under the bare name `dest_name`.
    fn add_file(
        &self,
        source: &StorePath,
        volume: &Volume,
        dest_name: &str,
    ) -> impl Future<Output = Result<(), RunnerError>> + Send;

    /// Copy `source` (relative to the volume root) out of `volume` into
    /// `dest_dir`, keeping its file name.
    fn extract_file(
        &self,
        source: &StorePath,
        volume: &Volume,
        dest_dir: &StoreDir,
    ) -> impl Future<Output = Result<(), RunnerError>> + Send;

    /// Run one task instance with `volume` as its working directory.
    ///
    /// The runner records captured output on the instance. A non-zero exit
    /// is reported as an error.
    fn run(
        &self,
        task: &mut TaskInstance,
        volume: &Volume,
    ) -> impl Future<Output = Result<(), RunnerError>> + Send;
}
