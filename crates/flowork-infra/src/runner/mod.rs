//! Runner implementations: local Docker and remote Docker over SSH.

pub mod capture;
pub mod command;
pub mod docker;
pub mod ssh;

use std::sync::Arc;

use flowork_core::runner::BoxRunner;
use flowork_core::store::BoxStore;
use flowork_types::config::{FloworkConfig, RunnerKind};
use flowork_types::error::RunnerError;

pub use docker::DockerRunner;
pub use ssh::SshRunner;

/// Subdirectory of a runner's work dir that holds job volumes.
pub const VOLUMES_DIR_NAME: &str = "volumes";

/// Subdirectory used for captured task output when none is configured.
pub const LOGS_DIR_NAME: &str = "logs";

/// Build the runner selected by `config.runner.kind`.
pub fn build_runner(config: &FloworkConfig, store: Arc<BoxStore>) -> Result<BoxRunner, RunnerError> {
    let runner = match config.runner.kind {
        RunnerKind::Docker => BoxRunner::new(DockerRunner::new(&config.docker, store)?),
        RunnerKind::Ssh => BoxRunner::new(SshRunner::new(&config.ssh, store)?),
    };
    tracing::debug!(runner = %config.runner.kind, "runner selected");
    Ok(runner)
}
