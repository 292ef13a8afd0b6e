//! Persist a task's stdout/stderr and turn its exit code into a result.

use std::io::Cursor;

use chrono::Utc;

use flowork_core::store::{BoxStore, Store};
use flowork_types::error::RunnerError;
use flowork_types::files::StoreDir;
use flowork_types::task::{CapturedOutput, TaskInstance};

use super::command::CommandOutput;

pub const STDOUT_FILE: &str = "stdout.txt";
pub const STDERR_FILE: &str = "stderr.txt";

/// Save `output` under `<capture_dir>/<instance id>/` and record it on the
/// task. A non-zero exit becomes [`RunnerError::TaskFailed`] after the
/// streams have been saved.
pub async fn record_output(
    store: &BoxStore,
    capture_dir: &StoreDir,
    task: &mut TaskInstance,
    output: CommandOutput,
) -> Result<CapturedOutput, RunnerError> {
    let dir = capture_dir.sub_dir(&task.id().to_string());
    let stdout = dir.path_to(STDOUT_FILE);
    let stderr = dir.path_to(STDERR_FILE);

    store
        .save(&stdout, Box::pin(Cursor::new(output.stdout)))
        .await?;
    store
        .save(&stderr, Box::pin(Cursor::new(output.stderr)))
        .await?;

    let captured = CapturedOutput {
        exit_code: output.code,
        stdout,
        stderr,
        finished_at: Utc::now(),
    };
    task.record_capture(captured.clone());

    if captured.exit_code != 0 {
        return Err(RunnerError::TaskFailed {
            task: task.name().to_string(),
            code: captured.exit_code,
            stderr_path: captured.stderr.to_string(),
        });
    }
    Ok(captured)
}
