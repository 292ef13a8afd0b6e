//! Local Docker runner.
//!
//! Volumes are plain host directories under `<work_dir>/volumes/` that get
//! bind-mounted into each task container. Files are moved in and out of
//! volumes through the configured store, so inputs may come from anywhere
//! the store can read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use flowork_core::runner::Runner;
use flowork_core::store::{BoxStore, Store};
use flowork_types::config::DockerSettings;
use flowork_types::error::RunnerError;
use flowork_types::files::{StoreDir, StorePath};
use flowork_types::task::TaskInstance;
use flowork_types::volume::{Volume, VolumeSize};

use super::capture::record_output;
use super::command::{docker_run_argv, run_command};
use super::{LOGS_DIR_NAME, VOLUMES_DIR_NAME};

/// Runs tasks with the local `docker` CLI.
#[derive(Debug)]
pub struct DockerRunner {
    work_dir: PathBuf,
    capture_dir: StoreDir,
    debug: bool,
    store: Arc<BoxStore>,
    docker: Vec<String>,
}

impl DockerRunner {
    /// Build a runner from settings. `work_dir` and `capture_dir` must be
    /// absolute.
    pub fn new(settings: &DockerSettings, store: Arc<BoxStore>) -> Result<Self, RunnerError> {
        let work_dir = PathBuf::from(&settings.work_dir);
        if !work_dir.is_absolute() {
            return Err(RunnerError::Config(format!(
                "docker work_dir must be absolute, got '{}'",
                settings.work_dir
            )));
        }

        let capture_dir = match &settings.capture_dir {
            Some(dir) => StoreDir::new(dir.as_str()),
            None => StoreDir::new(work_dir.join(LOGS_DIR_NAME).to_string_lossy().into_owned()),
        };
        if !capture_dir.as_str().starts_with('/') {
            return Err(RunnerError::Config(format!(
                "docker capture_dir must be absolute, got '{capture_dir}'"
            )));
        }

        Ok(Self {
            work_dir,
            capture_dir,
            debug: settings.debug,
            store,
            docker: vec!["docker".to_string()],
        })
    }

    /// Replace the command used to invoke Docker (e.g. `["podman"]`).
    pub fn with_docker_command(mut self, argv: Vec<String>) -> Self {
        if !argv.is_empty() {
            self.docker = argv;
        }
        self
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.work_dir.join(VOLUMES_DIR_NAME)
    }

    pub fn capture_dir(&self) -> &StoreDir {
        &self.capture_dir
    }
}

/// `uid:gid` of the volume directory's owner, so container writes stay
/// readable by the host user.
#[cfg(unix)]
async fn volume_owner(volume: &Volume) -> Result<Option<String>, RunnerError> {
    use std::os::unix::fs::MetadataExt;

    let meta = tokio::fs::metadata(volume.as_str())
        .await
        .map_err(|e| RunnerError::Volume(format!("failed to stat volume {volume}: {e}")))?;
    Ok(Some(format!("{}:{}", meta.uid(), meta.gid())))
}

#[cfg(not(unix))]
async fn volume_owner(_volume: &Volume) -> Result<Option<String>, RunnerError> {
    Ok(None)
}

fn volume_dir(volume: &Volume) -> StoreDir {
    StoreDir::new(volume.as_str())
}

impl Runner for DockerRunner {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create_volume(&self, min_size: VolumeSize) -> Result<Volume, RunnerError> {
        let dir = self.volumes_dir().join(Uuid::now_v7().to_string());
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            RunnerError::Volume(format!("failed to create volume {}: {e}", dir.display()))
        })?;

        let volume = Volume::new(dir.to_string_lossy().into_owned());
        tracing::debug!(volume = %volume, min_size, "created volume");
        Ok(volume)
    }

    async fn delete_volume(&self, volume: &Volume) -> Result<(), RunnerError> {
        if self.debug {
            tracing::debug!(volume = %volume, "debug mode, keeping volume");
            return Ok(());
        }

        tokio::fs::remove_dir_all(Path::new(volume.as_str()))
            .await
            .map_err(|e| RunnerError::Volume(format!("failed to delete volume {volume}: {e}")))?;
        tracing::debug!(volume = %volume, "deleted volume");
        Ok(())
    }

    async fn add_file(
        &self,
        source: &StorePath,
        volume: &Volume,
        dest_name: &str,
    ) -> Result<(), RunnerError> {
        let dest = volume_dir(volume).path_to(dest_name);
        let data = self.store.load(source).await?;
        let bytes = self.store.save(&dest, data).await?;
        tracing::debug!(source = %source, dest = %dest, bytes, "staged file");
        Ok(())
    }

    async fn extract_file(
        &self,
        source: &StorePath,
        volume: &Volume,
        dest_dir: &StoreDir,
    ) -> Result<(), RunnerError> {
        let name = source.file_name();
        let src = volume_dir(volume).path_to(name);
        let dest = dest_dir.path_to(name);

        let data = self.store.load(&src).await?;
        let bytes = self.store.save(&dest, data).await?;
        tracing::debug!(source = %src, dest = %dest, bytes, "extracted file");
        Ok(())
    }

    async fn run(&self, task: &mut TaskInstance, volume: &Volume) -> Result<(), RunnerError> {
        let user = volume_owner(volume).await?;
        let argv = docker_run_argv(&self.docker, task.spec(), volume, user.as_deref());

        tracing::info!(task = %task.name(), instance = %task.id(), "running task");
        let output = run_command(&argv, None).await?;
        let captured = record_output(&self.store, &self.capture_dir, task, output).await?;
        tracing::debug!(
            task = %task.name(),
            stdout = %captured.stdout,
            "task finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use flowork_types::task::TaskSpec;

    use super::*;
    use crate::store::LocalStore;

    fn settings(tmp: &TempDir, debug: bool) -> DockerSettings {
        DockerSettings {
            work_dir: tmp.path().to_string_lossy().into_owned(),
            capture_dir: None,
            debug,
        }
    }

    fn runner(tmp: &TempDir, debug: bool) -> DockerRunner {
        DockerRunner::new(&settings(tmp, debug), Arc::new(BoxStore::new(LocalStore::new()))).unwrap()
    }

    fn task(cmd: &[&str]) -> TaskInstance {
        TaskInstance::new(Arc::new(TaskSpec {
            name: "count".to_string(),
            description: String::new(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            image: "alpine:3".to_string(),
            work_dir: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }))
    }

    /// A stand-in for `docker` that echoes its arguments and exits with the
    /// status given as the last argument.
    fn fake_docker(tmp: &TempDir) -> Vec<String> {
        let script = tmp.path().join("fake-docker.sh");
        std::fs::write(
            &script,
            "echo \"$@\"\necho to-stderr >&2\nfor last; do :; done\nexit \"$last\"\n",
        )
        .unwrap();
        vec!["sh".to_string(), script.to_string_lossy().into_owned()]
    }

    #[test]
    fn relative_work_dir_is_rejected() {
        let settings = DockerSettings {
            work_dir: "relative/dir".to_string(),
            capture_dir: None,
            debug: false,
        };
        let err = DockerRunner::new(&settings, Arc::new(BoxStore::new(LocalStore::new())))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Config(_)));
    }

    #[tokio::test]
    async fn volume_lifecycle_moves_files_through_store() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(&tmp, false);

        let input = tmp.path().join("input.txt");
        tokio::fs::write(&input, "hello").await.unwrap();

        let volume = runner.create_volume(0).await.unwrap();
        assert!(Path::new(volume.as_str()).starts_with(runner.volumes_dir()));
        assert!(Path::new(volume.as_str()).is_dir());

        runner
            .add_file(
                &StorePath::new(input.to_string_lossy().into_owned()),
                &volume,
                "staged.txt",
            )
            .await
            .unwrap();
        let staged = Path::new(volume.as_str()).join("staged.txt");
        assert_eq!(tokio::fs::read_to_string(&staged).await.unwrap(), "hello");

        let out_dir = StoreDir::new(tmp.path().join("out").to_string_lossy().into_owned());
        runner
            .extract_file(&StorePath::new("staged.txt"), &volume, &out_dir)
            .await
            .unwrap();
        let extracted = tmp.path().join("out").join("staged.txt");
        assert_eq!(tokio::fs::read_to_string(&extracted).await.unwrap(), "hello");

        runner.delete_volume(&volume).await.unwrap();
        assert!(!Path::new(volume.as_str()).exists());
    }

    #[tokio::test]
    async fn debug_mode_keeps_volumes() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(&tmp, true);

        let volume = runner.create_volume(0).await.unwrap();
        runner.delete_volume(&volume).await.unwrap();
        assert!(Path::new(volume.as_str()).is_dir());
    }

    #[tokio::test]
    async fn extract_missing_output_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(&tmp, false);
        let volume = runner.create_volume(0).await.unwrap();

        let err = runner
            .extract_file(
                &StorePath::new("missing.txt"),
                &volume,
                &StoreDir::new(tmp.path().to_string_lossy().into_owned()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Store(flowork_types::error::StoreError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_records_captured_output() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(&tmp, false).with_docker_command(fake_docker(&tmp));
        let volume = runner.create_volume(0).await.unwrap();
        let mut inst = task(&["echo", "0"]);

        runner.run(&mut inst, &volume).await.unwrap();

        let captured = inst.captured().unwrap().clone();
        assert_eq!(captured.exit_code, 0);
        assert!(captured.stdout.as_str().starts_with(runner.capture_dir().as_str()));
        assert!(captured.stdout.as_str().contains(&inst.id().to_string()));

        let stdout = tokio::fs::read_to_string(captured.stdout.as_str()).await.unwrap();
        assert!(stdout.starts_with(&format!("run --rm -v {volume}:/work -w /work -u ")));
        assert!(stdout.trim_end().ends_with("alpine:3 echo 0"));

        let stderr = tokio::fs::read_to_string(captured.stderr.as_str()).await.unwrap();
        assert_eq!(stderr, "to-stderr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_task_failure() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(&tmp, false).with_docker_command(fake_docker(&tmp));
        let volume = runner.create_volume(0).await.unwrap();
        let mut inst = task(&["sh", "-c", "exit 3", "3"]);

        let err = runner.run(&mut inst, &volume).await.unwrap_err();
        match err {
            RunnerError::TaskFailed { task, code, stderr_path } => {
                assert_eq!(task, "count");
                assert_eq!(code, 3);
                assert!(stderr_path.ends_with("stderr.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(inst.captured().map(|c| c.exit_code), Some(3));
    }
}
