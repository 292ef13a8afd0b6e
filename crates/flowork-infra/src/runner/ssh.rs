//! Remote runner over the `ssh` client.
//!
//! Every operation is a single non-interactive `ssh` invocation. Volumes are
//! directories on the remote host. File contents are piped through
//! `cat` in both directions, so the local side can read from or write to any
//! store. Tasks run under the remote Docker daemon as `<user>:<user>`.

use std::process::Stdio;
use std::sync::Arc;

use uuid::Uuid;

use flowork_core::runner::Runner;
use flowork_core::store::{BoxStore, ByteStream, Store};
use flowork_types::config::SshSettings;
use flowork_types::error::RunnerError;
use flowork_types::files::{StoreDir, StorePath};
use flowork_types::task::TaskInstance;
use flowork_types::volume::{Volume, VolumeSize};

use super::capture::record_output;
use super::command::{display_argv, docker_run_argv, run_command, shell_quote};
use super::{LOGS_DIR_NAME, VOLUMES_DIR_NAME};

#[derive(Debug)]
pub struct SshRunner {
    host: String,
    port: u16,
    user: String,
    identity_file: Option<String>,
    work_dir: StoreDir,
    capture_dir: StoreDir,
    debug: bool,
    store: Arc<BoxStore>,
    ssh: Vec<String>,
}

impl SshRunner {
    pub fn new(settings: &SshSettings, store: Arc<BoxStore>) -> Result<Self, RunnerError> {
        if settings.host.trim().is_empty() {
            return Err(RunnerError::Config("ssh host is required".to_string()));
        }
        if settings.user.trim().is_empty() {
            return Err(RunnerError::Config("ssh user is required".to_string()));
        }
        if !settings.work_dir.starts_with('/') {
            return Err(RunnerError::Config(format!(
                "ssh work_dir must be absolute, got '{}'",
                settings.work_dir
            )));
        }

        let capture_dir = match &settings.capture_dir {
            Some(dir) => StoreDir::new(dir.as_str()),
            None => StoreDir::new(
                std::env::temp_dir()
                    .join("flowork")
                    .join(LOGS_DIR_NAME)
                    .to_string_lossy()
                    .into_owned(),
            ),
        };

        Ok(Self {
            host: settings.host.clone(),
            port: settings.port,
            user: settings.user.clone(),
            identity_file: settings.identity_file.clone(),
            work_dir: StoreDir::new(settings.work_dir.as_str()),
            capture_dir,
            debug: settings.debug,
            store,
            ssh: vec!["ssh".to_string()],
        })
    }

    /// Replace the command used to invoke the ssh client.
    pub fn with_ssh_command(mut self, argv: Vec<String>) -> Self {
        if !argv.is_empty() {
            self.ssh = argv;
        }
        self
    }

    pub fn capture_dir(&self) -> &StoreDir {
        &self.capture_dir
    }

    /// Full local argv that runs `remote` (a shell command line) on the host.
    fn ssh_argv(&self, remote: &str) -> Vec<String> {
        let mut argv = self.ssh.clone();
        argv.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ]);
        if let Some(identity) = &self.identity_file {
            argv.push("-i".to_string());
            argv.push(identity.clone());
        }
        argv.push(format!("{}@{}", self.user, self.host));
        argv.push(remote.to_string());
        argv
    }

    /// Remote command line that runs `task` in `volume`.
    fn remote_run_command(&self, task: &TaskInstance, volume: &Volume) -> String {
        let user = format!("{0}:{0}", self.user);
        let argv = docker_run_argv(&["docker".to_string()], task.spec(), volume, Some(&user));
        display_argv(&argv)
    }

    async fn exec(&self, remote: &str, stdin: Option<ByteStream>) -> Result<(), RunnerError> {
        let argv = self.ssh_argv(remote);
        run_command(&argv, stdin).await?.check(&argv)?;
        Ok(())
    }
}

impl Runner for SshRunner {
    fn name(&self) -> &str {
        "ssh"
    }

    async fn create_volume(&self, min_size: VolumeSize) -> Result<Volume, RunnerError> {
        let dir = self
            .work_dir
            .sub_dir(VOLUMES_DIR_NAME)
            .sub_dir(&Uuid::now_v7().to_string());

        self.exec(&format!("mkdir -p {}", shell_quote(dir.as_str())), None)
            .await
            .map_err(|e| RunnerError::Volume(format!("failed to create volume {dir}: {e}")))?;

        tracing::debug!(host = %self.host, volume = %dir, min_size, "created remote volume");
        Ok(Volume::new(dir.as_str()))
    }

    async fn delete_volume(&self, volume: &Volume) -> Result<(), RunnerError> {
        if self.debug {
            tracing::debug!(host = %self.host, volume = %volume, "debug mode, keeping volume");
            return Ok(());
        }

        self.exec(&format!("rm -rf {}", shell_quote(volume.as_str())), None)
            .await
            .map_err(|e| RunnerError::Volume(format!("failed to delete volume {volume}: {e}")))?;
        tracing::debug!(host = %self.host, volume = %volume, "deleted remote volume");
        Ok(())
    }

    async fn add_file(
        &self,
        source: &StorePath,
        volume: &Volume,
        dest_name: &str,
    ) -> Result<(), RunnerError> {
        let dest = StoreDir::new(volume.as_str()).path_to(dest_name);
        let data = self.store.load(source).await?;
        self.exec(&format!("cat > {}", shell_quote(dest.as_str())), Some(data))
            .await?;
        tracing::debug!(source = %source, dest = %dest, "staged remote file");
        Ok(())
    }

    async fn extract_file(
        &self,
        source: &StorePath,
        volume: &Volume,
        dest_dir: &StoreDir,
    ) -> Result<(), RunnerError> {
        let name = source.file_name();
        let src = StoreDir::new(volume.as_str()).path_to(name);
        let dest = dest_dir.path_to(name);
        let argv = self.ssh_argv(&format!("cat {}", shell_quote(src.as_str())));

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RunnerError::Config("empty ssh command".to_string()))?;
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: display_argv(&argv),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Config("ssh stdout was not captured".to_string()))?;
        let saved = self.store.save(&dest, Box::pin(stdout)).await;

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| RunnerError::Spawn {
                command: display_argv(&argv),
                source,
            })?;
        if !output.status.success() {
            return Err(RunnerError::CommandFailed {
                command: display_argv(&argv),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let bytes = saved?;
        tracing::debug!(source = %src, dest = %dest, bytes, "extracted remote file");
        Ok(())
    }

    async fn run(&self, task: &mut TaskInstance, volume: &Volume) -> Result<(), RunnerError> {
        let argv = self.ssh_argv(&self.remote_run_command(task, volume));

        tracing::info!(
            host = %self.host,
            task = %task.name(),
            instance = %task.id(),
            "running remote task"
        );
        let output = run_command(&argv, None).await?;
        record_output(&self.store, &self.capture_dir, task, output).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use flowork_types::task::TaskSpec;

    use super::*;
    use crate::store::LocalStore;

    fn settings(work_dir: &str) -> SshSettings {
        SshSettings {
            host: "batch-01".to_string(),
            port: 2222,
            user: "flow".to_string(),
            identity_file: Some("/keys/id_ed25519".to_string()),
            work_dir: work_dir.to_string(),
            capture_dir: None,
            debug: false,
        }
    }

    fn store() -> Arc<BoxStore> {
        Arc::new(BoxStore::new(LocalStore::new()))
    }

    /// A stand-in for `ssh` that ignores its options and runs the remote
    /// command locally.
    fn fake_ssh(tmp: &TempDir) -> Vec<String> {
        let script = tmp.path().join("fake-ssh.sh");
        std::fs::write(&script, "for last; do :; done\nexec sh -c \"$last\"\n").unwrap();
        vec!["sh".to_string(), script.to_string_lossy().into_owned()]
    }

    #[test]
    fn missing_host_or_user_is_config_error() {
        let mut s = settings("/tmp/flowork");
        s.host.clear();
        assert!(matches!(
            SshRunner::new(&s, store()).unwrap_err(),
            RunnerError::Config(_)
        ));

        let mut s = settings("/tmp/flowork");
        s.user.clear();
        assert!(matches!(
            SshRunner::new(&s, store()).unwrap_err(),
            RunnerError::Config(_)
        ));
    }

    #[test]
    fn ssh_argv_has_batch_mode_port_and_identity() {
        let runner = SshRunner::new(&settings("/tmp/flowork"), store()).unwrap();
        assert_eq!(
            runner.ssh_argv("true"),
            vec![
                "ssh",
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "flow@batch-01",
                "true",
            ]
        );
    }

    #[test]
    fn remote_run_uses_login_user_and_quotes_args() {
        let runner = SshRunner::new(&settings("/tmp/flowork"), store()).unwrap();
        let inst = TaskInstance::new(Arc::new(TaskSpec {
            name: "count".to_string(),
            description: String::new(),
            cmd: vec!["sh".to_string(), "-c".to_string(), "wc -l in.txt".to_string()],
            image: "alpine:3".to_string(),
            work_dir: "/data".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }));

        assert_eq!(
            runner.remote_run_command(&inst, &Volume::new("/tmp/flowork/volumes/v1")),
            "docker run --rm -v /tmp/flowork/volumes/v1:/data -w /data -u flow:flow alpine:3 sh -c 'wc -l in.txt'"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn volume_lifecycle_over_fake_ssh() {
        let tmp = TempDir::new().unwrap();
        let remote = tmp.path().join("remote");
        let runner = SshRunner::new(&settings(&remote.to_string_lossy()), store())
            .unwrap()
            .with_ssh_command(fake_ssh(&tmp));

        let input = tmp.path().join("input.txt");
        tokio::fs::write(&input, "remote data").await.unwrap();

        let volume = runner.create_volume(0).await.unwrap();
        let volumes = remote.join("volumes");
        assert!(volume.as_str().starts_with(&*volumes.to_string_lossy()));
        assert!(std::path::Path::new(volume.as_str()).is_dir());

        runner
            .add_file(
                &StorePath::new(input.to_string_lossy().into_owned()),
                &volume,
                "in.txt",
            )
            .await
            .unwrap();

        let out = tmp.path().join("out");
        runner
            .extract_file(
                &StorePath::new("in.txt"),
                &volume,
                &StoreDir::new(out.to_string_lossy().into_owned()),
            )
            .await
            .unwrap();
        assert_eq!(
            tokio::fs::read_to_string(out.join("in.txt")).await.unwrap(),
            "remote data"
        );

        runner.delete_volume(&volume).await.unwrap();
        assert!(!std::path::Path::new(volume.as_str()).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn extract_missing_remote_file_fails() {
        let tmp = TempDir::new().unwrap();
        let runner = SshRunner::new(&settings(&tmp.path().to_string_lossy()), store())
            .unwrap()
            .with_ssh_command(fake_ssh(&tmp));
        let volume = runner.create_volume(0).await.unwrap();

        let err = runner
            .extract_file(
                &StorePath::new("nope.txt"),
                &volume,
                &StoreDir::new(tmp.path().join("out").to_string_lossy().into_owned()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::CommandFailed { .. }));
    }
}
