//! Process helpers shared by the Docker and SSH runners.

use std::process::Stdio;

use flowork_core::store::ByteStream;
use flowork_types::error::RunnerError;
use flowork_types::task::TaskSpec;
use flowork_types::volume::Volume;

/// Exit status and captured streams of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `-1` when the process was killed by a signal.
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Turn a non-zero exit into [`RunnerError::CommandFailed`].
    pub fn check(self, argv: &[String]) -> Result<Self, RunnerError> {
        if self.success() {
            return Ok(self);
        }
        Err(RunnerError::CommandFailed {
            command: display_argv(argv),
            code: self.code,
            stderr: self.stderr_lossy(),
        })
    }
}

/// Run `argv` to completion, capturing stdout and stderr.
///
/// When `stdin` is given it is streamed into the child and the pipe closed
/// once exhausted. A non-zero exit is *not* an error here; callers decide.
pub async fn run_command(
    argv: &[String],
    stdin: Option<ByteStream>,
) -> Result<CommandOutput, RunnerError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| RunnerError::Config("empty command".to_string()))?;

    tracing::debug!(command = %display_argv(argv), "running command");

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunnerError::Spawn {
            command: display_argv(argv),
            source,
        })?;

    let feeder = match (stdin, child.stdin.take()) {
        (Some(mut data), Some(mut pipe)) => Some(tokio::spawn(async move {
            let copied = tokio::io::copy(&mut data, &mut pipe).await;
            drop(pipe);
            copied
        })),
        _ => None,
    };

    let output = child
        .wait_with_output()
        .await
        .map_err(|source| RunnerError::Spawn {
            command: display_argv(argv),
            source,
        })?;

    if let Some(feeder) = feeder {
        match feeder.await {
            Ok(Ok(bytes)) => tracing::trace!(bytes, "streamed stdin"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to stream stdin"),
            Err(e) => tracing::warn!(error = %e, "stdin task failed"),
        }
    }

    let result = CommandOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: output.stdout,
        stderr: output.stderr,
    };
    tracing::debug!(code = result.code, "command finished");
    Ok(result)
}

/// Build the `docker run` argv for a task.
///
/// `docker` is the command prefix used to invoke Docker (normally just
/// `["docker"]`). `user` is passed with `-u` when present.
pub fn docker_run_argv(
    docker: &[String],
    spec: &TaskSpec,
    volume: &Volume,
    user: Option<&str>,
) -> Vec<String> {
    let work_dir = spec.work_dir();
    let mut argv: Vec<String> = docker.to_vec();
    argv.extend([
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{volume}:{work_dir}"),
        "-w".to_string(),
        work_dir.to_string(),
    ]);
    if let Some(user) = user {
        argv.push("-u".to_string());
        argv.push(user.to_string());
    }
    argv.push(spec.image.clone());
    argv.extend(spec.cmd.iter().cloned());
    argv
}

/// Quote `arg` for a POSIX shell. Plain words are left untouched.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Render an argv as a single shell-safe line.
pub fn display_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}
