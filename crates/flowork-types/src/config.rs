//! Configuration types for Flowork.
//!
//! `FloworkConfig` represents the top-level `flowork.toml`. Every section and
//! field has a default, so an empty file (or no file) is a valid config.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a Flowork run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloworkConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub docker: DockerSettings,
    #[serde(default)]
    pub ssh: SshSettings,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Concurrency, retry and failure-budget settings for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Maximum number of jobs executing at once. Zero or negative means
    /// unlimited.
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,

    /// Retries allowed per job after its first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Failed attempts tolerated before retries are suppressed and intake
    /// stops. `None` means unlimited.
    #[serde(default)]
    pub max_failures: Option<usize>,

    /// Capacity of the work queue between intake and dispatch. Defaults to
    /// `concurrency + 1`.
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Minimum volume size in bytes requested from the runner.
    #[serde(default)]
    pub volume_size: u64,
}

fn default_concurrency() -> i64 {
    4
}

fn default_max_retries() -> u32 {
    2
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            max_failures: None,
            queue_capacity: None,
            volume_size: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Runner selection
// ---------------------------------------------------------------------------

/// Which runner implementation executes tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    #[default]
    Docker,
    Ssh,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Docker => write!(f, "docker"),
            RunnerKind::Ssh => write!(f, "ssh"),
        }
    }
}

impl std::str::FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(RunnerKind::Docker),
            "ssh" => Ok(RunnerKind::Ssh),
            other => Err(format!("unknown runner kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSettings {
    #[serde(default)]
    pub kind: RunnerKind,
}

// ---------------------------------------------------------------------------
// Docker
// ---------------------------------------------------------------------------

/// Settings for the local Docker runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerSettings {
    /// Host directory under which `volumes/<id>` directories are created.
    #[serde(default = "default_docker_work_dir")]
    pub work_dir: String,

    /// Where captured stdout/stderr are saved. Defaults to `<work_dir>/logs`.
    #[serde(default)]
    pub capture_dir: Option<String>,

    /// Keep volumes after each job for inspection.
    #[serde(default)]
    pub debug: bool,
}

fn default_docker_work_dir() -> String {
    std::env::temp_dir()
        .join("flowork")
        .to_string_lossy()
        .into_owned()
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            work_dir: default_docker_work_dir(),
            capture_dir: None,
            debug: false,
        }
    }
}

// ---------------------------------------------------------------------------
// SSH
// ---------------------------------------------------------------------------

/// Settings for the remote SSH runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Remote login user. Tasks run in containers as `<user>:<user>`.
    #[serde(default)]
    pub user: String,

    /// Private key passed with `-i`, if any.
    #[serde(default)]
    pub identity_file: Option<String>,

    /// Remote directory under which `volumes/<id>` directories are created.
    #[serde(default = "default_ssh_work_dir")]
    pub work_dir: String,

    /// Local directory for captured stdout/stderr. Defaults to a `logs`
    /// directory under the local temp dir.
    #[serde(default)]
    pub capture_dir: Option<String>,

    #[serde(default)]
    pub debug: bool,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_work_dir() -> String {
    "/tmp/flowork".to_string()
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            user: String::new(),
            identity_file: None,
            work_dir: default_ssh_work_dir(),
            capture_dir: None,
            debug: false,
        }
    }
}
