//! Volume handle type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle to a working directory allocated by a runner for one job.
///
/// For the Docker runner this is a host directory; for the SSH runner it is a
/// directory on the remote machine. The core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(String);

impl Volume {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested minimum volume capacity in bytes. Zero means the runner's
/// default minimum.
pub type VolumeSize = u64;
