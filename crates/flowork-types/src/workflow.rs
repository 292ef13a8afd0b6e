//! Workflow definition type.
//!
//! A workflow is a linear, ordered list of task specifications applied
//! identically to every input file.

use serde::{Deserialize, Serialize};

use crate::task::TaskSpec;

/// An ordered list of tasks, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name, used for logs and UI only.
    #[serde(default)]
    pub name: String,
    /// Optional longer description.
    #[serde(default, rename = "desc")]
    pub description: String,
    /// Tasks to execute, in order.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl Workflow {
    /// The first task, which receives the job's input file.
    pub fn first_task(&self) -> Option<&TaskSpec> {
        self.tasks.first()
    }

    /// The last task, whose outputs are extracted.
    pub fn last_task(&self) -> Option<&TaskSpec> {
        self.tasks.last()
    }
}
