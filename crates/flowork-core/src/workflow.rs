//! Workflow and task definition loading and validation.
//!
//! Definitions are JSON documents. Parsing always runs validation, so any
//! `Workflow` or `TaskSpec` returned from here is structurally valid.

use std::path::Path;

use thiserror::Error;

use flowork_types::files::StorePath;
use flowork_types::task::TaskSpec;
use flowork_types::workflow::Workflow;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// JSON parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a workflow from a JSON string.
pub fn parse_workflow_json(json: &str) -> Result<Workflow, WorkflowError> {
    let workflow: Workflow =
        serde_json::from_str(json).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// Parse and validate a single task from a JSON string.
pub fn parse_task_json(json: &str) -> Result<TaskSpec, WorkflowError> {
    let task: TaskSpec =
        serde_json::from_str(json).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    validate_task(&task)?;
    Ok(task)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a workflow.
///
/// Checks:
/// - At least one task exists
/// - Every task passes [`validate_task`]
pub fn validate_workflow(workflow: &Workflow) -> Result<(), WorkflowError> {
    if workflow.tasks.is_empty() {
        return Err(WorkflowError::Validation(
            "workflow must have at least one task".to_string(),
        ));
    }
    for (i, task) in workflow.tasks.iter().enumerate() {
        validate_task(task).map_err(|e| match e {
            WorkflowError::Validation(msg) => {
                WorkflowError::Validation(format!("task {}: {msg}", i + 1))
            }
            other => other,
        })?;
    }
    Ok(())
}

/// Validate structural constraints on a task.
///
/// Checks:
/// - Name, image and command are non-empty
/// - Inputs and outputs are bare file names (no directories)
pub fn validate_task(task: &TaskSpec) -> Result<(), WorkflowError> {
    if task.name.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "task name must not be empty".to_string(),
        ));
    }
    if task.image.trim().is_empty() {
        return Err(WorkflowError::Validation(format!(
            "task '{}' has no image",
            task.name
        )));
    }
    if task.cmd.is_empty() {
        return Err(WorkflowError::Validation(format!(
            "task '{}' has no command",
            task.name
        )));
    }
    for (kind, files) in [("input", &task.inputs), ("output", &task.outputs)] {
        for file in files {
            check_bare_name(&task.name, kind, file)?;
        }
    }
    Ok(())
}

fn check_bare_name(task: &str, kind: &str, file: &StorePath) -> Result<(), WorkflowError> {
    let name = file.as_str();
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(WorkflowError::Validation(format!(
            "task '{task}' {kind} '{name}' must be a bare file name"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a JSON file.
pub fn load_workflow_file(path: &Path) -> Result<Workflow, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_json(&content)
}

/// Load a single task definition from a JSON file.
pub fn load_task_file(path: &Path) -> Result<TaskSpec, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_task_json(&content)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
