//! `flowork validate`: load and check a workflow definition.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use flowork_core::workflow::{load_workflow_file, validate_workflow};

pub fn validate(path: &Path, json: bool, quiet: bool) -> Result<()> {
    let workflow = load_workflow_file(path)
        .with_context(|| format!("Failed to load workflow {}", path.display()))?;
    validate_workflow(&workflow)
        .with_context(|| format!("Invalid workflow {}", path.display()))?;

    if json {
        let report = serde_json::json!({
            "valid": true,
            "name": workflow.name,
            "tasks": workflow.tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!();
    println!(
        "  {} Workflow '{}' is valid ({} task(s))",
        style("✓").green(),
        style(&workflow.name).cyan(),
        workflow.tasks.len()
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Task").fg(Color::White),
        Cell::new("Image").fg(Color::White),
        Cell::new("Inputs").fg(Color::White),
        Cell::new("Outputs").fg(Color::White),
    ]);
    for (i, task) in workflow.tasks.iter().enumerate() {
        let names = |files: &[flowork_types::files::StorePath]| {
            files
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&task.name),
            Cell::new(&task.image).fg(Color::Cyan),
            Cell::new(names(&task.inputs)),
            Cell::new(names(&task.outputs)),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}
