//! `flowork run`: execute a workflow over a directory of inputs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tracing::{info, warn};

use flowork_core::engine::{JobEngine, NoopEngine, VolumeEngine};
use flowork_core::error_set::{ErrorSet, JoinedError};
use flowork_core::inputs::{PathFilter, PathSource};
use flowork_core::job::JobFactory;
use flowork_core::pipeline::{Pipeline, PipelineConfig};
use flowork_core::sink::{LogSink, RunSummary, SummarySink};
use flowork_core::store::{BoxStore, Store};
use flowork_core::workflow::{load_workflow_file, validate_workflow};
use flowork_infra::inputs::local_dir_source;
use flowork_infra::runner::build_runner;
use flowork_infra::store::default_store;
use flowork_types::config::{FloworkConfig, RunnerKind};
use flowork_types::files::StoreDir;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the workflow JSON file.
    pub workflow: PathBuf,

    /// Directory whose regular files become job inputs.
    #[arg(long, short = 'i')]
    pub inputs: PathBuf,

    /// Directory receiving each job's outputs.
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Runner to execute tasks with.
    #[arg(long)]
    pub runner: Option<RunnerKind>,

    /// Maximum jobs running at once (0 or negative for unlimited).
    #[arg(long, short = 'c', allow_negative_numbers = true)]
    pub concurrency: Option<i64>,

    /// Retries per job after the first attempt.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Failed attempts tolerated before the run stops taking new inputs.
    #[arg(long)]
    pub max_failures: Option<usize>,

    /// Only use inputs with this extension (repeatable; all must match).
    #[arg(long = "ext")]
    pub extensions: Vec<String>,

    /// Only use inputs whose path matches this regex (repeatable; all must match).
    #[arg(long = "match")]
    pub patterns: Vec<String>,

    /// Build jobs and walk the pipeline without running any task.
    #[arg(long)]
    pub dry_run: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long)]
    pub otel: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of file configuration.
    pub fn apply_to(&self, config: &mut FloworkConfig) {
        if let Some(kind) = self.runner {
            config.runner.kind = kind;
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency;
        }
        if let Some(retries) = self.max_retries {
            config.pipeline.max_retries = retries;
        }
        if let Some(failures) = self.max_failures {
            config.pipeline.max_failures = Some(failures);
        }
    }

    pub fn filters(&self) -> Result<Vec<PathFilter>> {
        let mut filters: Vec<PathFilter> = self
            .extensions
            .iter()
            .map(|ext| PathFilter::extension(ext))
            .collect();
        for pattern in &self.patterns {
            let filter = PathFilter::regex(pattern)
                .with_context(|| format!("Invalid --match pattern '{pattern}'"))?;
            filters.push(filter);
        }
        Ok(filters)
    }
}

/// Execute `flowork run`.
pub async fn run(args: RunArgs, mut config: FloworkConfig, json: bool, quiet: bool) -> Result<()> {
    args.apply_to(&mut config);

    let workflow = load_workflow_file(&args.workflow)
        .with_context(|| format!("Failed to load workflow {}", args.workflow.display()))?;
    validate_workflow(&workflow)
        .with_context(|| format!("Invalid workflow {}", args.workflow.display()))?;

    let inputs = absolute_dir(&args.inputs)?;
    let output = absolute_dir(&args.output)?;
    let filters = args.filters()?;

    let store = Arc::new(BoxStore::new(default_store()));
    let runner = Arc::new(
        build_runner(&config, Arc::clone(&store)).context("Failed to configure runner")?,
    );
    info!(
        workflow = %workflow.name,
        tasks = workflow.tasks.len(),
        runner = %config.runner.kind,
        inputs = %inputs,
        output = %output,
        dry_run = args.dry_run,
        "starting run"
    );

    let factory = JobFactory::from_specs(workflow.tasks.clone(), runner, StoreDir::new(output));
    let pipeline_config = PipelineConfig::from(&config.pipeline);
    let errors = Arc::new(ErrorSet::new());
    let summary = Arc::new(SummarySink::new());

    let source = local_dir_source(inputs, filters);
    let stopper = source.stopper();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing running jobs without taking new inputs");
            stopper.stop();
        }
    });

    let parts = RunParts {
        factory,
        config: pipeline_config,
        errors: Arc::clone(&errors),
        summary: Arc::clone(&summary),
    };
    let result = if args.dry_run {
        execute(NoopEngine, parts, source).await
    } else {
        execute(VolumeEngine::new(config.pipeline.volume_size), parts, source).await
    };
    interrupt.abort();

    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close store");
    }

    let totals = summary.summary();
    if json {
        print_json(&workflow.name, &totals, result.as_ref().err())?;
    } else if !quiet {
        print_report(&workflow.name, &totals, result.as_ref().err());
    }

    if let Err(failures) = result {
        bail!("{} job(s) failed", failures.len());
    }
    Ok(())
}

struct RunParts {
    factory: JobFactory,
    config: PipelineConfig,
    errors: Arc<ErrorSet>,
    summary: Arc<SummarySink>,
}

async fn execute<E: JobEngine + 'static>(
    engine: E,
    parts: RunParts,
    source: PathSource,
) -> Result<(), JoinedError> {
    Pipeline::new(engine, parts.factory, parts.config, parts.errors)
        .with_sink(Arc::new(LogSink))
        .with_sink(parts.summary)
        .run(source)
        .await
}

fn absolute_dir(path: &Path) -> Result<String> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    abs.to_str()
        .map(str::to_string)
        .with_context(|| format!("Path is not valid UTF-8: {}", abs.display()))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json(workflow: &str, totals: &RunSummary, failures: Option<&JoinedError>) -> Result<()> {
    let failures: Vec<serde_json::Value> = failures
        .map(|joined| {
            joined
                .failures()
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "job_id": f.job_id.to_string(),
                        "input": f.input.to_string(),
                        "attempts": f.attempts,
                        "reason": f.reason,
                        "error": f.error.to_string(),
                        "failed_at": f.failed_at.to_rfc3339(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let report = serde_json::json!({
        "workflow": workflow,
        "summary": totals,
        "failures": failures,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_report(workflow: &str, totals: &RunSummary, failures: Option<&JoinedError>) {
    println!();
    println!(
        "  {} Workflow '{}' finished",
        style("⚡").bold(),
        style(workflow).cyan()
    );
    println!();
    println!("  Succeeded: {}", style(totals.succeeded).green());
    if totals.failed > 0 {
        println!("  Failed:    {}", style(totals.failed).red());
    }
    if totals.discarded > 0 {
        println!("  Discarded: {}", style(totals.discarded).yellow());
    }
    println!("  Attempts:  {}", style(totals.attempts).dim());
    println!();

    let Some(joined) = failures else {
        return;
    };

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Input").fg(Color::White),
        Cell::new("Attempts").fg(Color::White),
        Cell::new("Reason").fg(Color::White),
        Cell::new("Error").fg(Color::White),
    ]);
    for failure in joined.failures() {
        table.add_row(vec![
            Cell::new(failure.input.file_name()),
            Cell::new(failure.attempts),
            Cell::new(failure.reason.to_string()).fg(Color::Red),
            Cell::new(failure.error.to_string()),
        ]);
    }
    println!("{table}");
    println!();
}
