use anyhow::{Context, Result};
use ci_pipeline::cli::commands::{MatrixCommand, PlanCommand, RunCommand, ValidateCommand};
use ci_pipeline::cli::output::*;
use ci_pipeline::cli::{Cli, Command};
use ci_pipeline::core::{config::PipelineConfig, ExecutionContext, Pipeline, PipelineResult};
use ci_pipeline::execution::{ExecutionEvent, PipelineOrchestrator, ProcessRunner};
use indicatif::ProgressBar;
use std::path::Path;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit code for configuration, context and matrix resolution errors
const EXIT_USAGE: i32 = 2;

/// Exit code when the run is interrupted with Ctrl-C
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::from_args();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{} {:#}", CROSS, e);
    }

    let code = match dispatch(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            EXIT_USAGE
        }
    };

    std::process::exit(code);
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")
}

async fn dispatch(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.config.as_deref()).await,
        Command::Plan(cmd) => plan_pipeline(cmd, cli.config.as_deref()),
        Command::Matrix(cmd) => show_matrix(cmd, cli.config.as_deref()),
        Command::Validate(cmd) => validate_pipeline(cmd, cli.config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load pipeline config {}", path.display())),
        None => PipelineConfig::builtin().context("Failed to load built-in pipeline config"),
    }
}

fn load_pipeline(path: Option<&Path>) -> Result<Pipeline> {
    let config = load_config(path)?;
    let working_dir = std::env::current_dir().context("Failed to determine working directory")?;
    Ok(config.to_pipeline().with_working_dir(working_dir))
}

async fn run_pipeline(cmd: &RunCommand, config: Option<&Path>) -> Result<i32> {
    let pipeline = load_pipeline(config)?;
    let context = ExecutionContext::from_env(&cmd.context.overrides()).context("Invalid execution context")?;

    // stdout carries the JSON result
    let runner = if cmd.json {
        ProcessRunner::new().with_stdout_to_stderr()
    } else {
        ProcessRunner::new()
    };
    let mut orchestrator = PipelineOrchestrator::new(pipeline, runner);

    let progress = if !cmd.json && console::user_attended_stderr() {
        Some(create_progress_bar(0))
    } else {
        None
    };

    if !cmd.json {
        let progress = progress.clone();
        orchestrator = orchestrator.with_event_handler(move |event| {
            let line = format_execution_event(&event);
            match &progress {
                Some(progress) => {
                    track_progress(progress, &event);
                    progress.println(line);
                }
                None => println!("{}", line),
            }
        });
    }

    let result = tokio::select! {
        result = orchestrator.execute(&context) => result?,
        _ = tokio::signal::ctrl_c() => {
            if let Some(progress) = &progress {
                progress.abandon();
            }
            eprintln!("\n{} {}", WARN, style("Interrupted, running step terminated").yellow());
            return Ok(EXIT_INTERRUPTED);
        }
    };

    if let Some(progress) = &progress {
        progress.finish_and_clear();
    }

    if let Some(path) = &cmd.report {
        write_report(&result, path)?;
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
        if let Some(path) = &cmd.report {
            println!("{} Report written to {}", INFO, style(path.display()).dim());
        }
    }

    Ok(result.exit_code())
}

fn track_progress(progress: &ProgressBar, event: &ExecutionEvent) {
    match event {
        ExecutionEvent::EntryResolved { step_count, .. } => progress.set_length(*step_count as u64),
        ExecutionEvent::StepStarted { step, .. } => progress.set_message(step.clone()),
        ExecutionEvent::StepFinished { .. } | ExecutionEvent::StepSkipped { .. } => progress.inc(1),
        _ => {}
    }
}

fn write_report(result: &PipelineResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report to {}", path.display()))
}

fn print_summary(result: &PipelineResult) {
    if result.results.is_empty() {
        println!(
            "\n{} {} {}",
            SKIP,
            format_entry(&result.entry),
            format_status(result.overall_status)
        );
        return;
    }

    println!("\n{}", format_result_table(result));

    if result.is_pass() {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&result.pipeline_name).bold(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} {} (exit code {})",
            CROSS,
            style(&result.pipeline_name).bold(),
            style("failed").red(),
            result.exit_code()
        );
    }
}

fn plan_pipeline(cmd: &PlanCommand, config: Option<&Path>) -> Result<i32> {
    let pipeline = load_pipeline(config)?;
    let context = ExecutionContext::from_env(&cmd.context.overrides()).context("Invalid execution context")?;

    let orchestrator = PipelineOrchestrator::new(pipeline, ProcessRunner::new());
    let plan = orchestrator.plan(&context)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", format_plan(&plan));
    }

    Ok(0)
}

fn show_matrix(cmd: &MatrixCommand, config: Option<&Path>) -> Result<i32> {
    let pipeline = load_pipeline(config)?;
    let entries = pipeline.matrix.entries();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }

    println!("{} Matrix for {}:", INFO, style(&pipeline.name).bold());
    for entry in &pipeline.matrix.include {
        if pipeline.matrix.is_excluded(entry) {
            println!("  {} {} {}", SKIP, format_entry(entry), style("(excluded)").dim());
        } else {
            println!(
                "  {} {} - {} steps",
                CHECK,
                format_entry(entry),
                style(pipeline.steps_for(entry).len()).cyan()
            );
        }
    }
    if entries.is_empty() {
        println!("  {}", style("no entries").dim());
    }

    Ok(0)
}

fn validate_pipeline(cmd: &ValidateCommand, config: Option<&Path>) -> Result<i32> {
    println!("{} Validating pipeline...", INFO);

    match load_config(config) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Matrix entries: {}", style(config.matrix.include.len()).cyan());
            println!("  Exclusion rules: {}", style(config.matrix.exclude.len()).cyan());
            println!("  Steps: {}", style(config.steps.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(0)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(EXIT_USAGE)
        }
    }
}
