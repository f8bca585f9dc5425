//! CLI output formatting

use crate::{
    core::{
        matrix::MatrixEntry,
        result::{ExecutionResult, OverallStatus, PipelineResult, StepOutcome},
    },
    execution::{ExecutionEvent, ExecutionPlan},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over a pipeline's steps
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(progress_style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(progress_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format an overall status for display
pub fn format_status(status: OverallStatus) -> String {
    match status {
        OverallStatus::Pass => style("PASS").green().to_string(),
        OverallStatus::Fail => style("FAIL").red().to_string(),
        OverallStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a step outcome for display
pub fn format_outcome(result: &ExecutionResult) -> String {
    match &result.outcome {
        StepOutcome::Succeeded => style("OK").green().to_string(),
        StepOutcome::Failed { exit_code } if result.allow_failure => {
            style(format!("FAILED ({}, allowed)", exit_code)).yellow().to_string()
        }
        StepOutcome::Failed { exit_code } => style(format!("FAILED ({})", exit_code)).red().to_string(),
        StepOutcome::Errored { .. } if result.allow_failure => style("ERROR (allowed)").yellow().to_string(),
        StepOutcome::Errored { .. } => style("ERROR").red().to_string(),
        StepOutcome::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a matrix entry for display
pub fn format_entry(entry: &MatrixEntry) -> String {
    let mut out = style(entry.operating_system).bold().to_string();
    if let Some(version) = &entry.runtime_version {
        out.push_str(&format!(" {}", style(version).cyan()));
    }
    out.push_str(&format!(" {}", style(format!("({})", entry.language_mode)).dim()));
    if let Some(distribution) = &entry.distribution {
        out.push_str(&format!(" {}", style(format!("[{}]", distribution)).dim()));
    }
    out
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::EntryResolved { entry, step_count } => format!(
            "{} Matrix entry {} - {} steps",
            INFO,
            format_entry(entry),
            style(step_count).cyan()
        ),
        ExecutionEvent::EntryExcluded { entry } => format!(
            "{} Matrix entry {} is excluded, nothing to run",
            SKIP,
            format_entry(entry)
        ),
        ExecutionEvent::StepStarted {
            step,
            phase,
            index,
            total,
        } => format!(
            "{} [{}/{}] {} {}",
            SPINNER,
            index + 1,
            total,
            style(step).cyan(),
            style(format!("({})", phase)).dim()
        ),
        ExecutionEvent::StepFinished { result } => {
            let icon = if !result.is_failure() {
                CHECK
            } else if result.allow_failure {
                WARN
            } else {
                CROSS
            };
            let mut line = format!("{} {} {}", icon, style(&result.step).bold(), format_outcome(result));
            if let Some(duration) = result.duration() {
                line.push_str(&format!(" {}", style(format_duration(duration)).dim()));
            }
            if let StepOutcome::Errored { message, .. } = &result.outcome {
                line.push_str(&format!("\n   {}", style(message).dim()));
            }
            line
        }
        ExecutionEvent::StepSkipped { step, reason } => {
            format!("{} {} {}", SKIP, style(step).dim(), style(format!("({})", reason)).dim())
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{} Pipeline ({}) finished: {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// Per-step summary table of a finished run
pub fn format_result_table(result: &PipelineResult) -> String {
    let width = result
        .results
        .iter()
        .map(|r| r.step.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut lines = vec![format!(
        "  {:<width$}  {:<15}  {}",
        style("STEP").bold(),
        style("PHASE").bold(),
        style("RESULT").bold(),
        width = width
    )];

    for step in &result.results {
        lines.push(format!(
            "  {:<width$}  {:<15}  {}",
            step.step,
            step.phase.as_str(),
            format_outcome(step),
            width = width
        ));
    }

    lines.push(format!(
        "\n  {} executed, {} failed, {} skipped - {}",
        result.executed_count(),
        result.failed_count(),
        result.skipped_count(),
        format_status(result.overall_status)
    ));

    lines.join("\n")
}

/// Steps of an execution plan, one per line
pub fn format_plan(plan: &ExecutionPlan) -> String {
    let mut lines = vec![format!("{} Plan for {}", INFO, format_entry(&plan.entry))];

    if plan.excluded {
        lines.push(format!("  {}", style("excluded by the matrix, no steps would run").dim()));
        return lines.join("\n");
    }
    if plan.steps.is_empty() {
        lines.push(format!("  {}", style("no applicable steps").dim()));
    }

    for (index, step) in plan.steps.iter().enumerate() {
        let mut line = format!(
            "  {:>2}. {} {} {}",
            index + 1,
            style(&step.step).cyan(),
            style(format!("({})", step.phase)).dim(),
            step.command.join(" ")
        );
        if step.allow_failure {
            line.push_str(&format!(" {}", style("[allow failure]").yellow()));
        }
        if let Some(phase) = step.requires_success_of {
            line.push_str(&format!(" {}", style(format!("[requires {} to pass]", phase)).dim()));
        }
        if let Some(error) = &step.error {
            line.push_str(&format!("\n      {} {}", WARN, style(error).red()));
        }
        lines.push(line);
    }

    lines.join("\n")
}

/// Format a duration for display
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
