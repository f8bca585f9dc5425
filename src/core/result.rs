//! Execution results and pipeline aggregation

use crate::core::matrix::MatrixEntry;
use crate::core::step::{Phase, Step};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Exit code used when a failure carries no usable process exit code
pub const GENERIC_FAILURE_CODE: i32 = 1;

/// Why a step did not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// An earlier non-tolerated failure stopped the pipeline
    FailFast { after: String },
    /// The step's runtime gate names a phase that did not pass
    RequiredPhaseNotPassed { phase: Phase },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FailFast { after } => write!(f, "fail-fast after '{}'", after),
            SkipReason::RequiredPhaseNotPassed { phase } => write!(f, "{} phase did not pass", phase),
        }
    }
}

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// The subprocess exited nonzero
    Failed { exit_code: i32 },
    /// The step could not be composed or launched
    Errored {
        exit_code: Option<i32>,
        message: String,
    },
    Skipped { reason: SkipReason },
}

/// Result of one step of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step: String,
    pub phase: Phase,
    pub allow_failure: bool,

    /// Rendered command; the declared tokens when the step never ran
    pub command: Vec<String>,

    pub outcome: StepOutcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    fn for_step(step: &Step, command: Vec<String>, outcome: StepOutcome) -> Self {
        Self {
            step: step.name.clone(),
            phase: step.phase,
            allow_failure: step.allow_failure,
            command,
            outcome,
            started_at: None,
            finished_at: None,
        }
    }

    /// Result for a finished subprocess
    pub fn completed(step: &Step, command: Vec<String>, exit_code: i32) -> Self {
        let outcome = if exit_code == 0 {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed { exit_code }
        };
        Self::for_step(step, command, outcome)
    }

    /// Result for a step that could not be composed or launched
    pub fn errored(step: &Step, command: Vec<String>, exit_code: Option<i32>, message: String) -> Self {
        Self::for_step(step, command, StepOutcome::Errored { exit_code, message })
    }

    pub fn skipped(step: &Step, reason: SkipReason) -> Self {
        Self::for_step(step, step.command.clone(), StepOutcome::Skipped { reason })
    }

    pub fn with_timing(mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self.finished_at = Some(finished_at);
        self
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, StepOutcome::Skipped { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed { .. } | StepOutcome::Errored { .. })
    }

    /// A failure that stops the pipeline and fails it
    pub fn halts_pipeline(&self) -> bool {
        self.is_failure() && !self.allow_failure
    }

    /// Process exit code, if the step produced one
    pub fn exit_code(&self) -> Option<i32> {
        match &self.outcome {
            StepOutcome::Succeeded => Some(0),
            StepOutcome::Failed { exit_code } => Some(*exit_code),
            StepOutcome::Errored { exit_code, .. } => *exit_code,
            StepOutcome::Skipped { .. } => None,
        }
    }

    pub fn duration(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.signed_duration_since(start).to_std().ok(),
            _ => None,
        }
    }
}

/// Overall outcome of one matrix entry's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Pass,
    Fail,
    /// The entry was excluded from the matrix; nothing ran
    Skipped,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverallStatus::Pass => "pass",
            OverallStatus::Fail => "fail",
            OverallStatus::Skipped => "skipped",
        })
    }
}

/// `fail` if any non-tolerated step failed, `pass` otherwise
pub fn aggregate(results: &[ExecutionResult]) -> OverallStatus {
    if results.iter().any(ExecutionResult::halts_pipeline) {
        OverallStatus::Fail
    } else {
        OverallStatus::Pass
    }
}

/// Whether a phase passed: at least one of its steps ran and none failed untolerated
pub fn phase_passed(results: &[ExecutionResult], phase: Phase) -> bool {
    let mut ran = false;
    for result in results.iter().filter(|r| r.phase == phase) {
        if result.is_skipped() {
            continue;
        }
        if result.halts_pipeline() {
            return false;
        }
        ran = true;
    }
    ran
}

/// Full, reportable outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub execution_id: Uuid,
    pub pipeline_name: String,
    pub entry: MatrixEntry,
    pub results: Vec<ExecutionResult>,
    pub overall_status: OverallStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Result for an entry removed by an exclusion rule
    pub fn excluded(execution_id: Uuid, pipeline_name: &str, entry: MatrixEntry) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            pipeline_name: pipeline_name.to_string(),
            entry,
            results: Vec::new(),
            overall_status: OverallStatus::Skipped,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.overall_status == OverallStatus::Pass
    }

    pub fn result(&self, step: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.step == step)
    }

    /// The first failure that stopped or failed the pipeline
    pub fn first_halting_failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.halts_pipeline())
    }

    pub fn executed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_skipped()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_skipped()).count()
    }

    /// Process exit code: 0 unless failed, then the first halting failure's code
    pub fn exit_code(&self) -> i32 {
        match self.overall_status {
            OverallStatus::Pass | OverallStatus::Skipped => 0,
            OverallStatus::Fail => self
                .first_halting_failure()
                .and_then(ExecutionResult::exit_code)
                .filter(|code| (1..=255).contains(code))
                .unwrap_or(GENERIC_FAILURE_CODE),
        }
    }
}
