//! Pipeline orchestrator - drives one matrix entry from resolution to a final status

use crate::{
    core::{
        environment::EnvironmentComposer,
        error::PipelineError,
        matrix::{MatrixEntry, Selection},
        result::{aggregate, phase_passed, ExecutionResult, OverallStatus, PipelineResult, SkipReason},
        step::{Phase, Step},
        ExecutionContext, Pipeline,
    },
    execution::runner::{CommandRunner, StepRunner},
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Init,
    Resolving,
    Executing,
    Aggregating,
    Done(OverallStatus),
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Init => f.write_str("init"),
            OrchestratorState::Resolving => f.write_str("resolving"),
            OrchestratorState::Executing => f.write_str("executing"),
            OrchestratorState::Aggregating => f.write_str("aggregating"),
            OrchestratorState::Done(status) => write!(f, "done ({})", status),
        }
    }
}

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
    },
    EntryResolved {
        entry: MatrixEntry,
        step_count: usize,
    },
    EntryExcluded {
        entry: MatrixEntry,
    },
    StepStarted {
        step: String,
        phase: Phase,
        index: usize,
        total: usize,
    },
    StepFinished {
        result: ExecutionResult,
    },
    StepSkipped {
        step: String,
        reason: SkipReason,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: OverallStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// A step as it would run for an entry, without running it
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub step: String,
    pub phase: Phase,
    /// Rendered command, or the declared tokens when rendering fails
    pub command: Vec<String>,
    pub allow_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_success_of: Option<Phase>,
    /// Why composing this step would fail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The steps an execution context would run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub entry: MatrixEntry,
    pub excluded: bool,
    pub steps: Vec<PlannedStep>,
}

/// Drives the pipeline for the matrix entry of one execution context
pub struct PipelineOrchestrator<R> {
    pipeline: Pipeline,
    composer: EnvironmentComposer,
    runner: StepRunner<R>,
    event_handlers: Vec<EventHandler>,
    state: Mutex<OrchestratorState>,
}

impl<R: CommandRunner> PipelineOrchestrator<R> {
    /// Orchestrator whose steps inherit this process's environment
    pub fn new(pipeline: Pipeline, runner: R) -> Self {
        let composer = EnvironmentComposer::from_process(pipeline.environment.clone());
        Self::with_composer(pipeline, composer, runner)
    }

    pub fn with_composer(pipeline: Pipeline, composer: EnvironmentComposer, runner: R) -> Self {
        Self {
            pipeline,
            composer,
            runner: StepRunner::new(runner),
            event_handlers: Vec::new(),
            state: Mutex::new(OrchestratorState::Init),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn runner(&self) -> &R {
        self.runner.runner()
    }

    pub async fn state(&self) -> OrchestratorState {
        *self.state.lock().await
    }

    async fn transition(&self, next: OrchestratorState) {
        let mut state = self.state.lock().await;
        debug!("Orchestrator state: {} -> {}", *state, next);
        *state = next;
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Resolve the entry for the context and run its applicable steps
    pub async fn execute(&self, context: &ExecutionContext) -> Result<PipelineResult, PipelineError> {
        let execution_id = Uuid::new_v4();

        self.transition(OrchestratorState::Resolving).await;
        info!(
            "Starting pipeline execution: {} ({})",
            self.pipeline.name, execution_id
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: self.pipeline.name.clone(),
        });

        let selection = match self.pipeline.matrix.select(context) {
            Ok(selection) => selection,
            Err(err) => {
                error!("Matrix resolution failed: {}", err);
                self.transition(OrchestratorState::Done(OverallStatus::Fail)).await;
                return Err(err.into());
            }
        };

        match selection {
            Selection::Excluded(entry) => {
                info!("Matrix entry {} is excluded; nothing to run", entry);
                self.emit_event(ExecutionEvent::EntryExcluded { entry: entry.clone() });

                let result = PipelineResult::excluded(execution_id, &self.pipeline.name, entry);
                self.finish(execution_id, result.overall_status).await;
                Ok(result)
            }
            Selection::Run(entry) => Ok(self.execute_entry(execution_id, entry).await),
        }
    }

    /// Run the applicable steps of an already selected entry
    pub async fn execute_entry(&self, execution_id: Uuid, entry: MatrixEntry) -> PipelineResult {
        let started_at = chrono::Utc::now();
        let steps = self.pipeline.steps_for(&entry);

        self.transition(OrchestratorState::Executing).await;
        info!("Resolved matrix entry {} with {} applicable steps", entry, steps.len());
        self.emit_event(ExecutionEvent::EntryResolved {
            entry: entry.clone(),
            step_count: steps.len(),
        });

        let mut results: Vec<ExecutionResult> = Vec::with_capacity(steps.len());
        let mut halted_by: Option<String> = None;

        for (index, step) in steps.iter().enumerate() {
            if let Some(reason) = self.skip_reason(step, &results, halted_by.as_deref()) {
                info!("Skipping step {}: {}", step.name, reason);
                self.emit_event(ExecutionEvent::StepSkipped {
                    step: step.name.clone(),
                    reason: reason.clone(),
                });
                results.push(ExecutionResult::skipped(step, reason));
                continue;
            }

            self.emit_event(ExecutionEvent::StepStarted {
                step: step.name.clone(),
                phase: step.phase,
                index,
                total: steps.len(),
            });

            let result = self.execute_step(&entry, step).await;

            if result.halts_pipeline() && halted_by.is_none() {
                halted_by = Some(step.name.clone());
            }

            self.emit_event(ExecutionEvent::StepFinished {
                result: result.clone(),
            });
            results.push(result);
        }

        self.transition(OrchestratorState::Aggregating).await;
        let overall_status = aggregate(&results);

        let result = PipelineResult {
            execution_id,
            pipeline_name: self.pipeline.name.clone(),
            entry,
            results,
            overall_status,
            started_at,
            finished_at: chrono::Utc::now(),
        };

        self.finish(execution_id, overall_status).await;
        result
    }

    /// Fail-fast skips ordinary steps; gated steps depend only on their phase
    fn skip_reason(&self, step: &Step, results: &[ExecutionResult], halted_by: Option<&str>) -> Option<SkipReason> {
        match step.requires_success_of {
            Some(phase) if !phase_passed(results, phase) => Some(SkipReason::RequiredPhaseNotPassed { phase }),
            Some(_) => None,
            None => halted_by.map(|after| SkipReason::FailFast {
                after: after.to_string(),
            }),
        }
    }

    async fn execute_step(&self, entry: &MatrixEntry, step: &Step) -> ExecutionResult {
        match self.composer.build_environment(entry, step) {
            Ok(composed) => {
                debug!("Composed command for {}: {:?}", step.name, composed.command);
                self.runner.run(step, &composed).await
            }
            Err(err) => {
                let now = chrono::Utc::now();
                if step.allow_failure {
                    warn!("Cannot compose environment for step {}: {}", step.name, err);
                } else {
                    error!("Cannot compose environment for step {}: {}", step.name, err);
                }
                ExecutionResult::errored(step, step.command.clone(), None, err.to_string()).with_timing(now, now)
            }
        }
    }

    async fn finish(&self, execution_id: Uuid, status: OverallStatus) {
        self.transition(OrchestratorState::Done(status)).await;
        info!(
            "Pipeline execution finished: {} - {}",
            self.pipeline.name, status
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        });
    }

    /// What `execute` would run for the context, without running anything
    pub fn plan(&self, context: &ExecutionContext) -> Result<ExecutionPlan, PipelineError> {
        let (entry, excluded) = match self.pipeline.matrix.select(context)? {
            Selection::Run(entry) => (entry, false),
            Selection::Excluded(entry) => (entry, true),
        };

        let steps = if excluded {
            Vec::new()
        } else {
            self.pipeline
                .steps_for(&entry)
                .into_iter()
                .map(|step| {
                    let (command, error) = match self.composer.build_environment(&entry, step) {
                        Ok(composed) => (composed.command, None),
                        Err(err) => (step.command.clone(), Some(err.to_string())),
                    };
                    PlannedStep {
                        step: step.name.clone(),
                        phase: step.phase,
                        command,
                        allow_failure: step.allow_failure,
                        requires_success_of: step.requires_success_of,
                        error,
                    }
                })
                .collect()
        };

        Ok(ExecutionPlan {
            entry,
            excluded,
            steps,
        })
    }
}
