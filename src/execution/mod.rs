//! Pipeline execution: the step runner and the orchestrator driving it

pub mod engine;
pub mod runner;

pub use engine::{EventHandler, ExecutionEvent, ExecutionPlan, OrchestratorState, PipelineOrchestrator, PlannedStep};
pub use runner::{CommandRunner, ProcessRunner, StepRunner, SIGNAL_EXIT_CODE, SPAWN_FAILURE_CODE};
