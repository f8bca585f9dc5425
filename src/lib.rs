//! ci-pipeline - matrix-aware CI orchestration
//!
//! Resolves the build-matrix entry for the current execution context, picks
//! the steps that apply to it and runs them in phase order, failing fast.

pub mod cli;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use core::{
    ExecutionContext, ExecutionResult, MatrixEntry, OverallStatus, Pipeline, PipelineError, PipelineResult, Step,
};
pub use execution::{CommandRunner, ExecutionEvent, PipelineOrchestrator, ProcessRunner};
