//! Error taxonomy for matrix resolution, environment composition and step execution

use crate::core::matrix::{LanguageMode, OperatingSystem};
use thiserror::Error;

/// The execution context does not select exactly one declared matrix entry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatrixResolutionError {
    #[error("no declared matrix entry matches {os} / {mode} (runtime version: {runtime_version})")]
    NotDeclared {
        os: OperatingSystem,
        mode: LanguageMode,
        runtime_version: String,
    },

    #[error("{count} declared matrix entries match {os} / {mode}; set CURRENT_DISTRIBUTION to disambiguate")]
    Ambiguous {
        os: OperatingSystem,
        mode: LanguageMode,
        count: usize,
    },
}

/// Failure to derive the variables or the command a step needs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("malformed runtime version '{version}' (expected e.g. 2.7 or 3.4.1), needed for '{variable}'")]
    MalformedRuntimeVersion { version: String, variable: String },

    #[error("variable '{variable}' is not defined for this matrix entry")]
    UndefinedVariable { variable: String },

    #[error("step '{step}' has an empty command")]
    EmptyCommand { step: String },
}

/// Failure to launch or wait on a step's subprocess
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait on '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command")]
    EmptyCommand,
}

/// Invalid execution context variables
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("{variable} is not set")]
    Missing { variable: &'static str },

    #[error("invalid value '{value}' for {variable}: {reason}")]
    Invalid {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors that stop a pipeline run before any step executes
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolution(#[from] MatrixResolutionError),

    #[error(transparent)]
    Context(#[from] ContextError),
}
