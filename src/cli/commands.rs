//! CLI command definitions

use crate::core::{
    context::ContextOverrides,
    matrix::{LanguageMode, OperatingSystem},
};
use clap::Args;
use std::path::PathBuf;

/// Execution context flags; each wins over its CURRENT_* variable
#[derive(Debug, Args, Clone, Default)]
pub struct ContextArgs {
    /// Operating system of this leg (overrides CURRENT_OS)
    #[arg(long)]
    pub os: Option<OperatingSystem>,

    /// Runtime version of this leg (overrides CURRENT_RUNTIME_VERSION)
    #[arg(long)]
    pub runtime_version: Option<String>,

    /// Language mode of this leg (overrides CURRENT_LANGUAGE_MODE)
    #[arg(long)]
    pub mode: Option<LanguageMode>,

    /// Distribution of this leg (overrides CURRENT_DISTRIBUTION)
    #[arg(long)]
    pub distribution: Option<String>,
}

impl ContextArgs {
    pub fn overrides(&self) -> ContextOverrides {
        ContextOverrides {
            operating_system: self.os,
            runtime_version: self.runtime_version.clone(),
            language_mode: self.mode,
            distribution: self.distribution.clone(),
        }
    }
}

/// Run the pipeline for the current matrix entry
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub context: ContextArgs,

    /// Print the pipeline result as JSON instead of console output
    #[arg(long)]
    pub json: bool,

    /// Write the pipeline result as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Show the steps the current matrix entry would run
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    #[command(flatten)]
    pub context: ContextArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List the resolved matrix entries
#[derive(Debug, Args, Clone)]
pub struct MatrixCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
