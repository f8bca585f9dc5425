//! Pipeline domain model

use crate::core::{
    condition::applicable_steps,
    config::PipelineConfig,
    environment::EnvironmentSettings,
    matrix::{Matrix, MatrixEntry},
    step::{Phase, Step},
};
use std::path::PathBuf;

/// A loaded pipeline: the declared matrix plus steps in execution order
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Declared build matrix
    pub matrix: Matrix,

    /// Runtime name, install prefix, extra variables and working directory
    pub environment: EnvironmentSettings,

    /// Steps ordered by phase; declaration order within a phase
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(name: &str, matrix: Matrix, environment: EnvironmentSettings, steps: Vec<Step>) -> Self {
        let mut steps = steps;
        // stable: keeps declaration order within a phase
        steps.sort_by_key(|step| step.phase);

        Pipeline {
            name: name.to_string(),
            matrix,
            environment,
            steps,
        }
    }

    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let matrix = Matrix::new(config.entries(), config.matrix.exclude.clone());
        let steps = config.steps.iter().map(Step::from_config).collect();

        Self::new(&config.name, matrix, config.environment.clone(), steps)
    }

    /// Set the directory steps run in (the `workdir` template variable)
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.environment.working_dir = dir;
        self
    }

    /// All steps in execution order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Steps of one phase
    pub fn phase_steps(&self, phase: Phase) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Steps that apply to an entry, in execution order
    pub fn steps_for(&self, entry: &MatrixEntry) -> Vec<&Step> {
        applicable_steps(entry, &self.steps)
    }
}
