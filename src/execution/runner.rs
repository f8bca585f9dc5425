//! Step runner - launches a step's command and records its exit code

use crate::core::{environment::ComposedStep, error::RunnerError, result::ExecutionResult, step::Step};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Exit code recorded when a command cannot be launched
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// Exit code recorded when a child is terminated by a signal
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and return its exit code
    async fn run(
        &self,
        command: &[String],
        env: &HashMap<String, String>,
        working_dir: &Path,
    ) -> Result<i32, RunnerError>;
}

/// Runs commands as child processes sharing this process's stdio
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    stdout_to_stderr: bool,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send child stdout to our stderr, keeping stdout for machine-readable output
    pub fn with_stdout_to_stderr(mut self) -> Self {
        self.stdout_to_stderr = true;
        self
    }

    fn child_stdout(&self) -> Stdio {
        if self.stdout_to_stderr {
            Stdio::from(std::io::stderr())
        } else {
            Stdio::inherit()
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &[String],
        env: &HashMap<String, String>,
        working_dir: &Path,
    ) -> Result<i32, RunnerError> {
        let (program, args) = command.split_first().ok_or(RunnerError::EmptyCommand)?;

        // The composed environment already contains everything inherited
        let mut child = Command::new(program)
            .args(args)
            .env_clear()
            .envs(env)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(self.child_stdout())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let status = child.wait().await.map_err(|source| RunnerError::Wait {
            program: program.clone(),
            source,
        })?;

        Ok(status.code().unwrap_or(SIGNAL_EXIT_CODE))
    }
}

/// Runs one composed step through a command runner
pub struct StepRunner<R> {
    runner: R,
}

impl<R: CommandRunner> StepRunner<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute a step with its composed environment
    pub async fn run(&self, step: &Step, composed: &ComposedStep) -> ExecutionResult {
        info!("Running step {} ({}): {}", step.name, step.phase, composed.command.join(" "));
        debug!(
            "Step {} environment has {} variables, working dir {}",
            step.name,
            composed.env.len(),
            composed.working_dir.display()
        );

        let started_at = chrono::Utc::now();
        let outcome = self
            .runner
            .run(&composed.command, &composed.env, &composed.working_dir)
            .await;
        let finished_at = chrono::Utc::now();

        let result = match outcome {
            Ok(exit_code) => ExecutionResult::completed(step, composed.command.clone(), exit_code),
            Err(err @ RunnerError::Spawn { .. }) => ExecutionResult::errored(
                step,
                composed.command.clone(),
                Some(SPAWN_FAILURE_CODE),
                err.to_string(),
            ),
            Err(err) => ExecutionResult::errored(step, composed.command.clone(), None, err.to_string()),
        };

        if result.halts_pipeline() {
            error!("Step {} failed (exit code {:?})", step.name, result.exit_code());
        } else if result.is_failure() {
            warn!(
                "Step {} failed (exit code {:?}); failure allowed, continuing",
                step.name,
                result.exit_code()
            );
        } else {
            info!("Step {} succeeded", step.name);
        }

        result.with_timing(started_at, finished_at)
    }
}
