//! Test utility functions for ci-pipeline
#![allow(dead_code)]

use ci_pipeline::core::{
    config::PipelineConfig,
    environment::{EnvironmentComposer, EnvironmentSettings},
    result::{OverallStatus, PipelineResult, SkipReason, StepOutcome},
    ExecutionContext, OperatingSystem, Pipeline, PipelineError, RunnerError,
};
use ci_pipeline::execution::{CommandRunner, ExecutionEvent, PipelineOrchestrator};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One command the scripted runner was asked to run
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Mock runner that returns scripted exit codes and records every call
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    /// (substring of the command line, exit code); first match wins
    exit_codes: Vec<(String, i32)>,
    /// Substrings of command lines that cannot be spawned
    missing: Vec<String>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose line contains `pattern` exit with `code`
    pub fn exit_with(mut self, pattern: &str, code: i32) -> Self {
        self.exit_codes.push((pattern.to_string(), code));
        self
    }

    /// Commands whose line contains `pattern` fail to spawn
    pub fn not_found(mut self, pattern: &str) -> Self {
        self.missing.push(pattern.to_string());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &[String],
        env: &HashMap<String, String>,
        working_dir: &Path,
    ) -> Result<i32, RunnerError> {
        let line = command.join(" ");
        self.invocations.lock().unwrap().push(Invocation {
            command: command.to_vec(),
            env: env.clone(),
            working_dir: working_dir.to_path_buf(),
        });

        if self.missing.iter().any(|pattern| line.contains(pattern.as_str())) {
            return Err(RunnerError::Spawn {
                program: command.first().cloned().unwrap_or_default(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }

        Ok(self
            .exit_codes
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0))
    }
}

/// Test result from running a pipeline
#[derive(Debug, Clone)]
pub struct PipelineTestResult {
    pub result: PipelineResult,
    pub invocations: Vec<Invocation>,
    pub events: Vec<String>,
}

impl PipelineTestResult {
    /// Names of the steps that were actually run, in order
    pub fn executed_steps(&self) -> Vec<String> {
        self.result
            .results
            .iter()
            .filter(|r| !r.is_skipped())
            .map(|r| r.step.clone())
            .collect()
    }

    /// Outcome of a specific step
    pub fn outcome(&self, step: &str) -> &StepOutcome {
        &self
            .result
            .result(step)
            .unwrap_or_else(|| panic!("Step '{}' not found in result: {}", step, self.summary()))
            .outcome
    }

    /// The recorded invocation of a command line containing `pattern`
    pub fn invocation(&self, pattern: &str) -> &Invocation {
        self.invocations
            .iter()
            .find(|i| i.command_line().contains(pattern))
            .unwrap_or_else(|| panic!("No invocation matching '{}' in {:?}", pattern, self.invocations))
    }

    /// Get a summary of the result
    pub fn summary(&self) -> String {
        let steps: Vec<String> = self
            .result
            .results
            .iter()
            .map(|r| format!("{}={:?}", r.step, r.outcome))
            .collect();
        format!("{} [{}]", self.result.overall_status, steps.join(", "))
    }
}

/// Settings for a checkout at a fixed path, so derived paths are predictable
pub fn test_settings(settings: &EnvironmentSettings) -> EnvironmentSettings {
    EnvironmentSettings {
        working_dir: PathBuf::from("/build/plaso"),
        ..settings.clone()
    }
}

/// Run a pipeline for a context with a scripted runner and a fixed inherited environment
pub async fn run_pipeline_with_runner(
    pipeline: Pipeline,
    context: &ExecutionContext,
    runner: ScriptedRunner,
) -> Result<PipelineTestResult, PipelineError> {
    let inherited = vec![
        ("PATH".to_string(), "/usr/bin:/bin".to_string()),
        ("PYTHONPATH".to_string(), "/inherited".to_string()),
    ];
    let composer = EnvironmentComposer::new(test_settings(&pipeline.environment), inherited);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let orchestrator = PipelineOrchestrator::with_composer(pipeline, composer, runner.clone()).with_event_handler(
        move |event| {
            let label = match &event {
                ExecutionEvent::StepStarted { step, .. } => format!("start:{}", step),
                ExecutionEvent::StepSkipped { step, .. } => format!("skip:{}", step),
                ExecutionEvent::EntryExcluded { .. } => "excluded".to_string(),
                ExecutionEvent::PipelineCompleted { status, .. } => format!("done:{}", status),
                _ => return,
            };
            sink.lock().unwrap().push(label);
        },
    );

    let result = orchestrator.execute(context).await?;
    let events = events.lock().unwrap().clone();

    Ok(PipelineTestResult {
        result,
        invocations: runner.invocations(),
        events,
    })
}

/// Run the built-in pipeline for a context
pub async fn run_builtin(context: &ExecutionContext, runner: ScriptedRunner) -> PipelineTestResult {
    run_pipeline_with_runner(builtin_pipeline(), context, runner)
        .await
        .unwrap_or_else(|e| panic!("Pipeline could not start: {}", e))
}

/// Parse a pipeline from YAML string
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    let config = PipelineConfig::from_yaml(yaml).unwrap_or_else(|e| panic!("Failed to parse pipeline YAML: {}", e));
    config.to_pipeline()
}

pub fn builtin_pipeline() -> Pipeline {
    PipelineConfig::builtin()
        .unwrap_or_else(|e| panic!("Built-in pipeline is invalid: {}", e))
        .to_pipeline()
}

pub fn linux(version: &str) -> ExecutionContext {
    ExecutionContext::new(OperatingSystem::Linux).with_runtime_version(version)
}

pub fn macos() -> ExecutionContext {
    ExecutionContext::new(OperatingSystem::Macos)
}

/// Assert pipeline passed
pub fn assert_pipeline_passed(result: &PipelineTestResult) {
    assert_eq!(
        result.result.overall_status,
        OverallStatus::Pass,
        "Pipeline should have passed, but was: {}",
        result.summary()
    );
    assert_eq!(result.result.exit_code(), 0);
}

/// Assert pipeline failed with a specific exit code
pub fn assert_pipeline_failed(result: &PipelineTestResult, exit_code: i32) {
    assert_eq!(
        result.result.overall_status,
        OverallStatus::Fail,
        "Pipeline should have failed, but was: {}",
        result.summary()
    );
    assert_eq!(result.result.exit_code(), exit_code, "{}", result.summary());
}

/// Assert specific steps were executed in order
pub fn assert_executed_steps(result: &PipelineTestResult, expected_order: &[&str]) {
    assert_eq!(
        result.executed_steps(),
        expected_order,
        "Expected execution order: {:?}\nActual: {}",
        expected_order,
        result.summary()
    );
}

/// Assert a step was skipped by fail-fast after `after`
pub fn assert_skipped_after(result: &PipelineTestResult, step: &str, after: &str) {
    assert_eq!(
        result.outcome(step),
        &StepOutcome::Skipped {
            reason: SkipReason::FailFast {
                after: after.to_string()
            }
        },
        "{}",
        result.summary()
    );
}
