//! Step domain model

use crate::core::{condition::Condition, config::StepConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline phases, in their fixed execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Install,
    Test,
    Build,
    PackageSdist,
    PackageBdist,
    InstallPackage,
    EndToEnd,
    Report,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Install,
        Phase::Test,
        Phase::Build,
        Phase::PackageSdist,
        Phase::PackageBdist,
        Phase::InstallPackage,
        Phase::EndToEnd,
        Phase::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Install => "install",
            Phase::Test => "test",
            Phase::Build => "build",
            Phase::PackageSdist => "package-sdist",
            Phase::PackageBdist => "package-bdist",
            Phase::InstallPackage => "install-package",
            Phase::EndToEnd => "end-to-end",
            Phase::Report => "report",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single command in the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Unique step name
    pub name: String,

    pub phase: Phase,

    /// Command tokens; each may contain `{{ variable }}` placeholders
    pub command: Vec<String>,

    /// Which matrix entries the step applies to
    pub condition: Condition,

    /// A failure is recorded but neither stops nor fails the pipeline
    pub allow_failure: bool,

    /// Runtime gate: run only once this earlier phase has passed.
    /// Gated steps still run after a fail-fast stop in a later phase.
    pub requires_success_of: Option<Phase>,

    /// Extra environment variables (templates)
    pub env: BTreeMap<String, String>,
}

impl Step {
    pub fn new(name: &str, phase: Phase, command: &[&str]) -> Self {
        Step {
            name: name.to_string(),
            phase,
            command: command.iter().map(|t| t.to_string()).collect(),
            condition: Condition::Always,
            allow_failure: false,
            requires_success_of: None,
            env: BTreeMap::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn allowing_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn requiring_success_of(mut self, phase: Phase) -> Self {
        self.requires_success_of = Some(phase);
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Create a step from a step config
    pub fn from_config(config: &StepConfig) -> Self {
        let condition = config
            .when
            .as_ref()
            .map(Condition::from_config)
            .unwrap_or(Condition::Always);

        Step {
            name: config.name.clone(),
            phase: config.phase,
            command: config.command.clone(),
            condition,
            allow_failure: config.allow_failure,
            requires_success_of: config.requires_success_of,
            env: config.env.clone(),
        }
    }

    /// Steps with a runtime gate are exempt from fail-fast skipping
    pub fn is_deferred(&self) -> bool {
        self.requires_success_of.is_some()
    }

    /// Command line for display
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
