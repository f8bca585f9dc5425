//! Pipeline configuration from YAML

use crate::core::condition::ConditionConfig;
use crate::core::environment::EnvironmentSettings;
use crate::core::matrix::{ExclusionRule, LanguageMode, MatrixEntry, OperatingSystem};
use crate::core::step::Phase;
use crate::core::Pipeline;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Configuration the binary falls back to when no file is given
const BUILTIN_PIPELINE: &str = include_str!("../../pipeline.yaml");

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Declared build matrix
    #[serde(default)]
    pub matrix: MatrixConfig,

    /// Runtime name, install prefix and pipeline-wide variables
    #[serde(default)]
    pub environment: EnvironmentSettings,

    /// Pipeline steps
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// The `matrix:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub include: Vec<MatrixEntryConfig>,

    #[serde(default)]
    pub exclude: Vec<ExclusionRule>,
}

/// One include entry as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixEntryConfig {
    pub os: OperatingSystem,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    /// Defaults to the operating system's mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LanguageMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
}

impl MatrixEntryConfig {
    pub fn to_entry(&self) -> MatrixEntry {
        let mode = self.mode.unwrap_or_else(|| self.os.default_mode());
        MatrixEntry {
            operating_system: self.os,
            runtime_version: self.runtime_version.clone(),
            language_mode: mode,
            distribution: self.distribution.clone(),
        }
    }
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step name
    pub name: String,

    pub phase: Phase,

    /// Command tokens, not passed through a shell
    pub command: Vec<String>,

    /// Applicability condition; absent means every entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<ConditionConfig>,

    #[serde(default)]
    pub allow_failure: bool,

    /// Only run once this earlier phase has passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_success_of: Option<Phase>,

    /// Extra environment variables for this step
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The built-in pipeline
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_PIPELINE)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        let entries = self.entries();
        let mut seen_entries = HashSet::new();
        for entry in &entries {
            if entry.language_mode == LanguageMode::Versioned && entry.runtime_version.is_none() {
                anyhow::bail!(
                    "Matrix entry for {} is versioned but has no runtime_version",
                    entry.operating_system
                );
            }
            if !seen_entries.insert(entry.identity()) {
                anyhow::bail!("Duplicate matrix entry: {}", entry);
            }
        }

        for (index, rule) in self.matrix.exclude.iter().enumerate() {
            if !rule.is_constrained() {
                anyhow::bail!("Exclusion rule #{} does not constrain any field", index + 1);
            }
        }

        let mut seen_names = HashSet::new();
        for step in &self.steps {
            if !seen_names.insert(&step.name) {
                anyhow::bail!("Duplicate step name: {}", step.name);
            }

            if step.command.is_empty() {
                anyhow::bail!("Step '{}' has an empty command", step.name);
            }

            if let Some(required) = step.requires_success_of {
                if required >= step.phase {
                    anyhow::bail!(
                        "Step '{}' in phase {} requires success of phase {}, which does not run before it",
                        step.name,
                        step.phase,
                        required
                    );
                }
            }
        }

        Ok(())
    }

    /// Declared include entries, with defaults applied
    pub fn entries(&self) -> Vec<MatrixEntry> {
        self.matrix.include.iter().map(MatrixEntryConfig::to_entry).collect()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
