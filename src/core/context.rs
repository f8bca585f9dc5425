//! Execution context - which matrix leg this invocation runs

use crate::core::error::ContextError;
use crate::core::matrix::{LanguageMode, OperatingSystem};
use serde::{Deserialize, Serialize};

pub const CURRENT_OS: &str = "CURRENT_OS";
pub const CURRENT_RUNTIME_VERSION: &str = "CURRENT_RUNTIME_VERSION";
pub const CURRENT_LANGUAGE_MODE: &str = "CURRENT_LANGUAGE_MODE";
pub const CURRENT_DISTRIBUTION: &str = "CURRENT_DISTRIBUTION";

/// The externally determined (os, runtime version, mode) of this invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub operating_system: OperatingSystem,

    /// Only meaningful on linux; always `None` on macos
    pub runtime_version: Option<String>,

    pub language_mode: LanguageMode,

    pub distribution: Option<String>,
}

/// Values given explicitly (e.g. on the command line) that win over the environment
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub operating_system: Option<OperatingSystem>,
    pub runtime_version: Option<String>,
    pub language_mode: Option<LanguageMode>,
    pub distribution: Option<String>,
}

impl ExecutionContext {
    pub fn new(operating_system: OperatingSystem) -> Self {
        Self {
            operating_system,
            runtime_version: None,
            language_mode: operating_system.default_mode(),
            distribution: None,
        }
    }

    pub fn with_runtime_version(mut self, version: &str) -> Self {
        if self.operating_system == OperatingSystem::Linux {
            self.runtime_version = Some(version.to_string());
        }
        self
    }

    pub fn with_language_mode(mut self, mode: LanguageMode) -> Self {
        self.language_mode = mode;
        self
    }

    pub fn with_distribution(mut self, distribution: &str) -> Self {
        self.distribution = Some(distribution.to_string());
        self
    }

    /// Read the context from the process environment
    pub fn from_env(overrides: &ContextOverrides) -> Result<Self, ContextError> {
        Self::from_lookup(overrides, |key| std::env::var(key).ok())
    }

    /// Read the context through an arbitrary variable lookup
    pub fn from_lookup<F>(overrides: &ContextOverrides, lookup: F) -> Result<Self, ContextError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let operating_system = match overrides.operating_system {
            Some(os) => os,
            None => {
                let value = read(CURRENT_OS).ok_or(ContextError::Missing { variable: CURRENT_OS })?;
                value.parse().map_err(|reason| ContextError::Invalid {
                    variable: CURRENT_OS,
                    value,
                    reason,
                })?
            }
        };

        let language_mode = match overrides.language_mode {
            Some(mode) => mode,
            None => match read(CURRENT_LANGUAGE_MODE) {
                Some(value) => value.parse().map_err(|reason| ContextError::Invalid {
                    variable: CURRENT_LANGUAGE_MODE,
                    value,
                    reason,
                })?,
                None => operating_system.default_mode(),
            },
        };

        let runtime_version = match operating_system {
            OperatingSystem::Linux => overrides
                .runtime_version
                .clone()
                .or_else(|| read(CURRENT_RUNTIME_VERSION)),
            OperatingSystem::Macos => None,
        };

        if operating_system == OperatingSystem::Linux
            && language_mode == LanguageMode::Versioned
            && runtime_version.is_none()
        {
            return Err(ContextError::Missing {
                variable: CURRENT_RUNTIME_VERSION,
            });
        }

        let distribution = overrides
            .distribution
            .clone()
            .or_else(|| read(CURRENT_DISTRIBUTION));

        Ok(Self {
            operating_system,
            runtime_version,
            language_mode,
            distribution,
        })
    }
}
