//! Build matrix model
//!
//! The matrix is an explicit include list of (os, runtime version, mode)
//! combinations plus a list of exclusion rules. Resolution is a pure filter;
//! selecting the leg for the current execution context happens on top of it.

use crate::core::context::ExecutionContext;
use crate::core::error::MatrixResolutionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating system a matrix leg runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    #[serde(alias = "osx")]
    Macos,
}

impl OperatingSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Macos => "macos",
        }
    }

    /// Language mode used when an entry or context does not name one
    pub fn default_mode(&self) -> LanguageMode {
        match self {
            OperatingSystem::Linux => LanguageMode::Versioned,
            OperatingSystem::Macos => LanguageMode::Generic,
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(OperatingSystem::Linux),
            "macos" | "osx" => Ok(OperatingSystem::Macos),
            other => Err(format!("unknown operating system '{}' (expected linux or macos)", other)),
        }
    }
}

/// Whether the leg pins a specific runtime version or uses the host's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageMode {
    Versioned,
    Generic,
}

impl LanguageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageMode::Versioned => "versioned",
            LanguageMode::Generic => "generic",
        }
    }
}

impl fmt::Display for LanguageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "versioned" => Ok(LanguageMode::Versioned),
            "generic" => Ok(LanguageMode::Generic),
            other => Err(format!("unknown language mode '{}' (expected versioned or generic)", other)),
        }
    }
}

/// One concrete leg of the build matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub operating_system: OperatingSystem,
    pub runtime_version: Option<String>,
    pub language_mode: LanguageMode,
    pub distribution: Option<String>,
}

impl MatrixEntry {
    pub fn new(operating_system: OperatingSystem, language_mode: LanguageMode) -> Self {
        Self {
            operating_system,
            runtime_version: None,
            language_mode,
            distribution: None,
        }
    }

    pub fn versioned(operating_system: OperatingSystem, runtime_version: &str) -> Self {
        Self::new(operating_system, LanguageMode::Versioned).with_runtime_version(runtime_version)
    }

    pub fn generic(operating_system: OperatingSystem) -> Self {
        Self::new(operating_system, LanguageMode::Generic)
    }

    pub fn with_runtime_version(mut self, version: &str) -> Self {
        self.runtime_version = Some(version.to_string());
        self
    }

    pub fn with_distribution(mut self, distribution: &str) -> Self {
        self.distribution = Some(distribution.to_string());
        self
    }

    /// Identity is (os, runtime version, distribution)
    pub fn identity(&self) -> (OperatingSystem, Option<&str>, Option<&str>) {
        (
            self.operating_system,
            self.runtime_version.as_deref(),
            self.distribution.as_deref(),
        )
    }

    /// Whether this entry is the leg described by the execution context
    pub fn matches_context(&self, context: &ExecutionContext) -> bool {
        if self.operating_system != context.operating_system
            || self.language_mode != context.language_mode
        {
            return false;
        }
        if let Some(version) = &context.runtime_version {
            if self.runtime_version.as_ref() != Some(version) {
                return false;
            }
        }
        if let Some(distribution) = &context.distribution {
            if self.distribution.as_ref() != Some(distribution) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for MatrixEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operating_system)?;
        if let Some(version) = &self.runtime_version {
            write!(f, " {}", version)?;
        }
        write!(f, " ({})", self.language_mode)?;
        if let Some(distribution) = &self.distribution {
            write!(f, " [{}]", distribution)?;
        }
        Ok(())
    }
}

/// Predicate over a partial matrix entry; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    #[serde(default, rename = "os", skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<OperatingSystem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    #[serde(default, rename = "mode", skip_serializing_if = "Option::is_none")]
    pub language_mode: Option<LanguageMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
}

impl ExclusionRule {
    /// Whether the rule constrains at least one field
    pub fn is_constrained(&self) -> bool {
        self.operating_system.is_some()
            || self.runtime_version.is_some()
            || self.language_mode.is_some()
            || self.distribution.is_some()
    }

    pub fn matches(&self, entry: &MatrixEntry) -> bool {
        self.operating_system.map_or(true, |os| os == entry.operating_system)
            && self
                .runtime_version
                .as_ref()
                .map_or(true, |v| entry.runtime_version.as_ref() == Some(v))
            && self.language_mode.map_or(true, |m| m == entry.language_mode)
            && self
                .distribution
                .as_ref()
                .map_or(true, |d| entry.distribution.as_ref() == Some(d))
    }
}

/// Drop every declared combination that satisfies any exclusion rule
pub fn resolve_entries(declared: &[MatrixEntry], exclusions: &[ExclusionRule]) -> Vec<MatrixEntry> {
    declared
        .iter()
        .filter(|entry| !exclusions.iter().any(|rule| rule.matches(entry)))
        .cloned()
        .collect()
}

/// Outcome of selecting the leg for an execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The context selects a leg that survives the exclusion rules
    Run(MatrixEntry),
    /// The context selects a declared leg that an exclusion rule removes
    Excluded(MatrixEntry),
}

/// The declared matrix: include list plus exclusion rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matrix {
    pub include: Vec<MatrixEntry>,
    pub exclude: Vec<ExclusionRule>,
}

impl Matrix {
    pub fn new(include: Vec<MatrixEntry>, exclude: Vec<ExclusionRule>) -> Self {
        Self { include, exclude }
    }

    /// Effective entries, in declaration order
    pub fn entries(&self) -> Vec<MatrixEntry> {
        resolve_entries(&self.include, &self.exclude)
    }

    pub fn is_excluded(&self, entry: &MatrixEntry) -> bool {
        self.exclude.iter().any(|rule| rule.matches(entry))
    }

    /// Select the single declared leg the execution context refers to
    pub fn select(&self, context: &ExecutionContext) -> Result<Selection, MatrixResolutionError> {
        let candidates: Vec<&MatrixEntry> = self
            .include
            .iter()
            .filter(|entry| entry.matches_context(context))
            .collect();

        match candidates.as_slice() {
            [] => Err(MatrixResolutionError::NotDeclared {
                os: context.operating_system,
                mode: context.language_mode,
                runtime_version: context
                    .runtime_version
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            }),
            [entry] => {
                let entry = (*entry).clone();
                if self.is_excluded(&entry) {
                    Ok(Selection::Excluded(entry))
                } else {
                    Ok(Selection::Run(entry))
                }
            }
            many => Err(MatrixResolutionError::Ambiguous {
                os: context.operating_system,
                mode: context.language_mode,
                count: many.len(),
            }),
        }
    }
}
