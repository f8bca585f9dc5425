//! Environment composer - per-step process environment and command rendering
//!
//! Variables are derived from the matrix entry (install prefix, a
//! version-qualified site-packages path, ...) and exposed two ways: as
//! `{{ name }}` placeholders in command tokens and env templates, and as
//! `CI_*` exports. Composed values win over the inherited environment.

use crate::core::error::EnvironmentError;
use crate::core::matrix::MatrixEntry;
use crate::core::step::Step;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;

/// Template variable names understood by the composer
pub const TEMPLATE_VARIABLES: [&str; 9] = [
    "workdir",
    "os",
    "mode",
    "runtime",
    "install_prefix",
    "runtime_version",
    "distribution",
    "runtime_series",
    "site_packages",
];

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
    })
}

fn version_regex() -> &'static Regex {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    VERSION.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)(?:\.\d+)*$").expect("valid version regex"))
}

/// Major.minor series of a runtime version ("2.7.18" -> "2.7")
pub fn runtime_series(version: &str) -> Option<String> {
    version_regex()
        .captures(version.trim())
        .map(|caps| format!("{}.{}", &caps[1], &caps[2]))
}

/// Environment section of the pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    /// Runtime name used in derived paths (e.g. `python` -> `lib/python2.7`)
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Template for the isolated install prefix
    #[serde(default = "default_install_prefix")]
    pub install_prefix: String,

    /// Pipeline-wide variables (templates)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Directory steps run in; defaults to the current directory
    #[serde(skip)]
    pub working_dir: PathBuf,
}

fn default_runtime() -> String {
    "python".to_string()
}

fn default_install_prefix() -> String {
    "{{ workdir }}/tmp".to_string()
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            install_prefix: default_install_prefix(),
            variables: BTreeMap::new(),
            working_dir: PathBuf::from("."),
        }
    }
}

/// A derived template variable
#[derive(Debug, Clone, PartialEq, Eq)]
enum Derived {
    Value(String),
    /// Referencing it fails the step that needs it
    Invalid(EnvironmentError),
}

/// What to do with a placeholder the entry cannot provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Absent {
    Fail,
    Omit,
}

/// The variables available to one matrix entry
#[derive(Debug, Clone, Default)]
pub struct TemplateVariables {
    values: BTreeMap<&'static str, Derived>,
}

impl TemplateVariables {
    /// Value of a variable, if the entry provides a valid one
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Derived::Value(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Render a template, failing on absent variables
    pub fn render(&self, template: &str) -> Result<String, EnvironmentError> {
        self.render_with(template, Absent::Fail)
            .map(|rendered| rendered.unwrap_or_default())
    }

    /// `Ok(None)` means the template needs a variable this entry does not have
    fn render_with(&self, template: &str, absent: Absent) -> Result<Option<String>, EnvironmentError> {
        let mut rendered = String::with_capacity(template.len());
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(template) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let name = &caps[1];

            rendered.push_str(&template[last..whole.start]);
            last = whole.end;

            match self.values.get(name) {
                Some(Derived::Value(value)) => rendered.push_str(value),
                Some(Derived::Invalid(err)) => return Err(err.clone()),
                None if TEMPLATE_VARIABLES.contains(&name) && absent == Absent::Omit => {
                    return Ok(None);
                }
                None => {
                    return Err(EnvironmentError::UndefinedVariable {
                        variable: name.to_string(),
                    })
                }
            }
        }

        rendered.push_str(&template[last..]);
        Ok(Some(rendered))
    }
}

fn malformed(version: &str, variable: &str) -> Derived {
    Derived::Invalid(EnvironmentError::MalformedRuntimeVersion {
        version: version.to_string(),
        variable: variable.to_string(),
    })
}

/// A step's command and environment, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedStep {
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
}

/// Builds the process environment for each step of a matrix entry
#[derive(Debug, Clone)]
pub struct EnvironmentComposer {
    settings: EnvironmentSettings,
    inherited: HashMap<String, String>,
}

impl EnvironmentComposer {
    pub fn new<I>(settings: EnvironmentSettings, inherited: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            settings,
            inherited: inherited.into_iter().collect(),
        }
    }

    /// Composer that inherits the current process environment
    pub fn from_process(settings: EnvironmentSettings) -> Self {
        Self::new(settings, std::env::vars())
    }

    /// Derive the template variables for an entry
    pub fn template_variables(&self, entry: &MatrixEntry) -> TemplateVariables {
        let mut values = BTreeMap::new();

        values.insert(
            "workdir",
            Derived::Value(self.settings.working_dir.display().to_string()),
        );
        values.insert("os", Derived::Value(entry.operating_system.to_string()));
        values.insert("mode", Derived::Value(entry.language_mode.to_string()));
        values.insert("runtime", Derived::Value(self.settings.runtime.clone()));

        if let Some(version) = &entry.runtime_version {
            values.insert("runtime_version", Derived::Value(version.clone()));
        }
        if let Some(distribution) = &entry.distribution {
            values.insert("distribution", Derived::Value(distribution.clone()));
        }

        let series = entry.runtime_version.as_ref().map(|version| {
            runtime_series(version).ok_or_else(|| version.clone())
        });
        match &series {
            Some(Ok(series)) => {
                values.insert("runtime_series", Derived::Value(series.clone()));
            }
            Some(Err(version)) => {
                values.insert("runtime_series", malformed(version, "runtime_series"));
            }
            None => {}
        }

        // the prefix template may use any variable above
        let prefix = match (TemplateVariables { values: values.clone() })
            .render(&self.settings.install_prefix)
        {
            Ok(prefix) => Derived::Value(prefix),
            Err(err) => Derived::Invalid(err),
        };
        values.insert("install_prefix", prefix.clone());

        match (&series, prefix) {
            (Some(Ok(series)), Derived::Value(prefix)) => {
                values.insert(
                    "site_packages",
                    Derived::Value(format!(
                        "{}/lib/{}{}/site-packages",
                        prefix.trim_end_matches('/'),
                        self.settings.runtime,
                        series
                    )),
                );
            }
            (Some(Ok(_)), invalid) => {
                values.insert("site_packages", invalid);
            }
            (Some(Err(version)), _) => {
                values.insert("site_packages", malformed(version, "site_packages"));
            }
            (None, _) => {}
        }

        TemplateVariables { values }
    }

    /// Compose the command and full process environment for a step
    pub fn build_environment(
        &self,
        entry: &MatrixEntry,
        step: &Step,
    ) -> Result<ComposedStep, EnvironmentError> {
        if step.command.is_empty() {
            return Err(EnvironmentError::EmptyCommand {
                step: step.name.clone(),
            });
        }

        let vars = self.template_variables(entry);

        let command = step
            .command
            .iter()
            .map(|token| vars.render(token))
            .collect::<Result<Vec<_>, _>>()?;

        let mut env = self.inherited.clone();

        let exports = [
            ("CI_OS", "os"),
            ("CI_LANGUAGE_MODE", "mode"),
            ("CI_RUNTIME_VERSION", "runtime_version"),
            ("CI_DISTRIBUTION", "distribution"),
            ("CI_INSTALL_PREFIX", "install_prefix"),
            ("CI_SITE_PACKAGES", "site_packages"),
        ];
        for (key, variable) in exports {
            if let Some(value) = vars.get(variable) {
                env.insert(key.to_string(), value.to_string());
            }
        }

        for (key, template) in self.settings.variables.iter().chain(step.env.iter()) {
            match vars.render_with(template, Absent::Omit)? {
                Some(value) => {
                    env.insert(key.clone(), value);
                }
                None => {
                    debug!("Omitting {} for step {}: variable not available for {}", key, step.name, entry);
                }
            }
        }

        Ok(ComposedStep {
            command,
            env,
            working_dir: self.settings.working_dir.clone(),
        })
    }
}
