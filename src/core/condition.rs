//! Step conditions - pure predicates over a matrix entry

use crate::core::matrix::{LanguageMode, MatrixEntry, OperatingSystem};
use crate::core::step::Step;
use serde::de::{self, IntoDeserializer, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// When a step applies to a matrix entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Always,
    OperatingSystem(Vec<OperatingSystem>),
    /// Never true for entries without a runtime version
    RuntimeVersion(Vec<String>),
    LanguageMode(Vec<LanguageMode>),
    All(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn os(os: OperatingSystem) -> Self {
        Condition::OperatingSystem(vec![os])
    }

    pub fn runtime_version(version: &str) -> Self {
        Condition::RuntimeVersion(vec![version.to_string()])
    }

    /// Conjunction of this condition and another
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::Always, c) | (c, Condition::Always) => c,
            (Condition::All(mut parts), c) => {
                parts.push(c);
                Condition::All(parts)
            }
            (c, other) => Condition::All(vec![c, other]),
        }
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    pub fn evaluate(&self, entry: &MatrixEntry) -> bool {
        match self {
            Condition::Always => true,
            Condition::OperatingSystem(set) => set.contains(&entry.operating_system),
            Condition::RuntimeVersion(set) => entry
                .runtime_version
                .as_ref()
                .is_some_and(|version| set.contains(version)),
            Condition::LanguageMode(set) => set.contains(&entry.language_mode),
            Condition::All(parts) => parts.iter().all(|c| c.evaluate(entry)),
            Condition::Not(inner) => !inner.evaluate(entry),
        }
    }

    /// Build the domain condition from its YAML form
    pub fn from_config(config: &ConditionConfig) -> Self {
        let mut condition = Condition::Always;

        if let Some(os) = &config.os {
            condition = condition.and(Condition::OperatingSystem(os.to_vec()));
        }
        if let Some(versions) = &config.runtime_version {
            condition = condition.and(Condition::RuntimeVersion(versions.to_vec()));
        }
        if let Some(modes) = &config.mode {
            condition = condition.and(Condition::LanguageMode(modes.to_vec()));
        }
        if let Some(not) = &config.not {
            condition = condition.and(Condition::from_config(not).negate());
        }

        condition
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("always"),
            Condition::OperatingSystem(set) => write!(f, "os in [{}]", join(set)),
            Condition::RuntimeVersion(set) => write!(f, "runtime_version in [{}]", join(set)),
            Condition::LanguageMode(set) => write!(f, "mode in [{}]", join(set)),
            Condition::All(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                f.write_str(&rendered.join(" and "))
            }
            Condition::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

/// A single value or a list of values in YAML
///
/// Numeric scalars are read as text, so `runtime_version: 2.7` works
/// unquoted. A bare float loses trailing zeros (`3.10` reads as `3.1`);
/// quote it or put it in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

struct OneOrManyVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for OneOrManyVisitor<T> {
    type Value = OneOrMany<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a value or a list of values")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        T::deserialize(value.into_deserializer()).map(OneOrMany::One)
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
        self.visit_str(&value.to_string())
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        self.visit_str(&value.to_string())
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        self.visit_str(&value.to_string())
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        self.visit_str(&value.to_string())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
        Vec::<T>::deserialize(de::value::SeqAccessDeserializer::new(seq)).map(OneOrMany::Many)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OneOrMany<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OneOrManyVisitor(PhantomData))
    }
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

/// Condition as written under a step's `when:` key; all fields must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OneOrMany<OperatingSystem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<OneOrMany<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<OneOrMany<LanguageMode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<ConditionConfig>>,
}

/// Steps whose condition holds for the entry, in declaration order
pub fn applicable_steps<'a>(entry: &MatrixEntry, steps: &'a [Step]) -> Vec<&'a Step> {
    steps.iter().filter(|step| step.condition.evaluate(entry)).collect()
}
