//! Scenario documents: metadata, parameters, dependency edges, and the
//! action chain. Unknown document fields are preserved and round-tripped.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::Action;
use crate::template;

pub const SCENARIO_VERSION: &str = "1";

fn default_version() -> String {
    SCENARIO_VERSION.to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    #[default]
    String,
    Number,
    Boolean,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ParameterSpec {
    #[serde(default, rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Secret parameters never appear literally in the chain; their values
    /// live in the separate secrets store.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secret: bool,
}

impl ParameterSpec {
    pub fn required_secret() -> Self {
        Self {
            required: true,
            secret: true,
            ..Default::default()
        }
    }

    pub fn required_plain() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }
}

/// Producer-output binding on a dependency edge: which upstream output feeds
/// a dependent parameter, with an optional value transform.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutputBinding {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl<'de> Deserialize<'de> for OutputBinding {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Record {
                output: String,
                #[serde(default)]
                transform: Option<String>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(output) => Self {
                output,
                transform: None,
            },
            Repr::Record { output, transform } => Self { output, transform },
        })
    }
}

/// Guard check kinds evaluated against the live execution context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum GuardCheck {
    IsAuthenticated,
    HasData { key: String },
    UrlMatches { pattern: String },
    ElementExists { selector: String },
    VariableExists { name: String },
    Custom { expr: String },
}

/// Condition attached to a dependency edge. `skip_if` inverts the result:
/// when true, a truthy check means the dependency is skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guard {
    #[serde(flatten)]
    pub check: GuardCheck,
    #[serde(default)]
    pub skip_if: bool,
}

/// Dependency edge. Accepts both a bare scenario name and the record form;
/// both deserialize to the record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DependencyRef {
    pub scenario: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, OutputBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Guard>,
}

impl DependencyRef {
    pub fn named(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            optional: false,
            parameters: BTreeMap::new(),
            condition: None,
        }
    }
}

impl<'de> Deserialize<'de> for DependencyRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Record {
                scenario: String,
                #[serde(default)]
                optional: bool,
                #[serde(default)]
                parameters: BTreeMap<String, OutputBinding>,
                #[serde(default)]
                condition: Option<Guard>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(scenario) => Self::named(scenario),
            Repr::Record {
                scenario,
                optional,
                parameters,
                condition,
            } => Self {
                scenario,
                optional,
                parameters,
                condition,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScenarioMetadata {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A named, persistent recording of an interaction flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: ScenarioMetadata,
    #[serde(default)]
    pub chain: Vec<Action>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            created_at,
            updated_at: None,
            metadata: ScenarioMetadata::default(),
            chain: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Names of parameters flagged secret.
    pub fn secret_parameters(&self) -> Vec<&str> {
        self.metadata
            .parameters
            .iter()
            .filter(|(_, spec)| spec.secret)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn has_secret_parameters(&self) -> bool {
        self.metadata.parameters.values().any(|spec| spec.secret)
    }

    /// Every `{{name}}` placeholder appearing anywhere in the chain.
    pub fn chain_placeholders(&self) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        // Placeholders only ever live in string fields, so scanning the
        // serialized form covers every action variant uniformly.
        if let Ok(value) = serde_json::to_value(&self.chain) {
            collect_placeholders(&value, &mut found);
        }
        found
    }

    /// Placeholders in the chain not declared as parameters and not supplied
    /// by any dependency output binding.
    pub fn undeclared_placeholders(&self) -> BTreeSet<String> {
        let mut missing = self.chain_placeholders();
        for name in self.metadata.parameters.keys() {
            missing.remove(name);
        }
        for dependency in &self.metadata.dependencies {
            for bound in dependency.parameters.keys() {
                missing.remove(bound);
            }
        }
        missing
    }
}

fn collect_placeholders(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::String(text) => found.extend(template::placeholders(text)),
        Value::Array(items) => {
            for item in items {
                collect_placeholders(item, found);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_placeholders(item, found);
            }
        }
        _ => {}
    }
}
