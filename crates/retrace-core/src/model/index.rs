//! Scenario index: a cache of summary metadata. The per-scenario document
//! files are authoritative; the index is rebuilt entry-by-entry on save and
//! reconciled by the storage validate operation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scenario::Scenario;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub has_secrets: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IndexEntry {
    pub fn from_scenario(scenario: &Scenario, has_secrets: bool) -> Self {
        Self {
            name: scenario.name.clone(),
            description: scenario.metadata.description.clone(),
            tags: scenario.metadata.tags.clone(),
            dependencies: scenario
                .metadata
                .dependencies
                .iter()
                .map(|dependency| dependency.scenario.clone())
                .collect(),
            parameters: scenario.metadata.parameters.keys().cloned().collect(),
            outputs: scenario.metadata.outputs.clone(),
            has_secrets,
            created_at: scenario.created_at,
            updated_at: scenario.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScenarioIndex {
    #[serde(default)]
    pub scenarios: BTreeMap<String, IndexEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScenarioIndex {
    pub fn upsert(&mut self, entry: IndexEntry, now: DateTime<Utc>) {
        self.scenarios.insert(entry.name.clone(), entry);
        self.updated_at = Some(now);
    }

    pub fn remove(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        let removed = self.scenarios.remove(name).is_some();
        if removed {
            self.updated_at = Some(now);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyRef, ParameterSpec};

    #[test]
    fn entry_summarises_scenario_metadata() {
        let mut scenario = Scenario::new("checkout_flow", Utc::now());
        scenario.metadata.description = "Buy the cart".to_string();
        scenario.metadata.tags.insert("commerce".to_string());
        scenario
            .metadata
            .dependencies
            .push(DependencyRef::named("login_flow"));
        scenario
            .metadata
            .parameters
            .insert("password".to_string(), ParameterSpec::required_secret());
        scenario.metadata.outputs.push("order_id".to_string());

        let entry = IndexEntry::from_scenario(&scenario, true);
        assert_eq!(entry.name, "checkout_flow");
        assert_eq!(entry.dependencies, vec!["login_flow"]);
        assert_eq!(entry.parameters, vec!["password"]);
        assert_eq!(entry.outputs, vec!["order_id"]);
        assert!(entry.has_secrets);
    }

    #[test]
    fn upsert_and_remove_touch_updated_at() {
        let mut index = ScenarioIndex::default();
        let scenario = Scenario::new("a", Utc::now());
        let now = Utc::now();

        index.upsert(IndexEntry::from_scenario(&scenario, false), now);
        assert!(index.scenarios.contains_key("a"));
        assert_eq!(index.updated_at, Some(now));

        assert!(index.remove("a", now));
        assert!(!index.remove("a", now));
        assert!(index.scenarios.is_empty());
    }
}
