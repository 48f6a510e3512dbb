//! Scenario document storage: one file per scenario plus an index aggregate.
//! The document files are authoritative; every save rewrites the scenario
//! file first and the index entry after, so crash-consistency bias is toward
//! "file present, index behind", and `validate` is the reconciliation
//! primitive.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use retrace_core::error::{Result, RetraceError};
use retrace_core::model::{IndexEntry, Scenario, ScenarioIndex};
use retrace_core::paths;

use crate::secrets::SecretStore;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring of name or description.
    pub text: Option<String>,
    /// Scenarios sharing at least one of these tags.
    pub tags: Vec<String>,
    /// Scenarios with a dependency edge targeting this name.
    pub depends_on: Option<String>,
}

impl SearchQuery {
    fn is_empty(&self) -> bool {
        self.text.is_none() && self.tags.is_empty() && self.depends_on.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StoreStats {
    pub total: usize,
    pub with_secrets: usize,
    pub with_dependencies: usize,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ValidationReport {
    /// Scenario files present on disk but absent from the index.
    pub orphan_files: Vec<String>,
    /// Index entries whose scenario file is missing.
    pub missing_files: Vec<String>,
    /// (scenario, dependency) pairs where the target does not exist.
    pub broken_dependencies: Vec<(String, String)>,
    /// Secrets files with no corresponding scenario.
    pub orphan_secrets: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_files.is_empty()
            && self.missing_files.is_empty()
            && self.broken_dependencies.is_empty()
            && self.orphan_secrets.is_empty()
    }
}

/// Portable serialised form used by export/import.
#[derive(Debug, Serialize, Deserialize)]
struct ExportDocument {
    scenario: Scenario,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secrets: Option<BTreeMap<String, String>>,
}

pub struct ScenarioStore {
    scenarios_dir: PathBuf,
    secrets: SecretStore,
}

impl ScenarioStore {
    /// Open a store rooted at the default data directory (`RETRACE_DIR` or
    /// `~/.retrace`).
    pub fn open_default() -> Result<Self> {
        let scenarios = paths::scenarios_dir().map_err(|e| RetraceError::validation(e.to_string()))?;
        let secrets = paths::secrets_dir().map_err(|e| RetraceError::validation(e.to_string()))?;
        Self::open(scenarios, secrets)
    }

    /// Initialise both directories and the secrets excluder sentinel.
    pub fn open(scenarios_dir: impl Into<PathBuf>, secrets_dir: impl Into<PathBuf>) -> Result<Self> {
        let scenarios_dir = scenarios_dir.into();
        std::fs::create_dir_all(&scenarios_dir)?;
        Ok(Self {
            scenarios_dir,
            secrets: SecretStore::open(secrets_dir)?,
        })
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    fn scenario_path(&self, name: &str) -> PathBuf {
        self.scenarios_dir.join(format!("{}.json", name))
    }

    fn index_path(&self) -> PathBuf {
        self.scenarios_dir.join(INDEX_FILE)
    }

    fn read_index(&self) -> Result<ScenarioIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(ScenarioIndex::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_index(&self, index: &ScenarioIndex) -> Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        std::fs::write(self.index_path(), json)?;
        Ok(())
    }

    /// Save a scenario, and its secrets when non-empty. Preserves the
    /// original `created_at` on update and refreshes `updated_at`; the index
    /// entry is normalised before return.
    pub fn save(
        &self,
        mut scenario: Scenario,
        secrets: Option<&BTreeMap<String, String>>,
    ) -> Result<Scenario> {
        validate_name(&scenario.name)?;
        if scenario.chain.is_empty() {
            return Err(RetraceError::validation(format!(
                "Scenario '{}' has an empty action chain",
                scenario.name
            )));
        }

        let now = Utc::now();
        let path = self.scenario_path(&scenario.name);
        if path.exists() {
            let existing: Scenario = serde_json::from_slice(&std::fs::read(&path)?)?;
            scenario.created_at = existing.created_at;
        }
        scenario.updated_at = Some(now);

        let json = serde_json::to_vec_pretty(&scenario)?;
        std::fs::write(&path, json)?;

        if let Some(values) = secrets
            && !values.is_empty()
        {
            self.secrets.put(&scenario.name, values)?;
        }

        let mut index = self.read_index()?;
        let has_secrets = self.secrets.exists(&scenario.name);
        index.upsert(IndexEntry::from_scenario(&scenario, has_secrets), now);
        self.write_index(&index)?;

        debug!(scenario = %scenario.name, "scenario saved");
        Ok(scenario)
    }

    pub fn load(&self, name: &str) -> Result<Scenario> {
        let path = self.scenario_path(name);
        if !path.exists() {
            return Err(RetraceError::ScenarioNotFound(name.to_string()));
        }
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    /// Load a scenario together with its secret values, when any exist.
    pub fn load_with_secrets(
        &self,
        name: &str,
    ) -> Result<(Scenario, Option<BTreeMap<String, String>>)> {
        let scenario = self.load(name)?;
        let secrets = self.secrets.get(name)?;
        Ok((scenario, secrets))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.scenario_path(name).exists()
    }

    /// Remove the scenario file, its secrets file, and the index entry.
    /// Idempotent: returns false when nothing was stored under the name.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.scenario_path(name);
        let existed = path.exists();
        if existed {
            std::fs::remove_file(path)?;
        }
        self.secrets.delete(name)?;

        let mut index = self.read_index()?;
        if index.remove(name, Utc::now()) {
            self.write_index(&index)?;
        }
        Ok(existed)
    }

    /// Load, save under the new name, then delete the old. Not transactional:
    /// a crash mid-way can leave both names present; `validate` surfaces the
    /// leftovers.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        validate_name(new)?;
        if self.exists(new) {
            return Err(RetraceError::validation(format!(
                "Scenario '{}' already exists",
                new
            )));
        }
        let (mut scenario, secrets) = self.load_with_secrets(old)?;
        scenario.name = new.to_string();
        self.save(scenario, secrets.as_ref())?;
        self.delete(old)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<IndexEntry>> {
        let index = self.read_index()?;
        Ok(index.scenarios.into_values().collect())
    }

    /// Union-of-matches filter: an entry is returned when any populated
    /// criterion matches it.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<IndexEntry>> {
        let entries = self.list()?;
        if query.is_empty() {
            return Ok(entries);
        }

        let needle = query.text.as_deref().map(str::to_lowercase);
        Ok(entries
            .into_iter()
            .filter(|entry| {
                if let Some(needle) = &needle
                    && (entry.name.to_lowercase().contains(needle)
                        || entry.description.to_lowercase().contains(needle))
                {
                    return true;
                }
                if query.tags.iter().any(|tag| entry.tags.contains(tag)) {
                    return true;
                }
                if let Some(target) = &query.depends_on
                    && entry.dependencies.iter().any(|dep| dep == target)
                {
                    return true;
                }
                false
            })
            .collect())
    }

    /// Serialise a scenario (and optionally its secrets) to a portable
    /// textual form.
    pub fn export(&self, name: &str, include_secrets: bool) -> Result<String> {
        let (scenario, secrets) = self.load_with_secrets(name)?;
        let document = ExportDocument {
            scenario,
            secrets: if include_secrets { secrets } else { None },
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Parse a serialised scenario and store it. Accepts both the export
    /// envelope and a bare scenario document. Refuses to replace an existing
    /// scenario unless `overwrite` is set.
    pub fn import(&self, text: &str, overwrite: bool) -> Result<Scenario> {
        let document: ExportDocument = match serde_json::from_str(text) {
            Ok(document) => document,
            Err(_) => ExportDocument {
                scenario: serde_json::from_str(text).map_err(|error| {
                    RetraceError::validation(format!("Malformed scenario document: {}", error))
                })?,
                secrets: None,
            },
        };

        if self.exists(&document.scenario.name) && !overwrite {
            return Err(RetraceError::validation(format!(
                "Scenario '{}' already exists; pass overwrite to replace it",
                document.scenario.name
            )));
        }
        self.save(document.scenario, document.secrets.as_ref())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let entries = self.list()?;
        let mut stats = StoreStats {
            total: entries.len(),
            ..Default::default()
        };
        for entry in &entries {
            if entry.has_secrets {
                stats.with_secrets += 1;
            }
            if !entry.dependencies.is_empty() {
                stats.with_dependencies += 1;
            }
            stats.tags.extend(entry.tags.iter().cloned());
        }
        Ok(stats)
    }

    /// Report referential inconsistencies between the files and the index.
    pub fn validate(&self) -> Result<ValidationReport> {
        let index = self.read_index()?;
        let mut report = ValidationReport::default();

        let mut on_disk = BTreeSet::new();
        for entry in std::fs::read_dir(&self.scenarios_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == "index" {
                continue;
            }
            on_disk.insert(stem.to_string());
            if !index.scenarios.contains_key(stem) {
                report.orphan_files.push(stem.to_string());
            }
        }

        for (name, entry) in &index.scenarios {
            if !on_disk.contains(name) {
                report.missing_files.push(name.clone());
            }
            for dependency in &entry.dependencies {
                if !on_disk.contains(dependency) {
                    report
                        .broken_dependencies
                        .push((name.clone(), dependency.clone()));
                }
            }
        }

        for name in self.secrets.scenario_names()? {
            if !on_disk.contains(&name) {
                report.orphan_secrets.push(name);
            }
        }

        Ok(report)
    }

    pub fn scenarios_dir(&self) -> &Path {
        &self.scenarios_dir
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RetraceError::validation("Scenario name is required"));
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(RetraceError::validation(format!(
            "Scenario name '{}' must not contain path separators",
            name
        )));
    }
    Ok(())
}
