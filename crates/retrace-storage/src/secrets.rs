//! Per-scenario secret files, kept apart from the shareable scenario
//! documents. The directory carries a gitignore sentinel so its contents
//! stay out of source control by default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use retrace_core::error::Result;

const EXCLUDER_FILE: &str = ".gitignore";
const EXCLUDER_CONTENT: &str = "*\n!.gitignore\n";

/// Plain key-value secret storage, one file per scenario.
pub struct SecretStore {
    dir: PathBuf,
}

impl SecretStore {
    /// Ensure the directory and its excluder sentinel exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let sentinel = dir.join(EXCLUDER_FILE);
        if !sentinel.exists() {
            std::fs::write(&sentinel, EXCLUDER_CONTENT)?;
        }
        Ok(Self { dir })
    }

    fn file_path(&self, scenario: &str) -> PathBuf {
        self.dir.join(format!("{}.json", scenario))
    }

    pub fn put(&self, scenario: &str, values: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(values)?;
        std::fs::write(self.file_path(scenario), json)?;
        Ok(())
    }

    pub fn get(&self, scenario: &str) -> Result<Option<BTreeMap<String, String>>> {
        let path = self.file_path(scenario);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub fn exists(&self, scenario: &str) -> bool {
        self.file_path(scenario).exists()
    }

    /// Idempotent: removing absent secrets is not an error.
    pub fn delete(&self, scenario: &str) -> Result<bool> {
        let path = self.file_path(scenario);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }

    /// Scenario names that currently have a secrets file.
    pub fn scenario_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn open_creates_excluder_sentinel() {
        let temp = tempdir().unwrap();
        let store = SecretStore::open(temp.path().join("secrets")).unwrap();

        let sentinel = store.dir().join(".gitignore");
        let content = std::fs::read_to_string(sentinel).unwrap();
        assert!(content.contains("*"));
        assert!(content.contains("!.gitignore"));
    }

    #[test]
    fn put_get_delete_round_trip() {
        let temp = tempdir().unwrap();
        let store = SecretStore::open(temp.path().join("secrets")).unwrap();

        let secrets = values(&[("email", "user@example.com"), ("password", "secret123")]);
        store.put("login_flow", &secrets).unwrap();

        assert!(store.exists("login_flow"));
        assert_eq!(store.get("login_flow").unwrap(), Some(secrets));

        assert!(store.delete("login_flow").unwrap());
        assert!(!store.delete("login_flow").unwrap());
        assert_eq!(store.get("login_flow").unwrap(), None);
    }

    #[test]
    fn scenario_names_skip_the_sentinel() {
        let temp = tempdir().unwrap();
        let store = SecretStore::open(temp.path().join("secrets")).unwrap();
        store.put("a", &values(&[("k", "v")])).unwrap();
        store.put("b", &values(&[("k", "v")])).unwrap();

        assert_eq!(store.scenario_names().unwrap(), vec!["a", "b"]);
    }
}
