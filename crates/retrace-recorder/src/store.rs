//! Durable per-origin recording snapshots.
//!
//! The session is persisted on every state change so navigation-driven page
//! reloads (and host restarts) do not interrupt a recording. Snapshots older
//! than 24 hours are discarded on load. After a successful save a "clearing"
//! sentinel suppresses further writes until Start is pressed again, so
//! zombie state cannot reappear.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use tracing::debug;

use retrace_core::error::Result;

use crate::session::RecorderSnapshot;

const SNAPSHOT_TTL_HOURS: i64 = 24;

pub struct RecorderStore {
    dir: PathBuf,
}

impl RecorderStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn snapshot_path(&self, origin: &str) -> PathBuf {
        self.dir.join(format!("{}.json", origin_key(origin)))
    }

    fn clearing_path(&self, origin: &str) -> PathBuf {
        self.dir.join(format!("{}.clearing", origin_key(origin)))
    }

    /// Persist a snapshot, unless the clearing sentinel gates this origin.
    pub fn put(&self, origin: &str, snapshot: &RecorderSnapshot) -> Result<()> {
        if self.clearing_path(origin).exists() {
            debug!(origin = %origin, "snapshot write suppressed by clearing sentinel");
            return Ok(());
        }
        let json = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(self.snapshot_path(origin), json)?;
        Ok(())
    }

    /// Load the snapshot for an origin; expired entries are deleted and
    /// reported as absent.
    pub fn get(&self, origin: &str) -> Result<Option<RecorderSnapshot>> {
        let path = self.snapshot_path(origin);
        if !path.exists() {
            return Ok(None);
        }
        let snapshot: RecorderSnapshot = match serde_json::from_slice(&std::fs::read(&path)?) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                debug!(origin = %origin, "discarding unreadable snapshot: {}", error);
                std::fs::remove_file(&path)?;
                return Ok(None);
            }
        };

        if Utc::now() - snapshot.saved_at > Duration::hours(SNAPSHOT_TTL_HOURS) {
            debug!(origin = %origin, "discarding snapshot older than 24h");
            std::fs::remove_file(&path)?;
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    /// Mark a scenario as just-saved: removes the snapshot and gates further
    /// writes until `unlock` is called on the next Start.
    pub fn set_clearing(&self, origin: &str) -> Result<()> {
        let snapshot = self.snapshot_path(origin);
        if snapshot.exists() {
            std::fs::remove_file(snapshot)?;
        }
        std::fs::write(self.clearing_path(origin), b"")?;
        Ok(())
    }

    /// Lift the clearing gate; called when a new recording starts.
    pub fn unlock(&self, origin: &str) -> Result<()> {
        let path = self.clearing_path(origin);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn discard(&self, origin: &str) -> Result<()> {
        let path = self.snapshot_path(origin);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Collapse an origin into a filesystem-safe key.
fn origin_key(origin: &str) -> String {
    origin
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}
