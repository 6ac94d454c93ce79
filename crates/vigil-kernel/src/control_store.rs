//! [`ControlStore`] – on-disk persistence of the capability control state.
//!
//! Layout under the store directory:
//!
//! ```text
//! control_state.json                         current snapshot (version 1)
//! backups/control_state-<UTC timestamp>.json previous snapshots, newest last
//! ```
//!
//! Saves are serialized by a mutex and written through a temporary file so
//! a crash never leaves a half-written snapshot behind.  Loading validates
//! the snapshot and falls back to the newest valid backup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use vigil_types::VigilError;

/// Snapshot format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

const SNAPSHOT_FILE: &str = "control_state.json";
const BACKUP_DIR: &str = "backups";
const BACKUP_PREFIX: &str = "control_state-";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid snapshot: {0}")]
    Invalid(String),
}

impl From<PersistenceError> for VigilError {
    fn from(err: PersistenceError) -> Self {
        VigilError::PersistenceFailure(err.to_string())
    }
}

/// Available and active signals of one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSignals {
    pub available: Vec<String>,
    pub active: Vec<String>,
}

/// Versioned capture of every component's signal sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub components: BTreeMap<String, ComponentSignals>,
}

impl ControlSnapshot {
    pub fn new(components: BTreeMap<String, ComponentSignals>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            components,
        }
    }

    /// Structural checks: known version, non-empty component names and
    /// `active ⊆ available` for every component.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::Invalid(format!(
                "unsupported version {} (expected {SNAPSHOT_VERSION})",
                self.version
            )));
        }
        for (name, signals) in &self.components {
            if name.trim().is_empty() {
                return Err(PersistenceError::Invalid("empty component name".into()));
            }
            if let Some(stray) = signals
                .active
                .iter()
                .find(|s| !signals.available.contains(s))
            {
                return Err(PersistenceError::Invalid(format!(
                    "component '{name}' has active signal '{stray}' that is not available"
                )));
            }
        }
        Ok(())
    }
}

/// File-backed snapshot store with rotating backups.
pub struct ControlStore {
    dir: PathBuf,
    max_backups: usize,
    write_lock: Mutex<()>,
}

impl ControlStore {
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            max_backups,
            write_lock: Mutex::new(()),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }

    /// Persist `snapshot`, rotating the current file into the backups.
    /// Returns the path written.
    pub fn save(&self, snapshot: &ControlSnapshot) -> Result<PathBuf, PersistenceError> {
        snapshot.validate()?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(&self.dir)?;
        let path = self.snapshot_path();
        if path.exists() {
            self.rotate(&path)?;
        }

        let tmp = self.dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &path)?;
        info!(path = %path.display(), components = snapshot.components.len(), "control state saved");
        Ok(path)
    }

    /// Load the current snapshot, falling back to the newest valid backup.
    ///
    /// `Ok(None)` means there is no usable persisted state.
    pub fn load(&self) -> Result<Option<ControlSnapshot>, PersistenceError> {
        let path = self.snapshot_path();
        if path.exists() {
            match read_snapshot(&path) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) => warn!(path = %path.display(), error = %e, "control state unreadable; trying backups"),
            }
        }

        for backup in self.backups()? {
            match read_snapshot(&backup) {
                Ok(snapshot) => {
                    info!(path = %backup.display(), "control state recovered from backup");
                    return Ok(Some(snapshot));
                }
                Err(e) => debug!(path = %backup.display(), error = %e, "skipping invalid backup"),
            }
        }

        if path.exists() {
            warn!("no valid control state or backup found; starting with defaults");
        }
        Ok(None)
    }

    /// Backup files, newest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        let dir = self.backup_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".json"))
            })
            .collect();
        // Timestamps are fixed-width, so name order is chronological.
        files.sort();
        files.reverse();
        Ok(files)
    }

    fn rotate(&self, current: &Path) -> Result<(), PersistenceError> {
        let dir = self.backup_dir();
        fs::create_dir_all(&dir)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let mut target = dir.join(format!("{BACKUP_PREFIX}{stamp}.json"));
        let mut n = 1;
        while target.exists() {
            target = dir.join(format!("{BACKUP_PREFIX}{stamp}-{n}.json"));
            n += 1;
        }
        fs::copy(current, &target)?;

        for stale in self.backups()?.into_iter().skip(self.max_backups) {
            debug!(path = %stale.display(), "pruning old backup");
            fs::remove_file(stale)?;
        }
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> Result<ControlSnapshot, PersistenceError> {
    let bytes = fs::read(path)?;
    let snapshot: ControlSnapshot = serde_json::from_slice(&bytes)?;
    snapshot.validate()?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot(active: &[&str]) -> ControlSnapshot {
        let mut components = BTreeMap::new();
        components.insert(
            "transport".to_string(),
            ComponentSignals {
                available: vec!["cardiac/ppi".into(), "eeg/raw".into()],
                active: active.iter().map(|s| s.to_string()).collect(),
            },
        );
        ControlSnapshot::new(components)
    }

    #[test]
    fn missing_store_loads_none() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ControlStore::new(dir.path().join("state"), 3);
        assert!(store.load()?.is_none());
        Ok(())
    }

    #[test]
    fn save_then_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ControlStore::new(dir.path(), 3);
        let snap = snapshot(&["cardiac/ppi"]);
        store.save(&snap)?;
        assert_eq!(store.load()?, Some(snap));
        assert!(store.backups()?.is_empty());
        Ok(())
    }

    #[test]
    fn second_save_rotates_backup() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ControlStore::new(dir.path(), 3);
        store.save(&snapshot(&["cardiac/ppi", "eeg/raw"]))?;
        store.save(&snapshot(&["cardiac/ppi"]))?;
        assert_eq!(store.backups()?.len(), 1);
        Ok(())
    }

    #[test]
    fn backups_are_pruned() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ControlStore::new(dir.path(), 2);
        for _ in 0..5 {
            store.save(&snapshot(&[]))?;
        }
        assert_eq!(store.backups()?.len(), 2);
        Ok(())
    }

    #[test]
    fn corrupt_primary_falls_back_to_newest_backup() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ControlStore::new(dir.path(), 5);
        store.save(&snapshot(&["eeg/raw"]))?;
        store.save(&snapshot(&["cardiac/ppi"]))?;
        fs::write(store.snapshot_path(), b"{ not json")?;

        let loaded = store.load()?.ok_or("expected a backup")?;
        assert_eq!(loaded.components["transport"].active, vec!["eeg/raw".to_string()]);
        Ok(())
    }

    #[test]
    fn all_invalid_loads_none() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ControlStore::new(dir.path(), 5);
        store.save(&snapshot(&[]))?;
        store.save(&snapshot(&[]))?;
        fs::write(store.snapshot_path(), b"[]")?;
        for backup in store.backups()? {
            fs::write(backup, br#"{"version": 9}"#)?;
        }
        assert!(store.load()?.is_none());
        Ok(())
    }

    #[test]
    fn validation_rejects_inconsistent_snapshots() {
        let mut snap = snapshot(&["lidar"]);
        assert!(matches!(snap.validate(), Err(PersistenceError::Invalid(_))));

        snap = snapshot(&[]);
        snap.version = 2;
        assert!(snap.validate().is_err());

        let err: VigilError = PersistenceError::Invalid("x".into()).into();
        assert!(matches!(err, VigilError::PersistenceFailure(_)));
    }

    #[test]
    fn save_refuses_invalid_snapshot() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ControlStore::new(dir.path(), 3);
        assert!(store.save(&snapshot(&["lidar"])).is_err());
        assert!(!store.snapshot_path().exists());
        Ok(())
    }
}
