//! Deployment directory scanning and delta computation.
//!
//! # Responsibilities
//! - Walk the deployment root and record every unit with its modification time
//! - Classify each path between two snapshots as deploy, undeploy or redeploy
//!
//! # Design Decisions
//! - Keys are root-relative paths with `/` separators on every platform
//! - Timestamps are milliseconds since the Unix epoch
//! - Any timestamp change counts as a redeploy, including going backwards
//!   (a restored backup is still a new version)

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use walkdir::WalkDir;

use crate::deploy::DeployError;

pub const UNIT_EXTENSION: &str = "unit";
pub const ARCHIVE_EXTENSION: &str = "tar";

/// Classification of one path between two scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Deploy,
    Undeploy,
    Redeploy,
}

/// Shape of a deployable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// One `*.unit` document.
    Single,
    /// A `*.tar` archive of unit documents.
    Archive,
}

impl UnitKind {
    pub fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(UNIT_EXTENSION) => Some(UnitKind::Single),
            Some(ARCHIVE_EXTENSION) => Some(UnitKind::Archive),
            _ => None,
        }
    }
}

/// Relative unit path → last-modified timestamp (ms).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentSnapshot {
    entries: BTreeMap<String, u64>,
}

impl DeploymentSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recursively list units and archives under `root`.
    pub fn scan(root: &Path) -> Result<Self, DeployError> {
        if !root.is_dir() {
            return Err(DeployError::MissingDirectory(root.to_path_buf()));
        }

        let mut entries = BTreeMap::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || UnitKind::of(entry.path()).is_none() {
                continue;
            }

            let metadata = entry.metadata()?;
            let modified = metadata.modified().map_err(|source| DeployError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;

            if let Some(key) = relative_key(root, entry.path()) {
                entries.insert(key, millis(modified));
            }
        }

        Ok(Self { entries })
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Classify every path that differs between `self` (old) and `new`.
    /// Unchanged paths are omitted.
    pub fn diff(&self, new: &DeploymentSnapshot) -> BTreeMap<String, DeploymentMode> {
        let mut delta = BTreeMap::new();

        for (path, stamp) in &new.entries {
            match self.entries.get(path) {
                None => {
                    delta.insert(path.clone(), DeploymentMode::Deploy);
                }
                Some(old) if old != stamp => {
                    delta.insert(path.clone(), DeploymentMode::Redeploy);
                }
                Some(_) => {}
            }
        }
        for path in self.entries.keys() {
            if !new.entries.contains_key(path) {
                delta.insert(path.clone(), DeploymentMode::Undeploy);
            }
        }

        delta
    }

    pub fn timestamp(&self, path: &str) -> Option<u64> {
        self.entries.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;

    fn touch(path: &Path, secs: u64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        if !path.exists() {
            fs::write(path, "mount = \"/x\"\n").unwrap();
        }
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn test_scan_filters_and_nests() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.unit"), 100);
        touch(&dir.path().join("nested/deeper/b.unit"), 200);
        touch(&dir.path().join("bundle.tar"), 300);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let snapshot = DeploymentSnapshot::scan(dir.path()).unwrap();
        let keys: Vec<&str> = snapshot.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a.unit", "bundle.tar", "nested/deeper/b.unit"]);
        assert_eq!(snapshot.timestamp("a.unit"), Some(100_000));
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            DeploymentSnapshot::scan(&missing),
            Err(DeployError::MissingDirectory(_))
        ));
    }

    #[test]
    fn test_delta_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("plugin.unit");

        let empty = DeploymentSnapshot::scan(dir.path()).unwrap();
        let again = DeploymentSnapshot::scan(dir.path()).unwrap();
        assert!(empty.diff(&again).is_empty());
        assert!(again.diff(&DeploymentSnapshot::scan(dir.path()).unwrap()).is_empty());

        touch(&unit, 1_000);
        let added = DeploymentSnapshot::scan(dir.path()).unwrap();
        let delta = again.diff(&added);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta["plugin.unit"], DeploymentMode::Deploy);

        touch(&unit, 2_000);
        let touched = DeploymentSnapshot::scan(dir.path()).unwrap();
        assert_eq!(added.diff(&touched)["plugin.unit"], DeploymentMode::Redeploy);

        fs::remove_file(&unit).unwrap();
        let removed = DeploymentSnapshot::scan(dir.path()).unwrap();
        assert_eq!(touched.diff(&removed)["plugin.unit"], DeploymentMode::Undeploy);
    }

    #[test]
    fn test_diff_from_entries() {
        let old = DeploymentSnapshot::from_entries([("keep", 1), ("change", 1), ("gone", 1)]);
        let new = DeploymentSnapshot::from_entries([("keep", 1), ("change", 0), ("fresh", 5)]);
        let delta = old.diff(&new);

        assert_eq!(delta.len(), 3);
        assert_eq!(delta["change"], DeploymentMode::Redeploy);
        assert_eq!(delta["gone"], DeploymentMode::Undeploy);
        assert_eq!(delta["fresh"], DeploymentMode::Deploy);
    }
}
