//! Deployment cycle orchestration.
//!
//! # Responsibilities
//! - Run one scan → diff → load → undeploy → deploy cycle against the router
//! - Remember which mounts every unit contributed, so the unit can be
//!   undeployed or replaced later
//! - Report the net change of each cycle
//!
//! # Design Decisions
//! - Cycles are serialized with `try_lock`; an overlapping request is skipped
//!   rather than queued
//! - New versions are loaded before old ones are removed; a unit whose new
//!   version fails to load keeps serving its previous version
//! - The snapshot always advances, so a broken unit is retried only after it
//!   changes again

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, TryLockError};

use serde::Serialize;

use crate::deploy::loader::{DeploymentDesc, UnitLoader};
use crate::deploy::snapshot::{DeploymentMode, DeploymentSnapshot};
use crate::deploy::DeployError;
use crate::observability::metrics;
use crate::plugin::HandlerCatalog;
use crate::routing::Router;

/// Outcome of one deployment cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Classification of every changed path.
    pub delta: BTreeMap<String, DeploymentMode>,
    /// Mounts deployed in this cycle.
    pub deployed: Vec<String>,
    /// Mounts undeployed in this cycle.
    pub undeployed: Vec<String>,
    /// Units that failed to load or deploy.
    pub failed: Vec<String>,
}

impl CycleReport {
    /// Deployed minus undeployed plugin count.
    pub fn net(&self) -> i64 {
        self.deployed.len() as i64 - self.undeployed.len() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }
}

#[derive(Default)]
struct ManagerState {
    snapshot: DeploymentSnapshot,
    // Unit path → mounts it currently occupies.
    deployed: BTreeMap<String, Vec<String>>,
}

/// Keeps the router in sync with the deployment directory.
pub struct DeploymentManager {
    root: PathBuf,
    class_prefix: String,
    router: Arc<Router>,
    catalog: HandlerCatalog,
    state: Mutex<ManagerState>,
}

impl DeploymentManager {
    pub fn new(root: impl Into<PathBuf>, class_prefix: impl Into<String>, router: Arc<Router>, catalog: HandlerCatalog) -> Self {
        Self {
            root: root.into(),
            class_prefix: class_prefix.into(),
            router,
            catalog,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run one cycle and return its net change.
    ///
    /// `1` after adding a one-plugin unit, `0` when nothing changed (or a
    /// unit was replaced), `-1` after removing it. A skipped cycle counts
    /// as no change.
    pub fn redeploy(&self) -> Result<i64, DeployError> {
        Ok(self.run_cycle()?.map(|report| report.net()).unwrap_or(0))
    }

    /// Run one cycle. Returns `None` when another cycle is in progress.
    pub fn run_cycle(&self) -> Result<Option<CycleReport>, DeployError> {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                tracing::debug!(root = %self.root.display(), "Deployment cycle already running, skipping");
                metrics::record_deploy_cycle("skipped");
                return Ok(None);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let snapshot = match DeploymentSnapshot::scan(&self.root) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                metrics::record_deploy_cycle("failed");
                return Err(e);
            }
        };

        let delta = state.snapshot.diff(&snapshot);
        let mut report = CycleReport {
            delta: delta.clone(),
            ..CycleReport::default()
        };

        if delta.is_empty() {
            state.snapshot = snapshot;
            metrics::record_deploy_cycle("unchanged");
            return Ok(Some(report));
        }

        let mut loader = UnitLoader::new(&self.catalog, &self.class_prefix);
        let mut loaded: Vec<DeploymentDesc> = Vec::new();
        let mut load_failed: Vec<&str> = Vec::new();

        for (path, mode) in &delta {
            if *mode == DeploymentMode::Undeploy {
                continue;
            }
            let timestamp = snapshot.timestamp(path).unwrap_or_default();
            match loader.build_deployment_desc(&self.root, path, timestamp) {
                Ok(desc) => loaded.push(desc),
                Err(e) => {
                    tracing::error!(unit = %path, error = %e, "Failed to load deployment unit");
                    load_failed.push(path);
                    report.failed.push(path.clone());
                }
            }
        }

        for (path, mode) in &delta {
            let replace = *mode == DeploymentMode::Redeploy && !load_failed.contains(&path.as_str());
            if *mode != DeploymentMode::Undeploy && !replace {
                continue;
            }
            for mount in state.deployed.remove(path).unwrap_or_default() {
                match self.router.undeploy(&mount) {
                    Ok(_) => report.undeployed.push(mount),
                    Err(e) => tracing::warn!(unit = %path, mount = %mount, error = %e, "Undeploy failed"),
                }
            }
        }

        for desc in loaded {
            let mut mounts = Vec::new();
            for entry in &desc.plugins {
                let mount = entry.plugin.mount_path().to_string();
                match self.router.deploy(&mount, entry.plugin.clone()) {
                    Ok(()) => {
                        report.deployed.push(mount.clone());
                        mounts.push(mount);
                    }
                    Err(e) => {
                        tracing::error!(
                            unit = %desc.path,
                            symbol = %entry.symbol,
                            error = %e,
                            "Failed to deploy plugin"
                        );
                        if !report.failed.contains(&desc.path) {
                            report.failed.push(desc.path.clone());
                        }
                    }
                }
            }
            if !mounts.is_empty() {
                state.deployed.insert(desc.path.clone(), mounts);
            }
        }

        state.snapshot = snapshot;

        tracing::info!(
            root = %self.root.display(),
            changed = report.delta.len(),
            deployed = report.deployed.len(),
            undeployed = report.undeployed.len(),
            failed = report.failed.len(),
            "Deployment cycle complete"
        );
        metrics::record_deploy_cycle(if report.failed.is_empty() { "changed" } else { "failed" });

        Ok(Some(report))
    }

    /// Unit path → mounts, for introspection.
    pub fn deployed_units(&self) -> BTreeMap<String, Vec<String>> {
        self.state
            .lock()
            .map(|state| state.deployed.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().deployed.clone())
    }

    /// Undeploy every mount this manager owns and forget the snapshot.
    pub fn undeploy_all(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut removed = 0;
        for (path, mounts) in std::mem::take(&mut state.deployed) {
            for mount in mounts {
                match self.router.undeploy(&mount) {
                    Ok(_) => removed += 1,
                    Err(e) => tracing::warn!(unit = %path, mount = %mount, error = %e, "Undeploy failed"),
                }
            }
        }
        state.snapshot = DeploymentSnapshot::new();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ServiceLifecycle;
    use std::fs::{self, File};
    use std::time::{Duration, UNIX_EPOCH};

    fn unit(mount: &str) -> String {
        format!("mount = \"{mount}\"\n[[route]]\npattern = \"*\"\nbody = \"{{0}}\"\n")
    }

    fn write(dir: &Path, name: &str, text: &str, secs: u64) {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn manager(dir: &Path) -> (DeploymentManager, Arc<Router>) {
        let router = Arc::new(Router::new(Arc::new(ServiceLifecycle::new())));
        let manager = DeploymentManager::new(dir, "", router.clone(), HandlerCatalog::with_builtins());
        (manager, router)
    }

    #[test]
    fn test_add_repeat_remove() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, router) = manager(dir.path());

        assert_eq!(manager.redeploy().unwrap(), 0);

        write(dir.path(), "One.unit", &unit("/one"), 100);
        assert_eq!(manager.redeploy().unwrap(), 1);
        assert_eq!(router.mounts(), vec!["/one"]);

        assert_eq!(manager.redeploy().unwrap(), 0);

        fs::remove_file(dir.path().join("One.unit")).unwrap();
        assert_eq!(manager.redeploy().unwrap(), -1);
        assert!(router.mounts().is_empty());
    }

    #[test]
    fn test_touch_replaces_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, router) = manager(dir.path());

        write(dir.path(), "One.unit", &unit("/one"), 100);
        manager.redeploy().unwrap();

        write(dir.path(), "One.unit", &unit("/uno"), 200);
        let report = manager.run_cycle().unwrap().unwrap();
        assert_eq!(report.delta["One.unit"], DeploymentMode::Redeploy);
        assert_eq!(report.undeployed, vec!["/one"]);
        assert_eq!(report.deployed, vec!["/uno"]);
        assert_eq!(report.net(), 0);
        assert_eq!(router.mounts(), vec!["/uno"]);
    }

    #[test]
    fn test_bad_unit_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, router) = manager(dir.path());

        write(dir.path(), "Good.unit", &unit("/good"), 100);
        write(dir.path(), "Bad.unit", "not = [valid", 100);

        let report = manager.run_cycle().unwrap().unwrap();
        assert_eq!(report.deployed, vec!["/good"]);
        assert_eq!(report.failed, vec!["Bad.unit"]);
        assert_eq!(router.mounts(), vec!["/good"]);

        // Untouched broken unit is not retried.
        assert!(manager.run_cycle().unwrap().unwrap().failed.is_empty());
    }

    #[test]
    fn test_failed_redeploy_keeps_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, router) = manager(dir.path());

        write(dir.path(), "One.unit", &unit("/one"), 100);
        manager.redeploy().unwrap();

        write(dir.path(), "One.unit", "broken = [", 200);
        let report = manager.run_cycle().unwrap().unwrap();
        assert_eq!(report.failed, vec!["One.unit"]);
        assert!(report.undeployed.is_empty());
        assert_eq!(router.mounts(), vec!["/one"]);

        // Valid TOML with a route the router would reject.
        write(dir.path(), "One.unit", "mount = \"/one\"\n[[route]]\npattern = \"a/*/b\"\n", 300);
        let report = manager.run_cycle().unwrap().unwrap();
        assert_eq!(report.failed, vec!["One.unit"]);
        assert!(report.undeployed.is_empty());
        assert_eq!(router.mounts(), vec!["/one"]);
        assert_eq!(manager.deployed_units()["One.unit"], vec!["/one"]);
    }

    #[test]
    fn test_mount_conflict_is_unit_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, router) = manager(dir.path());

        write(dir.path(), "A.unit", &unit("/same"), 100);
        write(dir.path(), "B.unit", &unit("/same"), 100);

        let report = manager.run_cycle().unwrap().unwrap();
        assert_eq!(report.deployed, vec!["/same"]);
        assert_eq!(report.failed, vec!["B.unit"]);
        assert_eq!(router.mounts(), vec!["/same"]);
        assert_eq!(manager.deployed_units().len(), 1);
    }

    #[test]
    fn test_undeploy_all() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, router) = manager(dir.path());
        write(dir.path(), "A.unit", &unit("/a"), 100);
        write(dir.path(), "B.unit", &unit("/b"), 100);
        manager.redeploy().unwrap();

        assert_eq!(manager.undeploy_all(), 2);
        assert!(router.mounts().is_empty());
        // Snapshot was reset, so everything deploys again.
        assert_eq!(manager.redeploy().unwrap(), 2);
    }

    #[test]
    fn test_overlapping_cycle_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Slow.unit", "symbol = \"test.Slow\"\nmount = \"/slow\"\n", 100);

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let mut catalog = HandlerCatalog::new();
        catalog.register("test.Slow", move || {
            entered_tx.send(()).ok();
            release_rx.lock().unwrap().recv().ok();
            Arc::new(crate::plugin::builtin::EchoPlugin::default()) as Arc<dyn crate::plugin::Plugin>
        });

        let router = Arc::new(Router::new(Arc::new(ServiceLifecycle::new())));
        let manager = Arc::new(DeploymentManager::new(dir.path(), "", router.clone(), catalog));

        let first = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.run_cycle())
        };
        entered_rx.recv().unwrap();

        assert!(manager.run_cycle().unwrap().is_none());
        assert_eq!(manager.redeploy().unwrap(), 0);
        assert!(router.mounts().is_empty());

        release_tx.send(()).unwrap();
        let report = first.join().unwrap().unwrap().unwrap();
        assert_eq!(report.deployed, vec!["/slow"]);
        assert_eq!(router.mounts(), vec!["/slow"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(&dir.path().join("absent"));
        assert!(matches!(manager.redeploy(), Err(DeployError::MissingDirectory(_))));
    }
}
