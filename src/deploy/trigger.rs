//! Deployment cycle triggers.
//!
//! Two independent sources ask the manager for a cycle: a fixed-period
//! timer and, optionally, filesystem events on the deployment root. Both
//! stop on shutdown. Cycles run on the blocking pool because they touch the
//! filesystem.

use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::deploy::DeploymentManager;
use crate::lifecycle::Shutdown;

/// Quiet period after a filesystem event before a cycle runs.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(250);

/// Start the periodic trigger (unless `period` is zero) and, when
/// `watch_events` is set, the filesystem watcher.
pub fn spawn(
    manager: Arc<DeploymentManager>,
    period: Duration,
    watch_events: bool,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    if !period.is_zero() {
        handles.push(spawn_periodic(manager.clone(), period, shutdown));
    }
    if watch_events {
        match spawn_watcher(manager, shutdown) {
            Ok(handle) => handles.push(handle),
            Err(e) => tracing::warn!(error = %e, "Filesystem watcher unavailable, relying on periodic scans"),
        }
    }
    handles
}

/// Run a cycle every `period` until shutdown.
pub fn spawn_periodic(manager: Arc<DeploymentManager>, period: Duration, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the caller already ran the
        // initial cycle.
        ticker.tick().await;

        tracing::info!(period_ms = period.as_millis() as u64, "Periodic deployment scan started");
        loop {
            tokio::select! {
                _ = ticker.tick() => run_cycle(manager.clone(), "timer").await,
                _ = stop.recv() => {
                    tracing::info!("Periodic deployment scan stopped");
                    break;
                }
            }
        }
    })
}

/// Run a cycle after each burst of filesystem events under the root.
pub fn spawn_watcher(manager: Arc<DeploymentManager>, shutdown: &Shutdown) -> Result<JoinHandle<()>, notify::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove() {
                    let _ = tx.send(());
                }
            }
            Err(e) => tracing::error!(error = ?e, "Deployment watch error"),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;
    watcher.watch(manager.root(), RecursiveMode::Recursive)?;
    tracing::info!(path = ?manager.root(), "Deployment watcher started");

    let mut stop = shutdown.subscribe();
    Ok(tokio::spawn(async move {
        // Dropping the watcher stops event delivery.
        let _watcher = watcher;
        loop {
            tokio::select! {
                event = rx.recv() => {
                    if event.is_none() {
                        break;
                    }
                    // Collapse a burst of events into one cycle.
                    tokio::time::sleep(WATCH_DEBOUNCE).await;
                    while rx.try_recv().is_ok() {}
                    run_cycle(manager.clone(), "watch").await;
                }
                _ = stop.recv() => break,
            }
        }
        tracing::info!("Deployment watcher stopped");
    }))
}

async fn run_cycle(manager: Arc<DeploymentManager>, source: &'static str) {
    match tokio::task::spawn_blocking(move || manager.run_cycle()).await {
        Ok(Ok(Some(report))) if !report.is_empty() => {
            tracing::debug!(source, net = report.net(), "Triggered deployment cycle applied changes");
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::error!(source, error = %e, "Deployment cycle failed"),
        Err(e) => tracing::error!(source, error = %e, "Deployment cycle panicked"),
    }
}
