//! Start / suspend / resume / stop state machine guarding dispatch.
//!
//! # Design Decisions
//! - Transitions take a mutex so two callers cannot race `start()`/`stop()`
//! - `is_started()`/`is_suspended()` read atomics and never take the lock
//! - A stopped service can be started again

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

/// Rejected lifecycle transition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Service is already started")]
    AlreadyStarted,

    #[error("Service is not started yet")]
    NotStarted,

    #[error("Service is already suspended")]
    AlreadySuspended,

    #[error("Service is still running")]
    NotSuspended,

    #[error("Service is already stopped")]
    AlreadyStopped,

    #[error("Service is stopped")]
    Stopped,
}

/// Observable state, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Running,
    Suspended,
}

/// Lifecycle flags shared by the router and the operator surface.
#[derive(Debug, Default)]
pub struct ServiceLifecycle {
    transition: Mutex<()>,
    started: AtomicBool,
    suspended: AtomicBool,
    // Distinguishes "never started" from "stopped" in error reports.
    has_run: AtomicBool,
}

impl ServiceLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Result<(), LifecycleError> {
        let _guard = self.lock();
        if self.started.load(Ordering::Acquire) {
            return Err(LifecycleError::AlreadyStarted);
        }
        self.suspended.store(false, Ordering::Release);
        self.has_run.store(true, Ordering::Release);
        self.started.store(true, Ordering::Release);
        tracing::info!("Service started");
        Ok(())
    }

    pub fn suspend(&self) -> Result<(), LifecycleError> {
        let _guard = self.lock();
        self.require_started()?;
        if self.suspended.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::AlreadySuspended);
        }
        tracing::info!("Service suspended");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), LifecycleError> {
        let _guard = self.lock();
        self.require_started()?;
        if !self.suspended.swap(false, Ordering::AcqRel) {
            return Err(LifecycleError::NotSuspended);
        }
        tracing::info!("Service resumed");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), LifecycleError> {
        let _guard = self.lock();
        if !self.started.load(Ordering::Acquire) {
            return Err(LifecycleError::AlreadyStopped);
        }
        self.started.store(false, Ordering::Release);
        self.suspended.store(false, Ordering::Release);
        tracing::info!("Service stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// True when requests may be dispatched.
    pub fn is_serving(&self) -> bool {
        self.is_started() && !self.is_suspended()
    }

    pub fn state(&self) -> ServiceState {
        match (self.is_started(), self.is_suspended()) {
            (false, _) => ServiceState::Stopped,
            (true, false) => ServiceState::Running,
            (true, true) => ServiceState::Suspended,
        }
    }

    fn require_started(&self) -> Result<(), LifecycleError> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else if self.has_run.load(Ordering::Acquire) {
            Err(LifecycleError::Stopped)
        } else {
            Err(LifecycleError::NotStarted)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
