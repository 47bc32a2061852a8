//! Hot deployment subsystem.
//!
//! # Data Flow
//! ```text
//! trigger.rs (timer | filesystem events | operator)
//!     → manager.rs run_cycle()
//!         → snapshot.rs scan(root) → diff(old, new) → {path: deploy|undeploy|redeploy}
//!         → loader.rs builds a DeploymentDesc per deploy/redeploy unit
//!         → Router::undeploy for undeploy/redeploy units
//!         → Router::deploy for every plugin of every loaded unit
//!     → CycleReport (net change)
//! ```
//!
//! # Design Decisions
//! - Units are TOML documents (`*.unit`) or tar archives of them (`*.tar`)
//! - A unit names a plugin symbol; compiled-in factories are found in the
//!   `HandlerCatalog`, anything else is defined by the unit itself
//! - Failures are unit-scoped: one bad unit never blocks the rest of a cycle
//! - Cycles never overlap; a cycle requested while one runs is skipped

pub mod loader;
pub mod manager;
pub mod snapshot;
pub mod trigger;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use loader::{DeploymentDesc, UnitLoader};
pub use manager::{CycleReport, DeploymentManager};
pub use snapshot::{DeploymentMode, DeploymentSnapshot, UnitKind};

/// Deployment failures. Scan errors fail a whole cycle; everything else is
/// scoped to one unit.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Deployment directory [{0}] does not exist or is not a directory")]
    MissingDirectory(PathBuf),

    #[error("Failed to scan deployment directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error on [{path}]: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unit [{unit}] is malformed: {message}")]
    InvalidUnit { unit: String, message: String },

    #[error("Unit [{unit}] references unknown symbol [{symbol}]")]
    UnknownSymbol { unit: String, symbol: String },

    #[error("Symbol [{symbol}] is already defined in this cycle (unit [{unit}])")]
    DuplicateSymbol { unit: String, symbol: String },

    #[error("Archive [{0}] contains no deployable units")]
    EmptyArchive(String),
}
