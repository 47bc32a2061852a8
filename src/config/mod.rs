//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) | flat properties (nanoservice* keys)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Directory values may be `file://` URIs or plain paths

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{from_properties, load_config, load_properties, ConfigError};
pub use schema::{AdminConfig, DeploymentConfig, ListenerConfig, ServiceConfig, TlsConfig};
pub use validation::resolve_location;
