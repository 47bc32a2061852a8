//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig.tls
//!     → tls.rs (resolve keystore/truststore, parse PEM)
//!     → RustlsConfig
//!     → http::server binds with axum-server
//! ```
//!
//! # Design Decisions
//! - TLS is optional; plain TCP goes through `axum::serve`
//! - Key material is validated up front so startup fails fast

pub mod tls;

pub use tls::{load_tls_config, TlsError};
