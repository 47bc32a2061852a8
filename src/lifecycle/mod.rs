//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Service state (state.rs):
//!     Stopped → start() → Running ⇄ suspend()/resume() ⇄ Suspended
//!     Running | Suspended → stop() → Stopped
//!     Router reads the flags on every dispatch
//!
//! Process shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger → listeners drain, deploy loops exit
//! ```

pub mod shutdown;
pub mod state;

pub use shutdown::{listen_for_signals, Shutdown};
pub use state::{LifecycleError, ServiceLifecycle, ServiceState};
