//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Deploy (plugin registration):
//!     Plugin::routes() → RouteDef[]
//!     → descriptor.rs compiles each (path.rs, query.rs, headers.rs, mime.rs)
//!     → cache.rs shares identical compiled matchers
//!     → router.rs swaps in a new table
//!
//! Dispatch (per request):
//!     ServiceRequest
//!     → router.rs: loopback / lifecycle gate / longest mount
//!     → first MethodDescriptor whose verb, path, Content-Type and Accept match
//!     → Handler → ServiceResponse
//! ```
//!
//! # Design Decisions
//! - Matchers are immutable; capture buffers belong to the call
//! - No regex in the hot path
//! - First match wins, in registration order

pub mod cache;
pub mod descriptor;
pub mod error;
pub mod headers;
pub mod mime;
pub mod path;
pub mod query;
pub mod router;

pub use descriptor::MethodDescriptor;
pub use error::{DispatchError, PatternError, RouterError};
pub use router::{MountInfo, Router};
