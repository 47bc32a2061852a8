//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, body buffering)
//!     → request.rs (ServiceRequest, request ID)
//!     → routing::Router::dispatch (loopback.rs, encoding.rs)
//!     → response.rs (ServiceResponse → axum Response)
//!     → Send to client
//! ```

pub mod encoding;
pub mod loopback;
pub mod request;
pub mod response;
pub mod server;

pub use encoding::{BodyCodec, CodecRegistry};
pub use request::{ServiceRequest, UuidRequestId, X_REQUEST_ID};
pub use response::ServiceResponse;
pub use server::{AppState, NanoServer, ServerError};
