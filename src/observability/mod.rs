//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router, deployment manager, transport produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the trace span of every HTTP request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
