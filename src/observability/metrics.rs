//! Metrics collection and exposition.
//!
//! # Metrics
//! - `nanoservice_requests_total` (counter): dispatched requests by verb, status
//! - `nanoservice_request_duration_seconds` (histogram): dispatch latency
//! - `nanoservice_mounts` (gauge): active mount paths
//! - `nanoservice_deploy_cycles_total` (counter): deployment cycles by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which keeps tests and embedders quiet
//! - The Prometheus exporter runs its own scrape listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::plugin::Verb;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Record one dispatched request. Methods outside `Verb` are labelled
/// `other`, so clients cannot grow the label set.
pub fn record_request(verb: Option<Verb>, status: u16, start: Instant) {
    let verb = verb_label(verb);
    let status = status.to_string();
    counter!("nanoservice_requests_total", "verb" => verb, "status" => status.clone()).increment(1);
    histogram!("nanoservice_request_duration_seconds", "verb" => verb, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

fn verb_label(verb: Option<Verb>) -> &'static str {
    verb.map(|v| v.as_str()).unwrap_or("other")
}

/// Publish the number of active mounts.
pub fn set_mounts(count: usize) {
    gauge!("nanoservice_mounts").set(count as f64);
}

/// Record one deployment cycle. `outcome` is `changed`, `unchanged`,
/// `failed` or `skipped`.
pub fn record_deploy_cycle(outcome: &'static str) {
    counter!("nanoservice_deploy_cycles_total", "outcome" => outcome).increment(1);
}
