//! Metrics collection and exposition.
//!
//! # Metrics
//! - `contract_host_requests_total` (counter): requests by method, status
//! - `contract_host_request_duration_seconds` (histogram): dispatch latency
//! - `contract_host_inflight_requests` (gauge): requests being dispatched
//! - `contract_host_open_connections` (gauge): accepted connections still open
//! - `contract_host_transport_faults_total` (counter): accept failures
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter serves its own HTTP endpoint

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(error) => tracing::error!(address = %addr, error = %error, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_owned()),
        ("status", status.to_string()),
    ];
    metrics::counter!("contract_host_requests_total", &labels).increment(1);
    metrics::histogram!("contract_host_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_inflight(count: usize) {
    metrics::gauge!("contract_host_inflight_requests").set(count as f64);
}

pub fn record_open_connections(count: usize) {
    metrics::gauge!("contract_host_open_connections").set(count as f64);
}

pub fn record_transport_fault() {
    metrics::counter!("contract_host_transport_faults_total").increment(1);
}
