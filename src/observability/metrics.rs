//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lapollo_fetch_total` (counter): requests to the config server by mode, outcome
//! - `lapollo_materialize_total` (counter): namespace file writes by outcome
//! - `lapollo_reload_total` (counter): environment rebuilds by process manager outcome
//!
//! # Design Decisions
//! - Recording is always on; without an installed recorder it is a no-op
//! - The Prometheus listener is opt-in (`observability.metrics_enabled`)

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// `mode` is `polling`, `notification` or `uncached`.
pub fn record_fetch(mode: &'static str, outcome: &'static str) {
    metrics::counter!("lapollo_fetch_total", "mode" => mode, "outcome" => outcome).increment(1);
}

pub fn record_materialize(success: bool) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!("lapollo_materialize_total", "outcome" => outcome).increment(1);
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("lapollo_reload_total", "outcome" => outcome).increment(1);
}
