//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every request runs one collection cycle. Cycles are serialized inside the
//! collector, so concurrent scrapes queue instead of double-counting.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing metrics request");

    let report = state.collector.scrape().await;
    state.health_stats.record_scrape(&report);
    if let Some(telemetry) = &state.telemetry {
        telemetry.observe(&report, state.collector.table().len());
    }

    let families = state.registry.gather();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    let request_duration = start.elapsed();
    state.health_stats.record_metrics_endpoint_call();
    state
        .health_stats
        .record_request_duration(request_duration.as_secs_f64() * 1000.0);
    state.health_stats.record_http_request();
    if let Some(telemetry) = &state.telemetry {
        // Visible on the next scrape.
        telemetry.scrape_duration.set(request_duration.as_secs_f64());
    }

    debug!(
        "Metrics request completed: {} groups, {} processes, {} bytes, {:.3}ms",
        report.groups,
        report.processes,
        buffer.len(),
        request_duration.as_secs_f64() * 1000.0
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}
