//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with the available endpoints.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");

    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let metrics_path = state.config.metrics_path();
    let grouper = state.collector.grouper().name();
    let kinds = state
        .collector
        .enabled()
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let health_item = if state.config.enable_health.unwrap_or(true) {
        r#"<li><a href="/health">/health</a> <span class="desc">Exporter internal health statistics (text)</span></li>"#
    } else {
        ""
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Grouped Process Exporter</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 20px; line-height: 1.6; }}
        h1 {{ border-bottom: 3px solid #007bff; padding-bottom: 10px; }}
        .desc {{ color: #666; }}
        code {{ background: #e9ecef; padding: 2px 6px; border-radius: 3px; }}
    </style>
</head>
<body>
    <h1>Grouped Process Exporter</h1>
    <p>Version <code>{version}</code>, up {uptime}</p>
    <p>Grouping by <code>{grouper}</code>, collecting <code>{kinds}</code></p>
    <ul>
        <li><a href="{metrics_path}">{metrics_path}</a> <span class="desc">Prometheus metrics</span></li>
        {health_item}
    </ul>
</body>
</html>"#,
        version = version,
        uptime = uptime_str,
        grouper = grouper,
        kinds = kinds,
        metrics_path = metrics_path,
        health_item = health_item,
    );

    Html(html)
}
