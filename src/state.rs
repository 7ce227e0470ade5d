//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use anyhow::Context;
use grouped_process_exporter::{GroupedProcCollector, HealthStats, ScrapeReport};
use prometheus::{Gauge, IntCounter, Registry};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Exporter self-metrics, registered only when telemetry is enabled.
pub struct Telemetry {
    pub scrape_duration: Gauge,
    pub collect_duration: Gauge,
    pub last_collect_success: Gauge,
    pub cycles_total: IntCounter,
    pub read_errors: Gauge,
    pub groups: Gauge,
}

impl Telemetry {
    pub fn new(registry: &Registry) -> anyhow::Result<Self> {
        let scrape_duration = Gauge::new(
            "grouped_process_exporter_scrape_duration_seconds",
            "Time spent serving the last metrics request, including collection",
        )?;
        let collect_duration = Gauge::new(
            "grouped_process_exporter_collect_duration_seconds",
            "Time spent in the last collection cycle",
        )?;
        let last_collect_success = Gauge::new(
            "grouped_process_exporter_last_collect_success",
            "Whether the last collection cycle completed (1) or was aborted (0)",
        )?;
        let cycles_total = IntCounter::new(
            "grouped_process_exporter_cycles_total",
            "Number of collection cycles run",
        )?;
        let read_errors = Gauge::new(
            "grouped_process_exporter_read_errors",
            "Per-process read failures in the last collection cycle",
        )?;
        let groups = Gauge::new(
            "grouped_process_exporter_groups",
            "Number of groups in the grouped table after the last cycle",
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(collect_duration.clone()))?;
        registry.register(Box::new(last_collect_success.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(read_errors.clone()))?;
        registry
            .register(Box::new(groups.clone()))
            .context("Failed to register telemetry metrics")?;

        Ok(Self {
            scrape_duration,
            collect_duration,
            last_collect_success,
            cycles_total,
            read_errors,
            groups,
        })
    }

    pub fn observe(&self, report: &ScrapeReport, table_len: usize) {
        self.collect_duration.set(report.collect_seconds);
        self.last_collect_success
            .set(if report.is_success() { 1.0 } else { 0.0 });
        self.cycles_total.inc();
        self.read_errors.set(report.read_errors as f64);
        self.groups.set(table_len as f64);
    }
}

/// Global application state shared across requests.
pub struct AppState {
    pub registry: Registry,
    pub collector: Arc<GroupedProcCollector>,
    pub telemetry: Option<Telemetry>,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
