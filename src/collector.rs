//! Scrape cycle orchestration: collect into the grouped table, then emit.
//!
//! Cycles are serialized here; a second scrape waits for the first one to
//! finish instead of folding into the same accumulators twice.

use prometheus::Registry;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{CollectError, EmitError};
use crate::grouped_proc::{EnabledMetrics, GroupedProcs};
use crate::grouper::Grouper;
use crate::limiter::WeightedLimiter;
use crate::metric::{MetricDesc, MetricSink, ValueType};

const NUM_PROCS: &str = "grouped_process_num_procs";
const NUM_GROUPED: &str = "grouped_process_num_grouped";

/// Default limiter capacity per cycle.
pub const DEFAULT_MAX_CONCURRENCY: u32 = 256;

/// Exporter-level descriptors that do not belong to a metric kind.
pub fn base_descriptors() -> [MetricDesc; 2] {
    [
        MetricDesc::gauge(NUM_PROCS, "Number of processes in the group"),
        MetricDesc {
            name: NUM_GROUPED,
            help: "Number of groups",
            value_type: ValueType::Gauge,
            labels: &["grouper"],
        },
    ]
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorOptions {
    pub max_concurrency: u32,
    pub evict_stale_groups: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            evict_stale_groups: true,
        }
    }
}

/// Outcome of one collect + emit pass.
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    pub groups: usize,
    pub processes: u64,
    pub read_errors: u64,
    pub vanished_processes: u64,
    pub discovery_errors: u64,
    pub malformed_lines: u64,
    pub emit_errors: u64,
    pub evicted: usize,
    pub collect_seconds: f64,
    pub collect_error: Option<String>,
}

impl ScrapeReport {
    pub fn is_success(&self) -> bool {
        self.collect_error.is_none()
    }
}

pub struct GroupedProcCollector {
    table: Arc<GroupedProcs>,
    enabled: EnabledMetrics,
    grouper: Grouper,
    sink: MetricSink,
    options: CollectorOptions,
    cycle: tokio::sync::Mutex<()>,
    current: Mutex<Option<WeightedLimiter>>,
    shutdown: Mutex<bool>,
}

impl GroupedProcCollector {
    /// Describes every enabled kind once and registers the descriptors.
    pub fn new(
        grouper: Grouper,
        enabled: EnabledMetrics,
        registry: &Registry,
        options: CollectorOptions,
    ) -> prometheus::Result<Self> {
        let mut descs: Vec<MetricDesc> = base_descriptors().to_vec();
        for kind in &enabled {
            let kind_descs = kind.describe();
            debug!("Describing {} metric kind ({} fields)", kind, kind_descs.len());
            descs.extend(kind_descs.into_values());
        }
        let sink = MetricSink::register(registry, descs.iter())?;
        debug!("Registered {} metric families", sink.family_count());

        Ok(Self {
            table: Arc::new(GroupedProcs::new()),
            enabled,
            grouper,
            sink,
            options,
            cycle: tokio::sync::Mutex::new(()),
            current: Mutex::new(None),
            shutdown: Mutex::new(false),
        })
    }

    pub fn grouper(&self) -> &Grouper {
        &self.grouper
    }

    pub fn enabled(&self) -> &EnabledMetrics {
        &self.enabled
    }

    pub fn table(&self) -> &Arc<GroupedProcs> {
        &self.table
    }

    /// Runs one collection cycle without emitting.
    pub async fn collect(&self) -> Result<(), CollectError> {
        let _cycle = self.cycle.lock().await;
        self.collect_locked().await
    }

    /// Runs a full cycle: collect, emit and publish, evict.
    #[instrument(skip(self), fields(grouper = self.grouper.name()))]
    pub async fn scrape(&self) -> ScrapeReport {
        let _cycle = self.cycle.lock().await;
        let start = Instant::now();

        let collect_error = match self.collect_locked().await {
            Ok(()) => None,
            Err(e) => {
                warn!("Collection cycle aborted: {}", e);
                Some(e.to_string())
            }
        };
        let collect_seconds = start.elapsed().as_secs_f64();

        let (groups, processes, emit_errors) = self.emit();
        // An aborted walk never reached every group, so nothing is evicted.
        let evicted = if collect_error.is_none() && self.options.evict_stale_groups {
            self.table.evict_absent()
        } else {
            0
        };

        let stats = self.table.stats();
        let report = ScrapeReport {
            groups,
            processes,
            read_errors: stats.read_errors.load(Ordering::Relaxed),
            vanished_processes: stats.vanished_processes.load(Ordering::Relaxed),
            discovery_errors: stats.discovery_errors.load(Ordering::Relaxed),
            malformed_lines: stats.malformed_lines.load(Ordering::Relaxed),
            emit_errors,
            evicted,
            collect_seconds,
            collect_error,
        };
        debug!(
            "Scrape finished: {} groups, {} processes, {} read errors, {} evicted in {:.3}s",
            report.groups, report.processes, report.read_errors, report.evicted, collect_seconds
        );
        report
    }

    async fn collect_locked(&self) -> Result<(), CollectError> {
        let limiter = WeightedLimiter::new(self.options.max_concurrency);
        {
            let shutdown = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
            if *shutdown {
                limiter.cancel();
            }
            *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(limiter.clone());
        }

        self.table.begin_cycle();
        let result = self
            .grouper
            .collect(&self.table, &self.enabled, &limiter)
            .await;

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        result
    }

    /// Stages every live group in the sink, then publishes the whole set.
    /// Returns (groups, processes, emit errors).
    fn emit(&self) -> (usize, u64, u64) {
        self.sink.reset();
        let grouper = self.grouper.name();
        let mut groups = 0usize;
        let mut processes = 0u64;
        let mut errors = 0u64;

        for (name, gproc) in self.table.snapshot() {
            if !gproc.exists() {
                continue;
            }
            groups += 1;
            processes += gproc.num_procs();

            if let Err(e) = self
                .sink
                .set(NUM_PROCS, &[grouper, &name], gproc.num_procs() as f64)
            {
                log_emit_error(&name, "num_procs", &e);
                errors += 1;
            }
            for acc in gproc.accumulators() {
                if let Err(e) = acc.emit(&self.sink, grouper, &name) {
                    log_emit_error(&name, acc.kind().as_str(), &e);
                    errors += 1;
                }
            }
        }

        if let Err(e) = self.sink.set(NUM_GROUPED, &[grouper], groups as f64) {
            log_emit_error("*", "num_grouped", &e);
            errors += 1;
        }
        self.sink.publish();
        (groups, processes, errors)
    }

    /// Cancels the in-flight cycle and every later one.
    pub fn shutdown(&self) {
        *self.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = true;
        if let Some(limiter) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            info!("Cancelling in-flight collection cycle");
            limiter.cancel();
        }
    }
}

fn log_emit_error(group: &str, kind: &str, e: &EmitError) {
    warn!("Skipping {} samples for group '{}': {}", kind, group, e);
}
