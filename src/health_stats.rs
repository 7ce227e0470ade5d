//! Health statistics for the exporter.
//!
//! Tracks collection cycle performance, tolerated per-cycle failures and HTTP
//! request metrics, and renders them as the plain-text `/health` table.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use crate::collector::ScrapeReport;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns (last, avg, max, min, count).
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Request timestamps of the last ten minutes.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            while guard
                .front()
                .is_some_and(|&t| now.duration_since(t) > Duration::from_secs(600))
            {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            let now = Instant::now();
            guard
                .iter()
                .filter(|&&t| now.duration_since(t) <= Duration::from_secs(60))
                .count() as u64
        } else {
            0
        }
    }
}

/// Exporter health statistics, updated after every scrape.
pub struct HealthStats {
    // Cycle performance
    pub collected_groups: Stat,
    pub collected_processes: Stat,
    pub cycle_duration_seconds: Stat,
    pub total_cycles: AtomicU64,
    pub cycle_success_count: AtomicU64,
    pub cycle_failure_count: AtomicU64,

    // Tolerated failures, summed over all cycles
    pub read_errors: AtomicU64,
    pub vanished_processes: AtomicU64,
    pub discovery_errors: AtomicU64,
    pub malformed_lines: AtomicU64,
    pub emit_errors: AtomicU64,
    pub evicted_groups: AtomicU64,

    // HTTP server stats
    pub http_request_timestamps: RequestTimestamps,
    pub request_duration_ms: Stat,
    pub metrics_endpoint_calls: AtomicU64,

    pub start_time: Instant,
    pub last_cycle_time: StdRwLock<Option<Instant>>,
    pub last_cycle_error: StdRwLock<Option<String>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            collected_groups: Stat::default(),
            collected_processes: Stat::default(),
            cycle_duration_seconds: Stat::default(),
            total_cycles: AtomicU64::new(0),
            cycle_success_count: AtomicU64::new(0),
            cycle_failure_count: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            vanished_processes: AtomicU64::new(0),
            discovery_errors: AtomicU64::new(0),
            malformed_lines: AtomicU64::new(0),
            emit_errors: AtomicU64::new(0),
            evicted_groups: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            request_duration_ms: Stat::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_cycle_time: StdRwLock::new(None),
            last_cycle_error: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Folds one scrape outcome into the running statistics.
    pub fn record_scrape(&self, report: &ScrapeReport) {
        self.collected_groups.add_sample(report.groups as f64);
        self.collected_processes.add_sample(report.processes as f64);
        self.cycle_duration_seconds.add_sample(report.collect_seconds);
        self.total_cycles.fetch_add(1, Ordering::Relaxed);

        if report.is_success() {
            self.cycle_success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cycle_failure_count.fetch_add(1, Ordering::Relaxed);
        }

        self.read_errors
            .fetch_add(report.read_errors, Ordering::Relaxed);
        self.vanished_processes
            .fetch_add(report.vanished_processes, Ordering::Relaxed);
        self.discovery_errors
            .fetch_add(report.discovery_errors, Ordering::Relaxed);
        self.malformed_lines
            .fetch_add(report.malformed_lines, Ordering::Relaxed);
        self.emit_errors
            .fetch_add(report.emit_errors, Ordering::Relaxed);
        self.evicted_groups
            .fetch_add(report.evicted as u64, Ordering::Relaxed);

        if let Ok(mut guard) = self.last_cycle_time.write() {
            *guard = Some(Instant::now());
        }
        if let Ok(mut guard) = self.last_cycle_error.write() {
            *guard = report.collect_error.clone();
        }
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_request_duration(&self, duration_ms: f64) {
        self.request_duration_ms.add_sample(duration_ms);
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// True until a cycle has failed; reset by the next successful one.
    pub fn last_cycle_ok(&self) -> bool {
        self.last_cycle_error
            .read()
            .map(|guard| guard.is_none())
            .unwrap_or(false)
    }

    pub fn last_cycle_error(&self) -> Option<String> {
        self.last_cycle_error
            .read()
            .ok()
            .and_then(|guard| guard.clone())
    }

    pub fn get_cycle_success_rate(&self) -> f64 {
        let success = self.cycle_success_count.load(Ordering::Relaxed);
        let failure = self.cycle_failure_count.load(Ordering::Relaxed);
        let total = success + failure;
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Seconds since the last finished cycle, or "N/A".
    pub fn get_last_cycle_age_str(&self) -> String {
        match self.last_cycle_time.read().ok().and_then(|guard| *guard) {
            Some(t) => format!("{:.1}s ago", t.elapsed().as_secs_f64()),
            None => "N/A".to_string(),
        }
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;
        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "CYCLE PERFORMANCE").ok();
        writeln!(out, "-----------------").ok();

        let rows: [(&str, &Stat, usize); 4] = [
            ("groups", &self.collected_groups, 0),
            ("processes", &self.collected_processes, 0),
            ("cycle_duration (s)", &self.cycle_duration_seconds, 3),
            ("request_duration (ms)", &self.request_duration_ms, 2),
        ];
        for (label, stat, precision) in rows {
            let (cur, avg, max, min, _) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.p$}", cur, p = precision),
                format!("{:.p$}", avg, p = precision.max(1)),
                format!("{:.p$}", max, p = precision),
                format!("{:.p$}", min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "COUNTERS").ok();
        writeln!(out, "--------").ok();

        let counters: [(&str, u64); 9] = [
            ("total_cycles", self.total_cycles.load(Ordering::Relaxed)),
            ("failed_cycles", self.cycle_failure_count.load(Ordering::Relaxed)),
            ("read_errors", self.read_errors.load(Ordering::Relaxed)),
            ("vanished_processes", self.vanished_processes.load(Ordering::Relaxed)),
            ("discovery_errors", self.discovery_errors.load(Ordering::Relaxed)),
            ("malformed_lines", self.malformed_lines.load(Ordering::Relaxed)),
            ("emit_errors", self.emit_errors.load(Ordering::Relaxed)),
            ("evicted_groups", self.evicted_groups.load(Ordering::Relaxed)),
            ("metrics_calls", self.metrics_endpoint_calls.load(Ordering::Relaxed)),
        ];
        for (label, value) in counters {
            writeln!(out, "{:left$} | {:>col$}", label, value, left = left_col, col = col_w).ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "cycle_success_rate: {:.1}%",
            self.get_cycle_success_rate()
        )
        .ok();
        writeln!(
            out,
            "http_requests_last_minute: {}",
            self.http_request_timestamps.count_last_minute()
        )
        .ok();
        writeln!(out, "last_cycle: {}", self.get_last_cycle_age_str()).ok();
        if let Some(err) = self.last_cycle_error() {
            writeln!(out, "last_cycle_error: {}", err).ok();
        }
        out
    }
}
