//! Grouped Process Exporter Library
//!
//! Aggregates per-process kernel statistics into groups and exposes the sums
//! as Prometheus samples. A group is either a control group (one directory of
//! the cgroup hierarchy) or a process name from `/proc/<pid>/status`.
//!
//! # Features
//!
//! - **Grouping strategies**: cgroup hierarchy walk or process-name grouping,
//!   both with optional exclude and normalize patterns
//! - **Weighted admission**: directory inspections and per-process reads share
//!   one bounded limiter per cycle
//! - **Thread-safe accumulators**: concurrent folds into one group are serialized
//!   per metric kind
//!
//! # Usage
//!
//! ```rust,no_run
//! use grouped_process_exporter::{
//!     CollectorOptions, GroupType, GroupedProcCollector, Grouper, MetricKind,
//! };
//! use prometheus::Registry;
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut grouper = Grouper::new(
//!     GroupType::Cgroup,
//!     Path::new("/sys/fs/cgroup"),
//!     Path::new("/proc"),
//! );
//! grouper.set_normalize_regexp("^/system.slice/(.+)\\.service$")?;
//!
//! let registry = Registry::new();
//! let collector = GroupedProcCollector::new(
//!     grouper,
//!     [MetricKind::Stat].into_iter().collect(),
//!     &registry,
//!     CollectorOptions::default(),
//! )?;
//!
//! let report = collector.scrape().await;
//! println!("{} groups, {} processes", report.groups, report.processes);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod error;
pub mod grouped_proc;
pub mod grouper;
pub mod health_stats;
pub mod limiter;
pub mod metric;
pub mod procfs;

// Re-export main types for convenience
pub use collector::{CollectorOptions, GroupedProcCollector, ScrapeReport};
pub use error::{CollectError, ConfigError, EmitError, ReadError};
pub use grouped_proc::{EnabledMetrics, GroupedProc, GroupedProcs};
pub use grouper::{GroupType, Grouper};
pub use health_stats::HealthStats;
pub use limiter::WeightedLimiter;
pub use metric::{MetricKind, MetricSink};
