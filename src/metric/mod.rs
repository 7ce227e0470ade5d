//! Per-group metric accumulators and their exposition descriptors.
//!
//! Each metric kind knows how to read its raw record for one PID, fold that
//! reading into a group total, and write the totals into a [`MetricSink`]
//! labelled by grouper and group name.

pub mod io;
pub mod sink;
pub mod stat;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{EmitError, ReadError};
use crate::procfs::{read_proc_io, read_proc_stat, ProcIo, ProcStat};

pub use io::IoAccumulator;
pub use sink::{MetricDesc, MetricSink, ValueType, GROUP_LABELS};
pub use stat::StatAccumulator;

/// Metric family name prefix.
pub const NAMESPACE: &str = "grouped_process";

/// Statistic source that can be enabled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// `/proc/<pid>/stat`
    Stat,
    /// `/proc/<pid>/io`
    Io,
}

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::Stat, MetricKind::Io];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Stat => "stat",
            MetricKind::Io => "io",
        }
    }

    /// Reads this kind's raw record for one process.
    pub fn read(&self, proc_root: &Path, pid: u32) -> Result<Reading, ReadError> {
        match self {
            MetricKind::Stat => read_proc_stat(proc_root, pid).map(Reading::Stat),
            MetricKind::Io => read_proc_io(proc_root, pid).map(Reading::Io),
        }
    }

    pub fn new_accumulator(&self) -> Accumulator {
        match self {
            MetricKind::Stat => Accumulator::Stat(StatAccumulator::default()),
            MetricKind::Io => Accumulator::Io(IoAccumulator::default()),
        }
    }

    /// Descriptors for every sample this kind emits, keyed by metric name.
    pub fn describe(&self) -> BTreeMap<&'static str, MetricDesc> {
        match self {
            MetricKind::Stat => StatAccumulator::describe(),
            MetricKind::Io => IoAccumulator::describe(),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One process's raw reading for one metric kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Stat(ProcStat),
    Io(ProcIo),
}

impl Reading {
    pub fn kind(&self) -> MetricKind {
        match self {
            Reading::Stat(_) => MetricKind::Stat,
            Reading::Io(_) => MetricKind::Io,
        }
    }
}

/// Running group total for one metric kind.
#[derive(Debug)]
pub enum Accumulator {
    Stat(StatAccumulator),
    Io(IoAccumulator),
}

impl Accumulator {
    pub fn kind(&self) -> MetricKind {
        match self {
            Accumulator::Stat(_) => MetricKind::Stat,
            Accumulator::Io(_) => MetricKind::Io,
        }
    }

    /// Adds one reading into the totals. Readings of another kind are ignored.
    pub fn fold(&self, reading: &Reading) {
        match (self, reading) {
            (Accumulator::Stat(acc), Reading::Stat(stat)) => acc.fold(stat),
            (Accumulator::Io(acc), Reading::Io(io)) => acc.fold(io),
            _ => {}
        }
    }

    pub fn reset(&self) {
        match self {
            Accumulator::Stat(acc) => acc.reset(),
            Accumulator::Io(acc) => acc.reset(),
        }
    }

    pub fn emit(&self, sink: &MetricSink, grouper: &str, group: &str) -> Result<(), EmitError> {
        match self {
            Accumulator::Stat(acc) => acc.emit(sink, grouper, group),
            Accumulator::Io(acc) => acc.emit(sink, grouper, group),
        }
    }
}
