//! CPU, memory and scheduling totals sourced from `/proc/<pid>/stat`.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::EmitError;
use crate::metric::sink::{MetricDesc, MetricSink};
use crate::procfs::{ProcStat, CLK_TCK, PAGE_SIZE};

const MINFLT: &str = "grouped_process_stat_minflt_total";
const CMINFLT: &str = "grouped_process_stat_cminflt_total";
const MAJFLT: &str = "grouped_process_stat_majflt_total";
const CMAJFLT: &str = "grouped_process_stat_cmajflt_total";
const UTIME: &str = "grouped_process_stat_utime_seconds_total";
const STIME: &str = "grouped_process_stat_stime_seconds_total";
const CUTIME: &str = "grouped_process_stat_cutime_seconds_total";
const CSTIME: &str = "grouped_process_stat_cstime_seconds_total";
const NUM_THREADS: &str = "grouped_process_stat_num_threads";
const VSIZE: &str = "grouped_process_stat_vsize_bytes";
const RSS: &str = "grouped_process_stat_rss_bytes";

/// Sum of stat counters over a group's member processes.
#[derive(Debug, Default)]
pub struct StatAccumulator {
    totals: Mutex<ProcStat>,
}

impl StatAccumulator {
    pub fn describe() -> BTreeMap<&'static str, MetricDesc> {
        [
            MetricDesc::counter(MINFLT, "Number of minor faults of the grouped processes"),
            MetricDesc::counter(
                CMINFLT,
                "Number of minor faults of the waited-for children of the grouped processes",
            ),
            MetricDesc::counter(MAJFLT, "Number of major faults of the grouped processes"),
            MetricDesc::counter(
                CMAJFLT,
                "Number of major faults of the waited-for children of the grouped processes",
            ),
            MetricDesc::counter(UTIME, "Time the grouped processes spent in user mode"),
            MetricDesc::counter(STIME, "Time the grouped processes spent in kernel mode"),
            MetricDesc::counter(
                CUTIME,
                "Time waited-for children of the grouped processes spent in user mode",
            ),
            MetricDesc::counter(
                CSTIME,
                "Time waited-for children of the grouped processes spent in kernel mode",
            ),
            MetricDesc::gauge(NUM_THREADS, "Number of threads in the grouped processes"),
            MetricDesc::gauge(VSIZE, "Virtual memory size of the grouped processes in bytes"),
            MetricDesc::gauge(RSS, "Resident set size of the grouped processes in bytes"),
        ]
        .into_iter()
        .map(|d| (d.name, d))
        .collect()
    }

    pub fn fold(&self, stat: &ProcStat) {
        let mut t = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        t.minflt = t.minflt.saturating_add(stat.minflt);
        t.cminflt = t.cminflt.saturating_add(stat.cminflt);
        t.majflt = t.majflt.saturating_add(stat.majflt);
        t.cmajflt = t.cmajflt.saturating_add(stat.cmajflt);
        t.utime = t.utime.saturating_add(stat.utime);
        t.stime = t.stime.saturating_add(stat.stime);
        t.cutime = t.cutime.saturating_add(stat.cutime);
        t.cstime = t.cstime.saturating_add(stat.cstime);
        t.num_threads = t.num_threads.saturating_add(stat.num_threads);
        t.vsize = t.vsize.saturating_add(stat.vsize);
        t.rss = t.rss.saturating_add(stat.rss);
    }

    pub fn reset(&self) {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner) = ProcStat::default();
    }

    pub fn totals(&self) -> ProcStat {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn emit(&self, sink: &MetricSink, grouper: &str, group: &str) -> Result<(), EmitError> {
        let t = self.totals();
        let labels = [grouper, group];
        let seconds = |ticks: u64| ticks as f64 / *CLK_TCK;

        sink.set(MINFLT, &labels, t.minflt as f64)?;
        sink.set(CMINFLT, &labels, t.cminflt as f64)?;
        sink.set(MAJFLT, &labels, t.majflt as f64)?;
        sink.set(CMAJFLT, &labels, t.cmajflt as f64)?;
        sink.set(UTIME, &labels, seconds(t.utime))?;
        sink.set(STIME, &labels, seconds(t.stime))?;
        sink.set(CUTIME, &labels, seconds(t.cutime))?;
        sink.set(CSTIME, &labels, seconds(t.cstime))?;
        sink.set(NUM_THREADS, &labels, t.num_threads as f64)?;
        sink.set(VSIZE, &labels, t.vsize as f64)?;
        sink.set(RSS, &labels, t.rss.saturating_mul(*PAGE_SIZE) as f64)?;
        Ok(())
    }
}
