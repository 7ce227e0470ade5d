//! I/O accounting totals sourced from `/proc/<pid>/io`.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::EmitError;
use crate::metric::sink::{MetricDesc, MetricSink};
use crate::procfs::ProcIo;

const RCHAR: &str = "grouped_process_io_rchar_bytes_total";
const WCHAR: &str = "grouped_process_io_wchar_bytes_total";
const SYSCR: &str = "grouped_process_io_syscr_total";
const SYSCW: &str = "grouped_process_io_syscw_total";
const READ_BYTES: &str = "grouped_process_io_read_bytes_total";
const WRITE_BYTES: &str = "grouped_process_io_write_bytes_total";
const CANCELLED_WRITE_BYTES: &str = "grouped_process_io_cancelled_write_bytes_total";

#[derive(Debug, Default)]
pub struct IoAccumulator {
    totals: Mutex<ProcIo>,
}

impl IoAccumulator {
    pub fn describe() -> BTreeMap<&'static str, MetricDesc> {
        [
            MetricDesc::counter(RCHAR, "Bytes the grouped processes read via syscalls"),
            MetricDesc::counter(WCHAR, "Bytes the grouped processes wrote via syscalls"),
            MetricDesc::counter(SYSCR, "Number of read syscalls of the grouped processes"),
            MetricDesc::counter(SYSCW, "Number of write syscalls of the grouped processes"),
            MetricDesc::counter(
                READ_BYTES,
                "Bytes the grouped processes caused to be fetched from storage",
            ),
            MetricDesc::counter(
                WRITE_BYTES,
                "Bytes the grouped processes caused to be sent to storage",
            ),
            MetricDesc::counter(
                CANCELLED_WRITE_BYTES,
                "Bytes the grouped processes caused not to be written by truncating pagecache",
            ),
        ]
        .into_iter()
        .map(|d| (d.name, d))
        .collect()
    }

    pub fn fold(&self, io: &ProcIo) {
        let mut t = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        t.rchar = t.rchar.saturating_add(io.rchar);
        t.wchar = t.wchar.saturating_add(io.wchar);
        t.syscr = t.syscr.saturating_add(io.syscr);
        t.syscw = t.syscw.saturating_add(io.syscw);
        t.read_bytes = t.read_bytes.saturating_add(io.read_bytes);
        t.write_bytes = t.write_bytes.saturating_add(io.write_bytes);
        t.cancelled_write_bytes = t
            .cancelled_write_bytes
            .saturating_add(io.cancelled_write_bytes);
    }

    pub fn reset(&self) {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner) = ProcIo::default();
    }

    pub fn totals(&self) -> ProcIo {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn emit(&self, sink: &MetricSink, grouper: &str, group: &str) -> Result<(), EmitError> {
        let t = self.totals();
        let labels = [grouper, group];

        sink.set(RCHAR, &labels, t.rchar as f64)?;
        sink.set(WCHAR, &labels, t.wchar as f64)?;
        sink.set(SYSCR, &labels, t.syscr as f64)?;
        sink.set(SYSCW, &labels, t.syscw as f64)?;
        sink.set(READ_BYTES, &labels, t.read_bytes as f64)?;
        sink.set(WRITE_BYTES, &labels, t.write_bytes as f64)?;
        sink.set(CANCELLED_WRITE_BYTES, &labels, t.cancelled_write_bytes as f64)?;
        Ok(())
    }
}
