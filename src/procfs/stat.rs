//! Scheduling statistics parsing from `/proc/<pid>/stat`.

use std::fs;
use std::path::Path;

use crate::error::ReadError;

/// Counters taken from one process's stat record.
///
/// Times are in clock ticks, `rss` is in pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcStat {
    pub minflt: u64,
    pub cminflt: u64,
    pub majflt: u64,
    pub cmajflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub cutime: u64,
    pub cstime: u64,
    pub num_threads: u64,
    pub vsize: u64,
    pub rss: u64,
}

/// Reads `<proc_root>/<pid>/stat`.
pub fn read_proc_stat(proc_root: &Path, pid: u32) -> Result<ProcStat, ReadError> {
    let path = proc_root.join(pid.to_string()).join("stat");
    let content = fs::read_to_string(&path).map_err(|e| ReadError::io(&path, e))?;
    parse_proc_stat(&content).map_err(|reason| ReadError::malformed(&path, reason))
}

/// Parses the contents of a stat record.
///
/// The command name may contain spaces and parentheses, so fields are counted
/// from the last `)`. After it, index 0 is the state (kernel field 3).
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, String> {
    let rest = content
        .rfind(')')
        .map(|i| &content[i + 1..])
        .ok_or_else(|| "missing command name".to_string())?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 22 {
        return Err(format!("expected at least 22 fields after comm, got {}", fields.len()));
    }

    // Kernel field N lives at index N - 3.
    let field = |n: usize| -> Result<u64, String> {
        let raw = fields[n - 3];
        raw.parse::<u64>()
            .or_else(|_| raw.parse::<i64>().map(|v| v.max(0) as u64))
            .map_err(|_| format!("field {} is not numeric: '{}'", n, raw))
    };

    Ok(ProcStat {
        minflt: field(10)?,
        cminflt: field(11)?,
        majflt: field(12)?,
        cmajflt: field(13)?,
        utime: field(14)?,
        stime: field(15)?,
        cutime: field(16)?,
        cstime: field(17)?,
        num_threads: field(20)?,
        vsize: field(23)?,
        rss: field(24)?,
    })
}
