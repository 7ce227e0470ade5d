//! I/O accounting parsing from `/proc/<pid>/io`.
//! Note: reading another user's io record requires root or CAP_SYS_PTRACE.

use std::fs;
use std::path::Path;

use crate::error::ReadError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcIo {
    pub rchar: u64,
    pub wchar: u64,
    pub syscr: u64,
    pub syscw: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub cancelled_write_bytes: u64,
}

/// Reads `<proc_root>/<pid>/io`.
pub fn read_proc_io(proc_root: &Path, pid: u32) -> Result<ProcIo, ReadError> {
    let path = proc_root.join(pid.to_string()).join("io");
    let content = fs::read_to_string(&path).map_err(|e| ReadError::io(&path, e))?;
    parse_proc_io(&content).map_err(|reason| ReadError::malformed(&path, reason))
}

pub fn parse_proc_io(content: &str) -> Result<ProcIo, String> {
    let mut io = ProcIo::default();
    let mut seen = 0usize;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key.trim() {
            "rchar" => &mut io.rchar,
            "wchar" => &mut io.wchar,
            "syscr" => &mut io.syscr,
            "syscw" => &mut io.syscw,
            "read_bytes" => &mut io.read_bytes,
            "write_bytes" => &mut io.write_bytes,
            "cancelled_write_bytes" => &mut io.cancelled_write_bytes,
            _ => continue,
        };
        *slot = value
            .trim()
            .parse()
            .map_err(|_| format!("{} is not numeric: '{}'", key.trim(), value.trim()))?;
        seen += 1;
    }

    if seen == 0 {
        return Err("no io fields found".to_string());
    }
    Ok(io)
}
