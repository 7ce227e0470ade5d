//! Process name lookup from `/proc/<pid>/status`.

use std::fs;
use std::path::Path;

use crate::error::ReadError;

/// Reads the registered name (`Name:` line) from `<proc_root>/<pid>/status`.
pub fn read_status_name(proc_root: &Path, pid: u32) -> Result<String, ReadError> {
    let path = proc_root.join(pid.to_string()).join("status");
    let content = fs::read_to_string(&path).map_err(|e| ReadError::io(&path, e))?;

    content
        .lines()
        .find_map(|line| line.strip_prefix("Name:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReadError::malformed(&path, "missing Name field"))
}
