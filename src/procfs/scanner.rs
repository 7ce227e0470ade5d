//! Process discovery: numeric entries directly under the process root.

use std::fs;
use std::path::Path;
use tracing::debug;

/// Process entry representing a directory in the process root.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
}

/// Scans the process root for numeric PID directories.
/// An unreadable root yields no entries.
pub fn collect_pids(root: &Path) -> Vec<ProcEntry> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Failed to read process root {}: {}", root.display(), e);
            return out;
        }
    };

    for entry in entries.flatten() {
        let p = entry.path();
        let name = match p.file_name().and_then(|s| s.to_str()) {
            Some(v) => v,
            None => continue,
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let pid: u32 = match name.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        out.push(ProcEntry { pid });
    }
    out
}
