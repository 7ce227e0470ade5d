//! Readers for the per-process records under the process root.
//!
//! This module provides:
//! - `stat`: scheduling statistics from /proc/<pid>/stat
//! - `io`: I/O accounting from /proc/<pid>/io
//! - `status`: registered process name from /proc/<pid>/status
//! - `scanner`: numeric PID discovery

pub mod io;
pub mod scanner;
pub mod stat;
pub mod status;

use once_cell::sync::Lazy;
use std::path::PathBuf;

pub use io::{read_proc_io, ProcIo};
pub use scanner::{collect_pids, ProcEntry};
pub use stat::{read_proc_stat, ProcStat};
pub use status::read_status_name;

/// Default process root.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Environment variable overriding the process root (used by fixtures).
pub const PROC_MOUNT_POINT_ENV: &str = "GROUPED_PROCESS_PROC_MOUNT_POINT";

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    100.0
}

fn get_page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        unsafe {
            let size = libc::sysconf(libc::_SC_PAGESIZE);
            if size > 0 {
                return size as u64;
            }
        }
    }
    4096
}

/// System clock ticks per second (for CPU time conversion).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Memory page size in bytes (for RSS conversion).
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

/// Resolves the process root: environment override first, then the configured value.
pub fn resolve_proc_root(configured: Option<&str>) -> PathBuf {
    match std::env::var(PROC_MOUNT_POINT_ENV) {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(configured.unwrap_or(DEFAULT_PROC_ROOT)),
    }
}
