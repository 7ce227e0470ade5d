//! Error types for grouping, collection and emission.
//!
//! Only configuration and admission failures are fatal; read and discovery
//! failures are absorbed where they happen and never leave the strategy.

use std::path::PathBuf;

/// Startup configuration failures. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid grouping type '{0}', expected 'cgroup' or 'name'")]
    InvalidGroupType(String),

    #[error("invalid regexp '{pattern}': {source}")]
    InvalidRegexp {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("number of parenthesized subexpressions in regexp '{pattern}' should be 1, got {found}")]
    InvalidPattern { pattern: String, found: usize },

    #[error("at least one of collect_stat/collect_io must be enabled")]
    NoMetricsEnabled,

    #[error("max_concurrency must be greater than 0")]
    InvalidConcurrency,
}

/// Failure of one process's statistics read. Dropped by the caller.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl ReadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the process is gone rather than unreadable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Failure that aborts the whole collection cycle.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to acquire {weight} units from the concurrency limiter: limiter closed")]
    Admission { weight: u32 },
}

/// Failure to write one group's samples for one metric kind.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("no descriptor registered for metric field '{0}'")]
    MissingDescriptor(String),

    #[error("failed to set sample for '{name}': {source}")]
    Prometheus {
        name: String,
        #[source]
        source: prometheus::Error,
    },
}
