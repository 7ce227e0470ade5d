//! Grouping strategies: decide which processes belong to which group.
//!
//! This module provides:
//! - `cgroup`: groups by control-group path
//! - `proc_status_name`: groups by the process's registered name
//! - `filter`: exclude/normalize rules shared by both

pub mod cgroup;
pub mod filter;
pub mod proc_status_name;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{CollectError, ConfigError, ReadError};
use crate::grouped_proc::{EnabledMetrics, GroupedProcs};
use crate::limiter::WeightedLimiter;

pub use cgroup::Cgroup;
pub use filter::GroupFilter;
pub use proc_status_name::ProcStatusName;

/// Grouping type as given in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Cgroup,
    Name,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Cgroup => "cgroup",
            GroupType::Name => "name",
        }
    }
}

impl FromStr for GroupType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cgroup" => Ok(GroupType::Cgroup),
            "name" => Ok(GroupType::Name),
            other => Err(ConfigError::InvalidGroupType(other.to_string())),
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active grouping strategy, chosen once at startup.
#[derive(Debug, Clone)]
pub enum Grouper {
    Cgroup(Cgroup),
    ProcStatusName(ProcStatusName),
}

impl Grouper {
    pub fn new(group_type: GroupType, cgroup_root: &Path, proc_root: &Path) -> Self {
        match group_type {
            GroupType::Cgroup => Grouper::Cgroup(Cgroup::new(cgroup_root, proc_root)),
            GroupType::Name => Grouper::ProcStatusName(ProcStatusName::new(proc_root)),
        }
    }

    /// Value of the `grouper` label on every sample.
    pub fn name(&self) -> &'static str {
        match self {
            Grouper::Cgroup(g) => g.name(),
            Grouper::ProcStatusName(g) => g.name(),
        }
    }

    pub fn set_normalize_regexp(&mut self, pattern: &str) -> Result<(), ConfigError> {
        match self {
            Grouper::Cgroup(g) => g.set_normalize_regexp(pattern),
            Grouper::ProcStatusName(g) => g.set_normalize_regexp(pattern),
        }
    }

    pub fn set_exclude_regexp(&mut self, pattern: &str) -> Result<(), ConfigError> {
        match self {
            Grouper::Cgroup(g) => g.set_exclude_regexp(pattern),
            Grouper::ProcStatusName(g) => g.set_exclude_regexp(pattern),
        }
    }

    /// Performs one discovery-and-read cycle into `table`.
    ///
    /// Per-process and per-directory failures are absorbed and counted in the
    /// table's cycle stats. Only limiter failures are returned.
    pub async fn collect(
        &self,
        table: &Arc<GroupedProcs>,
        enabled: &EnabledMetrics,
        limiter: &WeightedLimiter,
    ) -> Result<(), CollectError> {
        match self {
            Grouper::Cgroup(g) => g.collect(table, enabled, limiter).await,
            Grouper::ProcStatusName(g) => g.collect(table, enabled, limiter).await,
        }
    }
}

/// A per-process read that was dropped from the cycle.
#[derive(Debug)]
pub struct ReadFailure {
    pub group: String,
    pub pid: u32,
    pub error: ReadError,
}

pub(crate) type Workers = JoinSet<Result<(), ReadFailure>>;

/// Waits for every spawned read and records the ones that failed.
pub(crate) async fn join_workers(workers: &mut Workers, table: &GroupedProcs) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                debug!(
                    "Dropping pid {} from group '{}': {}",
                    failure.pid, failure.group, failure.error
                );
                table.stats().record_read_error(&failure.error);
            }
            Err(e) => warn!("Process read worker failed: {}", e),
        }
    }
}
