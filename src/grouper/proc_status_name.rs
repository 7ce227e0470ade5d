//! Grouping by the process's registered name (`Name:` in `/proc/<pid>/status`).

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{CollectError, ConfigError};
use crate::grouped_proc::{EnabledMetrics, GroupedProc, GroupedProcs};
use crate::grouper::filter::GroupFilter;
use crate::grouper::{join_workers, ReadFailure};
use crate::limiter::WeightedLimiter;
use crate::procfs::{collect_pids, read_status_name};

#[derive(Debug, Clone)]
pub struct ProcStatusName {
    proc_root: Arc<PathBuf>,
    filter: Arc<GroupFilter>,
}

impl ProcStatusName {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: Arc::new(proc_root.into()),
            filter: Arc::new(GroupFilter::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        "proc_status_name"
    }

    pub fn set_normalize_regexp(&mut self, pattern: &str) -> Result<(), ConfigError> {
        Arc::make_mut(&mut self.filter).set_normalize_regexp(pattern)
    }

    pub fn set_exclude_regexp(&mut self, pattern: &str) -> Result<(), ConfigError> {
        Arc::make_mut(&mut self.filter).set_exclude_regexp(pattern)
    }

    /// Runs one cycle over every numeric entry in the process root.
    ///
    /// The group is only known after the status record is read, so each worker
    /// reserves one extra unit for that read on top of the record weight.
    pub async fn collect(
        &self,
        table: &Arc<GroupedProcs>,
        enabled: &EnabledMetrics,
        limiter: &WeightedLimiter,
    ) -> Result<(), CollectError> {
        let root = Arc::clone(&self.proc_root);
        let entries = tokio::task::spawn_blocking(move || collect_pids(&root))
            .await
            .unwrap_or_default();
        debug!(
            "Collected {} process entries from {}",
            entries.len(),
            self.proc_root.display()
        );

        let weight = GroupedProc::weight_for(enabled) + 1;
        let enabled = Arc::new(enabled.clone());
        let mut workers = JoinSet::new();
        let mut result = Ok(());

        for entry in entries {
            let permit = match limiter.acquire(weight).await {
                Ok(p) => p,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            let table = Arc::clone(table);
            let enabled = Arc::clone(&enabled);
            let filter = Arc::clone(&self.filter);
            let proc_root = Arc::clone(&self.proc_root);
            let pid = entry.pid;

            workers.spawn_blocking(move || {
                let _permit = permit;
                let raw = read_status_name(&proc_root, pid).map_err(|error| ReadFailure {
                    group: String::new(),
                    pid,
                    error,
                })?;
                let Some(group) = filter.apply(&raw) else {
                    return Ok(());
                };
                // No record is created for a process that vanished mid-read.
                let readings = GroupedProc::read_all(enabled.iter().copied(), &proc_root, pid)
                    .map_err(|error| ReadFailure {
                        group: group.clone(),
                        pid,
                        error,
                    })?;
                let gproc = table.load_or_create(&group, &enabled);
                if gproc.claim(pid) {
                    gproc.fold_all(&readings);
                    gproc.mark_exists();
                }
                Ok(())
            });
        }

        join_workers(&mut workers, table).await;
        result
    }
}
