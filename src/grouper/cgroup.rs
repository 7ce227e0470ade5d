//! Grouping by control-group hierarchy.
//!
//! Every directory below a subsystem mount is a potential group. Its
//! `cgroup.procs` file lists the member PIDs, which are read concurrently
//! under the shared limiter and folded into the group's record.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{CollectError, ConfigError};
use crate::grouped_proc::{EnabledMetrics, GroupedProc, GroupedProcs};
use crate::grouper::filter::GroupFilter;
use crate::grouper::{join_workers, ReadFailure, Workers};
use crate::limiter::{WeightedLimiter, TRAVERSAL_WEIGHT};

/// Default cgroup mount root.
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Membership file listing one PID per line.
pub const PROCS_FILE: &str = "cgroup.procs";

/// cgroup v1 subsystems walked in order.
pub const SUBSYSTEMS: &[&str] = &[
    "cpuset",
    "cpu",
    "cpuacct",
    "blkio",
    "memory",
    "devices",
    "freezer",
    "net_cls",
    "net_prio",
    "perf_event",
    "hugetlb",
    "pids",
    "rdma",
];

#[derive(Debug, Clone)]
pub struct Cgroup {
    fs_path: PathBuf,
    proc_root: Arc<PathBuf>,
    filter: GroupFilter,
}

/// Result of inspecting one directory while holding traversal weight.
struct Inspection {
    children: Vec<PathBuf>,
    membership: Option<(String, String)>,
}

impl Cgroup {
    pub fn new(fs_path: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            fs_path: fs_path.into(),
            proc_root: Arc::new(proc_root.into()),
            filter: GroupFilter::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        "cgroup"
    }

    pub fn set_normalize_regexp(&mut self, pattern: &str) -> Result<(), ConfigError> {
        self.filter.set_normalize_regexp(pattern)
    }

    pub fn set_exclude_regexp(&mut self, pattern: &str) -> Result<(), ConfigError> {
        self.filter.set_exclude_regexp(pattern)
    }

    /// Subsystem roots to walk. On a unified (v2) hierarchy none of the v1
    /// subsystem directories exist, so the mount root itself is walked.
    fn search_roots(&self) -> Vec<PathBuf> {
        let roots: Vec<PathBuf> = SUBSYSTEMS
            .iter()
            .map(|s| self.fs_path.join(s))
            .filter(|p| p.is_dir())
            .collect();
        if roots.is_empty() {
            vec![self.fs_path.clone()]
        } else {
            roots
        }
    }

    /// Runs one discovery-and-read cycle. Returns once every spawned read finished.
    pub async fn collect(
        &self,
        table: &Arc<GroupedProcs>,
        enabled: &EnabledMetrics,
        limiter: &WeightedLimiter,
    ) -> Result<(), CollectError> {
        let mut workers = JoinSet::new();
        let result = self.walk(table, enabled, limiter, &mut workers).await;
        join_workers(&mut workers, table).await;
        result
    }

    async fn walk(
        &self,
        table: &GroupedProcs,
        enabled: &EnabledMetrics,
        limiter: &WeightedLimiter,
        workers: &mut Workers,
    ) -> Result<(), CollectError> {
        for search_dir in self.search_roots() {
            let mut pending = vec![search_dir.clone()];

            while let Some(dir) = pending.pop() {
                let permit = limiter.acquire(TRAVERSAL_WEIGHT).await?;
                let inspection = self.inspect(&search_dir, &dir, table).await;
                drop(permit);

                // Reverse so the stack pops children in name order.
                pending.extend(inspection.children.into_iter().rev());

                let Some((group, content)) = inspection.membership else {
                    continue;
                };
                let gproc = table.load_or_create(&group, enabled);
                gproc.mark_exists();
                self.spawn_members(&group, &content, &gproc, table, limiter, workers)
                    .await?;
            }
        }
        Ok(())
    }

    /// Lists subdirectories and, for group candidates, reads the membership file.
    async fn inspect(&self, search_dir: &Path, dir: &Path, table: &GroupedProcs) -> Inspection {
        let mut children = Vec::new();
        match tokio::fs::read_dir(dir).await {
            Ok(mut entries) => loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                            children.push(entry.path());
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Failed to list {}: {}", dir.display(), e);
                        table.stats().record_discovery_error();
                        break;
                    }
                }
            },
            Err(e) => {
                // The cgroup may have been removed mid-walk.
                debug!("Failed to read cgroup dir {}: {}", dir.display(), e);
                if e.kind() != std::io::ErrorKind::NotFound {
                    table.stats().record_discovery_error();
                }
            }
        }
        children.sort();

        let raw = relative_path(search_dir, dir);
        let membership = match self.filter.apply(&raw) {
            Some(group) => match tokio::fs::read_to_string(dir.join(PROCS_FILE)).await {
                Ok(content) => Some((group, content)),
                Err(e) => {
                    debug!("No membership file in {}: {}", dir.display(), e);
                    None
                }
            },
            None => None,
        };

        Inspection {
            children,
            membership,
        }
    }

    async fn spawn_members(
        &self,
        group: &str,
        content: &str,
        gproc: &Arc<GroupedProc>,
        table: &GroupedProcs,
        limiter: &WeightedLimiter,
        workers: &mut Workers,
    ) -> Result<(), CollectError> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let pid: u32 = match line.parse() {
                Ok(pid) => pid,
                Err(_) => {
                    debug!("Skipping malformed line '{}' in {} membership", line, group);
                    table.stats().record_malformed_line();
                    continue;
                }
            };
            if !gproc.claim(pid) {
                continue;
            }

            let permit = limiter.acquire(gproc.required_weight()).await?;
            let gproc = Arc::clone(gproc);
            let proc_root = Arc::clone(&self.proc_root);
            let group = group.to_string();
            workers.spawn_blocking(move || {
                let _permit = permit;
                gproc
                    .collect_pid(&proc_root, pid)
                    .map_err(|error| ReadFailure { group, pid, error })
            });
        }
        Ok(())
    }
}

/// Path of `dir` relative to the subsystem root, with a leading `/`.
/// The root itself maps to the empty string.
fn relative_path(search_dir: &Path, dir: &Path) -> String {
    match dir.strip_prefix(search_dir) {
        Ok(rel) if rel.as_os_str().is_empty() => String::new(),
        Ok(rel) => format!("/{}", rel.to_string_lossy()),
        Err(_) => dir.to_string_lossy().into_owned(),
    }
}
