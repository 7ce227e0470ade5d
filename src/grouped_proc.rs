//! Per-group process records and the table that holds them across cycles.
//!
//! A `GroupedProc` owns one accumulator per enabled metric kind. Workers fold
//! into it concurrently; each accumulator serializes its own updates, so there
//! is no lock around the record as a whole.

use ahash::AHashSet as HashSet;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ReadError;
use crate::metric::{Accumulator, MetricKind, Reading};

/// Metric kinds enabled for collection.
pub type EnabledMetrics = BTreeSet<MetricKind>;

/// Accumulated statistics of all processes that belong to one group.
#[derive(Debug)]
pub struct GroupedProc {
    metrics: BTreeMap<MetricKind, Accumulator>,
    required_weight: u32,
    exists: AtomicBool,
    num_procs: AtomicU64,
    seen: Mutex<HashSet<u32>>,
}

impl GroupedProc {
    pub fn new(enabled: &EnabledMetrics) -> Self {
        Self {
            metrics: enabled.iter().map(|k| (*k, k.new_accumulator())).collect(),
            required_weight: Self::weight_for(enabled),
            exists: AtomicBool::new(false),
            num_procs: AtomicU64::new(0),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Limiter units needed to read one process: one per enabled kind, at least one.
    pub fn weight_for(enabled: &EnabledMetrics) -> u32 {
        (enabled.len() as u32).max(1)
    }

    pub fn required_weight(&self) -> u32 {
        self.required_weight
    }

    pub fn is_enabled(&self, kind: MetricKind) -> bool {
        self.metrics.contains_key(&kind)
    }

    pub fn accumulators(&self) -> impl Iterator<Item = &Accumulator> {
        self.metrics.values()
    }

    pub fn accumulator(&self, kind: MetricKind) -> Option<&Accumulator> {
        self.metrics.get(&kind)
    }

    pub fn exists(&self) -> bool {
        self.exists.load(Ordering::Acquire)
    }

    pub fn mark_exists(&self) {
        self.exists.store(true, Ordering::Release);
    }

    /// Number of processes folded in during the current cycle.
    pub fn num_procs(&self) -> u64 {
        self.num_procs.load(Ordering::Relaxed)
    }

    /// Claims `pid` for this cycle. Returns false if it was already claimed,
    /// e.g. when the same cgroup path shows up under several subsystems.
    pub fn claim(&self, pid: u32) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid)
    }

    /// Reads every enabled record of `pid` and folds them in.
    ///
    /// All reads happen before any fold, so a process that vanishes halfway
    /// contributes nothing instead of a partial reading.
    pub fn collect_pid(&self, proc_root: &Path, pid: u32) -> Result<(), ReadError> {
        let readings = Self::read_all(self.metrics.keys().copied(), proc_root, pid)?;
        self.fold_all(&readings);
        Ok(())
    }

    /// Reads the record of every kind in `kinds` for one process, or fails on
    /// the first one that cannot be read.
    pub fn read_all(
        kinds: impl IntoIterator<Item = MetricKind>,
        proc_root: &Path,
        pid: u32,
    ) -> Result<Vec<Reading>, ReadError> {
        kinds
            .into_iter()
            .map(|kind| kind.read(proc_root, pid))
            .collect()
    }

    /// Folds one process's readings and counts it as a member.
    pub fn fold_all(&self, readings: &[Reading]) {
        for reading in readings {
            if let Some(acc) = self.metrics.get(&reading.kind()) {
                acc.fold(reading);
            }
        }
        self.num_procs.fetch_add(1, Ordering::Relaxed);
    }

    /// Clears totals and liveness at the start of a cycle.
    pub fn reset(&self) {
        for acc in self.metrics.values() {
            acc.reset();
        }
        self.exists.store(false, Ordering::Release);
        self.num_procs.store(0, Ordering::Relaxed);
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Counters for tolerated failures during one cycle.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub discovery_errors: AtomicU64,
    pub read_errors: AtomicU64,
    pub vanished_processes: AtomicU64,
    pub malformed_lines: AtomicU64,
}

impl CycleStats {
    pub fn record_read_error(&self, err: &ReadError) {
        if err.is_not_found() {
            self.vanished_processes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.read_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_discovery_error(&self) {
        self.discovery_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_line(&self) {
        self.malformed_lines.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.discovery_errors.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
        self.vanished_processes.store(0, Ordering::Relaxed);
        self.malformed_lines.store(0, Ordering::Relaxed);
    }
}

/// Group name to record, shared by every collection cycle.
#[derive(Debug, Default)]
pub struct GroupedProcs {
    groups: DashMap<String, Arc<GroupedProc>>,
    stats: CycleStats,
}

impl GroupedProcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `name`, creating it with `enabled` kinds if absent.
    pub fn load_or_create(&self, name: &str, enabled: &EnabledMetrics) -> Arc<GroupedProc> {
        if let Some(existing) = self.groups.get(name) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.groups
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(GroupedProc::new(enabled)))
                .value(),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<GroupedProc>> {
        self.groups.get(name).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sorted group names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Copy of the table sorted by group name; no shard lock is held afterwards.
    pub fn snapshot(&self) -> Vec<(String, Arc<GroupedProc>)> {
        let mut out: Vec<_> = self
            .groups
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Resets every record and the tolerated-failure counters.
    pub fn begin_cycle(&self) {
        for r in self.groups.iter() {
            r.value().reset();
        }
        self.stats.reset();
    }

    /// Removes records that no process was observed for. Returns how many were removed.
    pub fn evict_absent(&self) -> usize {
        let before = self.groups.len();
        self.groups.retain(|_, g| g.exists());
        before - self.groups.len()
    }
}
