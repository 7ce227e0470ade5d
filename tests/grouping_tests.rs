//! Integration tests for the grouping strategies.
//!
//! These tests build a fake proc root and cgroup hierarchy in a temp dir and
//! verify that one collection cycle produces the expected groups and exact sums.

use grouped_process_exporter::grouper::cgroup::PROCS_FILE;
use grouped_process_exporter::metric::Accumulator;
use grouped_process_exporter::procfs::{ProcIo, ProcStat};
use grouped_process_exporter::{
    CollectError, ConfigError, EnabledMetrics, GroupType, GroupedProc, GroupedProcs, Grouper,
    MetricKind, WeightedLimiter,
};
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

struct Fixture {
    _dir: TempDir,
    proc_root: std::path::PathBuf,
    cgroup_root: std::path::PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().expect("Failed to create temp dir");
        let proc_root = dir.path().join("proc");
        let cgroup_root = dir.path().join("cgroup");
        fs::create_dir_all(&proc_root).expect("Failed to create proc root");
        fs::create_dir_all(&cgroup_root).expect("Failed to create cgroup root");
        // Non-numeric entries must be ignored by the name strategy
        fs::create_dir_all(proc_root.join("self")).expect("Failed to create self");
        fs::create_dir_all(proc_root.join("sys")).expect("Failed to create sys");
        Self {
            _dir: dir,
            proc_root,
            cgroup_root,
        }
    }

    /// Writes status, stat and io records. utime = pid, rss = 2 * pid pages,
    /// read_bytes = 100 * pid.
    fn add_process(&self, pid: u32, name: &str) {
        let dir = self.proc_root.join(pid.to_string());
        fs::create_dir_all(&dir).expect("Failed to create pid dir");
        fs::write(
            dir.join("status"),
            format!("Name:\t{name}\nUmask:\t0022\nState:\tS (sleeping)\nPid:\t{pid}\n"),
        )
        .expect("Failed to write status");
        fs::write(
            dir.join("stat"),
            format!(
                "{pid} ({name}) S 1 {pid} {pid} 0 -1 4194560 7 0 1 0 {utime} 3 0 0 20 0 2 0 100 4096 {rss}",
                utime = pid,
                rss = pid * 2
            ),
        )
        .expect("Failed to write stat");
        fs::write(
            dir.join("io"),
            format!(
                "rchar: 10\nwchar: 20\nsyscr: 1\nsyscw: 2\nread_bytes: {}\nwrite_bytes: 0\ncancelled_write_bytes: 0\n",
                pid * 100
            ),
        )
        .expect("Failed to write io");
    }

    fn add_cgroup(&self, subsystem: &str, rel: &str, procs: &str) {
        let dir = self.cgroup_root.join(subsystem).join(rel);
        fs::create_dir_all(&dir).expect("Failed to create cgroup dir");
        fs::write(dir.join(PROCS_FILE), procs).expect("Failed to write cgroup.procs");
    }

    fn grouper(&self, group_type: GroupType) -> Grouper {
        Grouper::new(group_type, &self.cgroup_root, &self.proc_root)
    }
}

fn all_enabled() -> EnabledMetrics {
    MetricKind::ALL.into_iter().collect()
}

fn stat_totals(gproc: &GroupedProc) -> ProcStat {
    match gproc.accumulator(MetricKind::Stat) {
        Some(Accumulator::Stat(acc)) => acc.totals(),
        other => panic!("expected stat accumulator, got {:?}", other),
    }
}

fn io_totals(gproc: &GroupedProc) -> ProcIo {
    match gproc.accumulator(MetricKind::Io) {
        Some(Accumulator::Io(acc)) => acc.totals(),
        other => panic!("expected io accumulator, got {:?}", other),
    }
}

async fn run_cycle(grouper: &Grouper, capacity: u32) -> Result<Arc<GroupedProcs>, CollectError> {
    let table = Arc::new(GroupedProcs::new());
    let limiter = WeightedLimiter::new(capacity);
    grouper.collect(&table, &all_enabled(), &limiter).await?;
    Ok(table)
}

/// Three processes in two cgroups below /app.
fn app_fixture() -> Fixture {
    let fx = Fixture::new();
    fx.add_process(10, "nginx");
    fx.add_process(11, "nginx");
    fx.add_process(20, "mysqld");
    fx.add_cgroup("cpu", "app/web", "10\n11\n");
    fx.add_cgroup("cpu", "app/db", "20\n");
    fx
}

#[tokio::test]
async fn test_name_strategy_groups_by_status_name() {
    let fx = Fixture::new();
    fx.add_process(10, "nginx");
    fx.add_process(11, "nginx");
    fx.add_process(20, "mysqld");

    let table = run_cycle(&fx.grouper(GroupType::Name), 16)
        .await
        .expect("Cycle failed");

    assert_eq!(table.len(), 2);
    assert_eq!(table.names(), vec!["mysqld".to_string(), "nginx".to_string()]);

    let nginx = table.get("nginx").expect("nginx group missing");
    assert!(nginx.exists());
    assert_eq!(nginx.num_procs(), 2);
    let stat = stat_totals(&nginx);
    assert_eq!(stat.utime, 21);
    assert_eq!(stat.stime, 6);
    assert_eq!(stat.rss, 42);
    assert_eq!(stat.num_threads, 4);
    assert_eq!(stat.minflt, 14);
    assert_eq!(io_totals(&nginx).read_bytes, 2100);

    let mysqld = table.get("mysqld").expect("mysqld group missing");
    assert_eq!(mysqld.num_procs(), 1);
    assert_eq!(stat_totals(&mysqld).utime, 20);
    assert_eq!(io_totals(&mysqld).rchar, 10);
}

#[tokio::test]
async fn test_name_strategy_skips_process_without_stat() {
    let fx = Fixture::new();
    fx.add_process(10, "nginx");
    fx.add_process(20, "mysqld");
    // Status is readable but the process is gone before its stat is read
    fx.add_process(30, "bash");
    fs::remove_file(fx.proc_root.join("30").join("stat")).expect("Failed to remove stat");

    let table = Arc::new(GroupedProcs::new());
    fx.grouper(GroupType::Name)
        .collect(&table, &all_enabled(), &WeightedLimiter::permissive())
        .await
        .expect("Cycle failed");

    assert_eq!(table.names(), vec!["mysqld".to_string(), "nginx".to_string()]);
    assert!(!table.contains("bash"));
    assert_eq!(table.stats().vanished_processes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_name_strategy_normalize_and_exclude() {
    let fx = Fixture::new();
    fx.add_process(10, "php-fpm-7");
    fx.add_process(11, "php-fpm-8");
    fx.add_process(12, "kworker");

    let mut grouper = fx.grouper(GroupType::Name);
    grouper
        .set_normalize_regexp("^(php-fpm)-\\d+$")
        .expect("Valid pattern rejected");
    grouper
        .set_exclude_regexp("^kworker")
        .expect("Valid pattern rejected");

    let table = run_cycle(&grouper, 16).await.expect("Cycle failed");
    assert_eq!(table.names(), vec!["php-fpm".to_string()]);
    assert_eq!(table.get("php-fpm").map(|g| g.num_procs()), Some(2));
}

#[tokio::test]
async fn test_cgroup_strategy_normalizes_to_capture() {
    let fx = app_fixture();
    let mut grouper = fx.grouper(GroupType::Cgroup);
    grouper
        .set_normalize_regexp("^/app/(.+)$")
        .expect("Valid pattern rejected");

    let table = run_cycle(&grouper, 64).await.expect("Cycle failed");
    assert_eq!(table.names(), vec!["db".to_string(), "web".to_string()]);

    let web = table.get("web").expect("web group missing");
    assert_eq!(web.num_procs(), 2);
    assert_eq!(stat_totals(&web).utime, 21);
    assert_eq!(io_totals(&web).read_bytes, 2100);

    let db = table.get("db").expect("db group missing");
    assert_eq!(db.num_procs(), 1);
    assert_eq!(stat_totals(&db).utime, 20);
}

#[tokio::test]
async fn test_cgroup_strategy_without_normalize_uses_relative_path() {
    let fx = app_fixture();
    let table = run_cycle(&fx.grouper(GroupType::Cgroup), 64)
        .await
        .expect("Cycle failed");
    assert_eq!(
        table.names(),
        vec!["/app/db".to_string(), "/app/web".to_string()]
    );
}

#[tokio::test]
async fn test_exclude_beats_normalize() {
    let fx = app_fixture();
    let mut grouper = fx.grouper(GroupType::Cgroup);
    grouper
        .set_normalize_regexp("^/app/(.+)$")
        .expect("Valid pattern rejected");
    grouper
        .set_exclude_regexp("^/app/db$")
        .expect("Valid pattern rejected");

    let table = run_cycle(&grouper, 64).await.expect("Cycle failed");
    assert_eq!(table.names(), vec!["web".to_string()]);
}

#[tokio::test]
async fn test_capacity_does_not_change_totals() {
    let fx = app_fixture();
    fx.add_process(21, "mysqld");
    fx.add_process(22, "mysqld");
    fx.add_cgroup("cpu", "app/db", "20\n21\n22\n");
    fx.add_cgroup("memory", "app/cache", "22\n");

    let grouper = fx.grouper(GroupType::Cgroup);
    let tiny = run_cycle(&grouper, 1).await.expect("Cycle failed");
    let wide = run_cycle(&grouper, 1000).await.expect("Cycle failed");

    assert_eq!(tiny.names(), wide.names());
    for name in tiny.names() {
        let a = tiny.get(&name).expect("group missing");
        let b = wide.get(&name).expect("group missing");
        assert_eq!(a.num_procs(), b.num_procs(), "num_procs of {name}");
        assert_eq!(stat_totals(&a), stat_totals(&b), "stat totals of {name}");
        assert_eq!(io_totals(&a), io_totals(&b), "io totals of {name}");
    }
    assert_eq!(stat_totals(&wide.get("/app/db").unwrap()).utime, 63);
}

#[tokio::test]
async fn test_unparsable_membership_line_is_skipped() {
    let fx = app_fixture();
    fx.add_cgroup("cpu", "app/web", "10\nnot-a-pid\n11\n");

    let table = run_cycle(&fx.grouper(GroupType::Cgroup), 16)
        .await
        .expect("Cycle failed");

    let web = table.get("/app/web").expect("web group missing");
    assert_eq!(web.num_procs(), 2);
    assert_eq!(stat_totals(&web).utime, 21);
    assert_eq!(stat_totals(&table.get("/app/db").unwrap()).utime, 20);
    assert_eq!(table.stats().malformed_lines.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_vanished_process_is_dropped() {
    let fx = app_fixture();
    // 99 is listed but has no proc entry
    fx.add_cgroup("cpu", "app/web", "10\n99\n11\n");

    let table = run_cycle(&fx.grouper(GroupType::Cgroup), 16)
        .await
        .expect("Cycle failed");

    let web = table.get("/app/web").expect("web group missing");
    assert!(web.exists());
    assert_eq!(web.num_procs(), 2);
    assert_eq!(stat_totals(&web).utime, 21);
    assert_eq!(table.stats().vanished_processes.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_malformed_stat_record_drops_only_that_process() {
    let fx = app_fixture();
    fs::write(fx.proc_root.join("11").join("stat"), "11 (nginx) S 1")
        .expect("Failed to write stat");

    let table = run_cycle(&fx.grouper(GroupType::Cgroup), 16)
        .await
        .expect("Cycle failed");

    let web = table.get("/app/web").expect("web group missing");
    assert_eq!(web.num_procs(), 1);
    assert_eq!(stat_totals(&web).utime, 10);
    // The io record of 11 was readable but must not be folded either
    assert_eq!(io_totals(&web).read_bytes, 1000);
    assert_eq!(table.stats().read_errors.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_same_cgroup_under_several_subsystems_counts_once() {
    let fx = app_fixture();
    fx.add_cgroup("memory", "app/web", "10\n11\n");
    fx.add_cgroup("pids", "app/web", "11\n");

    let table = run_cycle(&fx.grouper(GroupType::Cgroup), 16)
        .await
        .expect("Cycle failed");

    let web = table.get("/app/web").expect("web group missing");
    assert_eq!(web.num_procs(), 2);
    assert_eq!(stat_totals(&web).utime, 21);
}

#[tokio::test]
async fn test_unified_hierarchy_is_walked_from_root() {
    let fx = Fixture::new();
    fx.add_process(10, "sshd");
    let dir = fx.cgroup_root.join("system.slice").join("sshd.service");
    fs::create_dir_all(&dir).expect("Failed to create cgroup dir");
    fs::write(dir.join(PROCS_FILE), "10\n").expect("Failed to write cgroup.procs");
    fs::write(fx.cgroup_root.join(PROCS_FILE), "1\n").expect("Failed to write cgroup.procs");

    let mut grouper = fx.grouper(GroupType::Cgroup);
    grouper
        .set_normalize_regexp("^/system\\.slice/(.+)\\.service$")
        .expect("Valid pattern rejected");

    let table = run_cycle(&grouper, 8).await.expect("Cycle failed");
    // The root maps to an empty name and /system.slice has no membership file
    assert_eq!(table.names(), vec!["sshd".to_string()]);
    assert_eq!(table.get("sshd").map(|g| g.num_procs()), Some(1));
}

#[test]
fn test_bad_pattern_rejected_before_discovery() {
    let fx = app_fixture();
    let mut grouper = fx.grouper(GroupType::Cgroup);
    assert!(matches!(
        grouper.set_normalize_regexp("^/app/.+$"),
        Err(ConfigError::InvalidPattern { found: 0, .. })
    ));
    assert!(matches!(
        grouper.set_exclude_regexp("(unclosed"),
        Err(ConfigError::InvalidRegexp { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_limiter_aborts_cycle() {
    let fx = app_fixture();
    for group_type in [GroupType::Cgroup, GroupType::Name] {
        let grouper = fx.grouper(group_type);
        let table = Arc::new(GroupedProcs::new());
        let limiter = WeightedLimiter::new(8);
        limiter.cancel();

        let res = grouper.collect(&table, &all_enabled(), &limiter).await;
        assert!(
            matches!(res, Err(CollectError::Admission { .. })),
            "{group_type} cycle did not abort"
        );
    }
}

#[tokio::test]
async fn test_missing_roots_yield_empty_cycle() {
    let dir = tempdir().expect("Failed to create temp dir");
    let missing = dir.path().join("missing");
    for group_type in [GroupType::Cgroup, GroupType::Name] {
        let grouper = Grouper::new(group_type, &missing, &missing);
        let table = run_cycle(&grouper, 4).await.expect("Cycle failed");
        assert!(table.is_empty());
    }
}
