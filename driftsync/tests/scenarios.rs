//! End-to-end job lifecycle scenarios.
//!
//! A shell script stands in for the transfer tool: it extracts `--log-file`
//! from its arguments, appends a canned transfer log, optionally lingers,
//! and exits with a chosen status. Everything else is real: catalog, state
//! machine, claim, executor supervision, log reconciliation, recovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use driftsync::admission::GlobalJobLimiter;
use driftsync::catalog::models::{
    FileState, Job, JobStatus, Rule, ScanEntry, SourceKind, TransferMode,
};
use driftsync::catalog::{Catalog, MemoryCatalog};
use driftsync::executor::{launch_scheduled_job, ExecContext};
use driftsync::ports::PortPool;
use driftsync::recovery::recover_dangling_runs;
use driftsync::registry::ProcessRegistry;

/// Writes an executable fake transfer tool into `dir`.
///
/// The script appends `log_body` to whatever `--log-file` it is given,
/// writes `stderr_text` to stderr, sleeps `sleep_secs`, and exits with
/// `exit_code`.
fn fake_tool(dir: &Path, log_body: &str, stderr_text: &str, sleep_secs: u32, exit_code: i32) -> PathBuf {
    let body_path = dir.join("log_body.txt");
    std::fs::write(&body_path, log_body).unwrap();

    let script_path = dir.join("fake-tool.sh");
    let script = format!(
        "#!/bin/sh\n\
         log=\"\"\n\
         prev=\"\"\n\
         for a in \"$@\"; do\n\
           if [ \"$prev\" = \"--log-file\" ]; then log=\"$a\"; fi\n\
           prev=\"$a\"\n\
         done\n\
         if [ -n \"$log\" ]; then\n\
           mkdir -p \"$(dirname \"$log\")\"\n\
           cat {body} >> \"$log\"\n\
         fi\n\
         if [ -n \"{stderr}\" ]; then echo \"{stderr}\" >&2; fi\n\
         sleep {sleep}\n\
         exit {code}\n",
        body = body_path.display(),
        stderr = stderr_text,
        sleep = sleep_secs,
        code = exit_code,
    );
    std::fs::write(&script_path, script).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    script_path
}

fn test_rule(batch_size: usize) -> Rule {
    Rule {
        id: "r1".into(),
        src_kind: SourceKind::Remote,
        src_remote: "remA".into(),
        src_path: "/x".into(),
        src_local_root: String::new(),
        local_watch: false,
        dst_remote: "remB".into(),
        dst_path: "/y".into(),
        transfer_mode: TransferMode::Copy,
        max_parallel_jobs: 1,
        scan_interval_sec: 15,
        stable_seconds: 0,
        batch_size,
        daily_limit_bytes: 0,
        limit_group: String::new(),
        bwlimit: String::new(),
        min_file_size_bytes: 0,
        ignore_extensions: String::new(),
        extra_args: String::new(),
        enabled: true,
        is_manual: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn entries(paths: &[(&str, i64)]) -> Vec<ScanEntry> {
    let mod_time = Utc::now() - chrono::Duration::seconds(300);
    paths
        .iter()
        .map(|(path, size)| ScanEntry {
            path: (*path).to_string(),
            size: *size,
            mod_time,
        })
        .collect()
}

struct Harness {
    catalog: Arc<MemoryCatalog>,
    ctx: Arc<ExecContext>,
    _workdir: tempfile::TempDir,
}

impl Harness {
    /// Seeds a catalog with one rule and its queued files, pointing the
    /// executor at the given fake tool.
    async fn new(rule: &Rule, files: &[(&str, i64)], tool: impl FnOnce(&Path) -> PathBuf) -> Self {
        let workdir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(MemoryCatalog::new());
        catalog
            .set_setting("log_dir", workdir.path().join("logs").to_str().unwrap())
            .await
            .unwrap();
        catalog
            .set_setting("metrics_interval_ms", "100")
            .await
            .unwrap();
        catalog.upsert_rule(rule.clone()).await.unwrap();
        catalog
            .upsert_scan_entries(rule, &entries(files))
            .await
            .unwrap();
        catalog
            .enqueue_stable(&rule.id, files.len().max(1), 0)
            .await
            .unwrap();

        let tool_path = tool(workdir.path());
        let mut ctx = ExecContext::new(
            catalog.clone(),
            Arc::new(PortPool::new(57200, 57300)),
            Arc::new(GlobalJobLimiter::new(0)),
            Arc::new(ProcessRegistry::new()),
        );
        ctx.tool = tool_path.to_string_lossy().to_string();
        Self {
            catalog,
            ctx: Arc::new(ctx),
            _workdir: workdir,
        }
    }

    async fn newest_job(&self) -> Job {
        self.catalog
            .list_jobs(1)
            .await
            .unwrap()
            .into_iter()
            .next()
            .expect("a job should exist")
    }

    async fn file_state(&self, path: &str) -> FileState {
        self.catalog
            .file_row("r1", path)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("file row {path} missing"))
            .state
    }

    fn resources_released(&self) -> bool {
        self.ctx.ports.leased() == 0
            && self.ctx.limiter.holders() == 0
            && self.ctx.registry.is_empty()
    }
}

#[tokio::test]
async fn test_happy_path_all_files_transferred() {
    let rule = test_rule(3);
    let log = "2025/12/25 10:00:00 INFO  : a : Copied (new)\n\
               2025/12/25 10:00:01 INFO  : b : Copied (new)\n\
               2025/12/25 10:00:02 INFO  : c : Copied (new)\n";
    let h = Harness::new(&rule, &[("a", 1), ("b", 2), ("c", 3)], |dir| {
        fake_tool(dir, log, "", 0, 0)
    })
    .await;

    launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap();

    let job = h.newest_job().await;
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.bytes_done >= 0);
    assert!(job.ended_at.is_some());
    for path in ["a", "b", "c"] {
        assert_eq!(h.file_state(path).await, FileState::Done, "path {path}");
    }
    assert!(h.resources_released());
}

#[tokio::test]
async fn test_partial_transfer_requeues_remainder() {
    let rule = test_rule(3);
    let log = "2025/12/25 10:00:00 INFO  : a : Copied (new)\n\
               2025/12/25 10:00:01 INFO  : b : Copied (new)\n";
    let h = Harness::new(&rule, &[("a", 1), ("b", 2), ("c", 3)], |dir| {
        fake_tool(dir, log, "", 0, 0)
    })
    .await;

    launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap();

    let job = h.newest_job().await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, "incomplete: 2/3 transferred");
    assert_eq!(h.file_state("a").await, FileState::Done);
    assert_eq!(h.file_state("b").await, FileState::Done);
    assert_eq!(h.file_state("c").await, FileState::Queued);

    let c = h.catalog.file_row("r1", "c").await.unwrap().unwrap();
    assert_eq!(c.last_error, "incomplete: 2/3 transferred");
    assert!(c.job_id.is_none());
    assert!(h.resources_released());
}

#[tokio::test]
async fn test_nothing_to_transfer_marks_all_done() {
    let rule = test_rule(3);
    let log = "2025/12/25 10:00:00 NOTICE: There was nothing to transfer\n";
    let h = Harness::new(&rule, &[("a", 1), ("b", 2), ("c", 3)], |dir| {
        fake_tool(dir, log, "", 0, 0)
    })
    .await;

    launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap();

    let job = h.newest_job().await;
    assert_eq!(job.status, JobStatus::Done);
    for path in ["a", "b", "c"] {
        assert_eq!(h.file_state(path).await, FileState::Done, "path {path}");
    }
    assert!(h.resources_released());
}

#[tokio::test]
async fn test_child_failure_records_stderr() {
    let rule = test_rule(2);
    let h = Harness::new(&rule, &[("a", 1), ("b", 2)], |dir| {
        fake_tool(dir, "", "boom: remote unreachable", 0, 3)
    })
    .await;

    launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap();

    let job = h.newest_job().await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, "boom: remote unreachable");
    for path in ["a", "b"] {
        assert_eq!(h.file_state(path).await, FileState::Queued, "path {path}");
        let row = h.catalog.file_row("r1", path).await.unwrap().unwrap();
        assert_eq!(row.last_error, "boom: remote unreachable");
        assert_eq!(row.fail_count, 1);
    }
    assert!(h.resources_released());
}

#[tokio::test]
async fn test_user_terminate_splits_done_and_queued() {
    let rule = test_rule(5);
    let log = "2025/12/25 10:00:00 INFO  : a : Copied (new)\n\
               2025/12/25 10:00:01 INFO  : b : Copied (new)\n";
    let h = Harness::new(
        &rule,
        &[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)],
        |dir| fake_tool(dir, log, "", 30, 0),
    )
    .await;

    let ctx = h.ctx.clone();
    let rule2 = rule.clone();
    let run = tokio::spawn(async move {
        launch_scheduled_job(&ctx, &rule2, &CancellationToken::new()).await
    });

    // Wait for the job to register, then kill it as an operator would.
    let job_id = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(job) = h.catalog.running_jobs().await.unwrap().first() {
                if !h.ctx.registry.is_empty() {
                    break job.job_id.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("job should start");
    assert!(h.ctx.registry.terminate(&job_id));

    tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run should finish")
        .unwrap()
        .unwrap();

    let job = h.catalog.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Terminated);
    assert_eq!(job.error, "terminated by user");
    assert_eq!(h.file_state("a").await, FileState::Done);
    assert_eq!(h.file_state("b").await, FileState::Done);
    for path in ["c", "d", "e"] {
        assert_eq!(h.file_state(path).await, FileState::Queued, "path {path}");
    }
    assert!(h.resources_released());
}

#[tokio::test]
async fn test_quota_reached_starts_nothing() {
    let mut rule = test_rule(3);
    rule.daily_limit_bytes = 100;
    let h = Harness::new(&rule, &[("a", 1), ("b", 2), ("c", 3)], |dir| {
        fake_tool(dir, "", "", 0, 0)
    })
    .await;

    // A job inside the 24 h window already consumed the whole quota.
    h.catalog
        .create_job(Job {
            job_id: "prior".into(),
            rule_id: "r1".into(),
            transfer_mode: TransferMode::Copy,
            rc_port: 0,
            started_at: Utc::now() - chrono::Duration::hours(1),
            ended_at: Some(Utc::now() - chrono::Duration::minutes(30)),
            status: JobStatus::Done,
            bytes_done: 100,
            avg_speed: 1.0,
            error: String::new(),
            log_path: String::new(),
        })
        .await
        .unwrap();

    launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.catalog.list_jobs(10).await.unwrap().len(), 1);
    for path in ["a", "b", "c"] {
        assert_eq!(h.file_state(path).await, FileState::Queued, "path {path}");
    }
    assert!(h.resources_released());
}

#[tokio::test]
async fn test_group_budget_blocks_concurrent_overshoot() {
    let mut rule = test_rule(2);
    rule.limit_group = "g".into();
    let h = Harness::new(&rule, &[("a", 60), ("b", 60)], |dir| {
        fake_tool(dir, "", "", 0, 0)
    })
    .await;
    h.catalog
        .upsert_limit_group(driftsync::catalog::models::LimitGroup {
            name: "g".into(),
            daily_limit_bytes: 100,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    // The claim itself (120 bytes of in-flight reservation) exceeds the
    // group limit, so the budgeted re-check must release it untouched.
    launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap();

    assert!(h.catalog.list_jobs(10).await.unwrap().is_empty());
    for path in ["a", "b"] {
        assert_eq!(h.file_state(path).await, FileState::Queued, "path {path}");
        let row = h.catalog.file_row("r1", path).await.unwrap().unwrap();
        assert!(row.job_id.is_none());
    }
    assert!(h.resources_released());
}

#[tokio::test]
async fn test_port_exhaustion_leaves_queue_intact() {
    let rule = test_rule(2);
    let h = Harness::new(&rule, &[("a", 1), ("b", 2)], |dir| {
        fake_tool(dir, "", "", 0, 0)
    })
    .await;
    // Degenerate range: nothing to lease.
    h.ctx.ports.set_range(57400, 57400);

    let err = launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        driftsync::error::CoreError::NoPortAvailable { .. }
    ));
    for path in ["a", "b"] {
        assert_eq!(h.file_state(path).await, FileState::Queued, "path {path}");
    }
    assert_eq!(h.ctx.limiter.holders(), 0);
}

#[tokio::test]
async fn test_batch_size_one_claims_single_file() {
    let rule = test_rule(1);
    let log = "2025/12/25 10:00:00 INFO  : a : Copied (new)\n\
               2025/12/25 10:00:01 INFO  : b : Copied (new)\n";
    let h = Harness::new(&rule, &[("a", 1), ("b", 2)], |dir| {
        fake_tool(dir, log, "", 0, 0)
    })
    .await;

    launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap();

    // One batch of one: a single job, and exactly one file left queued.
    assert_eq!(h.catalog.list_jobs(10).await.unwrap().len(), 1);
    let counts = h.catalog.rule_file_counts("r1").await.unwrap();
    assert_eq!(counts.done, 1);
    assert_eq!(counts.queued, 1);
}

#[tokio::test]
async fn test_crash_recovery_resolves_running_job() {
    let rule = test_rule(4);
    let h = Harness::new(
        &rule,
        &[("a", 1), ("b", 2), ("c", 3), ("d", 4)],
        |dir| fake_tool(dir, "", "", 0, 0),
    )
    .await;

    // Simulate a daemon killed mid-job: claim + running row + partial log.
    let log_path = h._workdir.path().join("logs/r1/dead.log");
    std::fs::create_dir_all(log_path.parent().unwrap()).unwrap();
    std::fs::write(
        &log_path,
        "2025/12/25 10:00:00 INFO  : a : Copied (new)\n\
         2025/12/25 10:00:01 INFO  : b : Copied (new)\n",
    )
    .unwrap();
    h.catalog.claim_queued("r1", "dead", 4).await.unwrap();
    h.catalog
        .create_job(Job {
            job_id: "dead".into(),
            rule_id: "r1".into(),
            transfer_mode: TransferMode::Copy,
            rc_port: 57250,
            started_at: Utc::now(),
            ended_at: None,
            status: JobStatus::Running,
            bytes_done: 3,
            avg_speed: 1.0,
            error: String::new(),
            log_path: log_path.to_string_lossy().to_string(),
        })
        .await
        .unwrap();

    let catalog: Arc<dyn Catalog> = h.catalog.clone();
    recover_dangling_runs(&catalog).await.unwrap();

    let job = h.catalog.get_job("dead").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, "daemon restarted");
    assert_eq!(h.file_state("a").await, FileState::Done);
    assert_eq!(h.file_state("b").await, FileState::Done);
    assert_eq!(h.file_state("c").await, FileState::Queued);
    assert_eq!(h.file_state("d").await, FileState::Queued);
    assert!(h.catalog.running_jobs().await.unwrap().is_empty());
    let counts = h.catalog.rule_file_counts("r1").await.unwrap();
    assert_eq!(counts.transferring, 0);
}

#[tokio::test]
async fn test_retry_failed_drives_files_back_through() {
    let rule = test_rule(2);
    let log = "2025/12/25 10:00:00 INFO  : a : Copied (new)\n\
               2025/12/25 10:00:01 INFO  : b : Copied (new)\n";
    let h = Harness::new(&rule, &[("a", 1), ("b", 2)], |dir| {
        fake_tool(dir, log, "", 0, 0)
    })
    .await;

    // Park both files in failed, then retry and run a normal job.
    h.catalog.claim_queued("r1", "j0", 2).await.unwrap();
    h.catalog
        .finalize_job_files("j0", &[], FileState::Failed, "first attempt")
        .await
        .unwrap();
    assert_eq!(h.file_state("a").await, FileState::Failed);

    assert_eq!(h.catalog.retry_failed("r1", 10).await.unwrap(), 2);
    launch_scheduled_job(&h.ctx, &rule, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.file_state("a").await, FileState::Done);
    assert_eq!(h.file_state("b").await, FileState::Done);
}
