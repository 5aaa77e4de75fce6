//! Crash recovery.
//!
//! A daemon restart orphans whatever was in flight: job rows stuck in
//! `running`, file rows stuck in `transferring`, and child processes whose
//! only trace is their transfer log. Recovery runs before any worker starts
//! and restores the invariant that no running job row and no transferring
//! file row references a process that does not exist.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::models::FileState;
use crate::catalog::Catalog;
use crate::error::CoreResult;
use crate::transfer_log::transferred_paths;

/// Resolves every job left `running` by a previous daemon instance.
///
/// For each such job the transfer log is the authority on what completed:
/// listed files go to `done`, the rest back to `queued`. The job row itself
/// then fails with "daemon restarted" (an already recorded error wins), and
/// a final sweep requeues any `transferring` row no job accounted for.
pub async fn recover_dangling_runs(catalog: &Arc<dyn Catalog>) -> CoreResult<()> {
    let running = catalog.running_jobs().await?;
    for job in &running {
        let done = if job.log_path.is_empty() {
            HashSet::new()
        } else {
            match transferred_paths(Path::new(&job.log_path)) {
                Ok(done) => done,
                Err(e) => {
                    warn!(job = %job.job_id, log = %job.log_path, error = %e, "recovery: log unreadable");
                    HashSet::new()
                }
            }
        };
        let done: Vec<String> = done.into_iter().collect();
        info!(
            job = %job.job_id,
            rule = %job.rule_id,
            completed = done.len(),
            "recovery: settling interrupted job"
        );
        catalog
            .finalize_job_files(&job.job_id, &done, FileState::Queued, "")
            .await?;
    }

    let failed = catalog.mark_running_jobs_failed("daemon restarted").await?;
    if !failed.is_empty() {
        info!(jobs = failed.len(), "recovery: marked interrupted jobs failed");
    }

    let requeued = catalog.requeue_orphan_transferring().await?;
    if requeued > 0 {
        info!(files = requeued, "recovery: requeued orphaned transferring files");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::{
        Job, JobStatus, Rule, ScanEntry, SourceKind, TransferMode,
    };
    use crate::catalog::MemoryCatalog;
    use chrono::{Duration, Utc};

    fn rule(id: &str) -> Rule {
        Rule {
            id: id.into(),
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
            batch_size: 10,
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

    fn entry(path: &str) -> ScanEntry {
        ScanEntry {
            path: path.into(),
            size: 1,
            mod_time: Utc::now() - Duration::seconds(120),
        }
    }

    #[tokio::test]
    async fn test_recovery_settles_from_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("j1.log");
        std::fs::write(
            &log,
            "2025/12/25 10:00:00 INFO  : a : Copied (new)\n\
             2025/12/25 10:00:01 INFO  : b : Copied (new)\n",
        )
        .unwrap();

        let catalog: Arc<dyn Catalog> = Arc::new(MemoryCatalog::new());
        let r = rule("r1");
        catalog.upsert_rule(r.clone()).await.unwrap();
        catalog
            .upsert_scan_entries(&r, &[entry("a"), entry("b"), entry("c"), entry("d")])
            .await
            .unwrap();
        catalog.enqueue_stable("r1", 10, 0).await.unwrap();
        catalog.claim_queued("r1", "j1", 10).await.unwrap();
        catalog
            .create_job(Job {
                job_id: "j1".into(),
                rule_id: "r1".into(),
                transfer_mode: TransferMode::Copy,
                rc_port: 0,
                started_at: Utc::now(),
                ended_at: None,
                status: JobStatus::Running,
                bytes_done: 0,
                avg_speed: 0.0,
                error: String::new(),
                log_path: log.to_string_lossy().to_string(),
            })
            .await
            .unwrap();

        recover_dangling_runs(&catalog).await.unwrap();

        let job = catalog.get_job("j1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error, "daemon restarted");

        for (path, want) in [
            ("a", FileState::Done),
            ("b", FileState::Done),
            ("c", FileState::Queued),
            ("d", FileState::Queued),
        ] {
            let row = catalog.file_row("r1", path).await.unwrap().unwrap();
            assert_eq!(row.state, want, "path {path}");
            assert!(row.job_id.is_none());
        }

        let counts = catalog.rule_file_counts("r1").await.unwrap();
        assert_eq!(counts.transferring, 0);
        assert!(catalog.running_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_without_log_requeues_everything() {
        let catalog: Arc<dyn Catalog> = Arc::new(MemoryCatalog::new());
        let r = rule("r1");
        catalog.upsert_rule(r.clone()).await.unwrap();
        catalog
            .upsert_scan_entries(&r, &[entry("a"), entry("b")])
            .await
            .unwrap();
        catalog.enqueue_stable("r1", 10, 0).await.unwrap();
        catalog.claim_queued("r1", "j1", 10).await.unwrap();
        catalog
            .create_job(Job {
                job_id: "j1".into(),
                rule_id: "r1".into(),
                transfer_mode: TransferMode::Copy,
                rc_port: 0,
                started_at: Utc::now(),
                ended_at: None,
                status: JobStatus::Running,
                bytes_done: 0,
                avg_speed: 0.0,
                error: String::new(),
                log_path: "/nonexistent/j1.log".into(),
            })
            .await
            .unwrap();

        recover_dangling_runs(&catalog).await.unwrap();

        let counts = catalog.rule_file_counts("r1").await.unwrap();
        assert_eq!(counts.queued, 2);
        assert_eq!(counts.transferring, 0);
    }

    #[tokio::test]
    async fn test_recovery_requeues_orphans_without_job_row() {
        let catalog: Arc<dyn Catalog> = Arc::new(MemoryCatalog::new());
        let r = rule("r1");
        catalog.upsert_rule(r.clone()).await.unwrap();
        catalog.upsert_scan_entries(&r, &[entry("a")]).await.unwrap();
        catalog.enqueue_stable("r1", 10, 0).await.unwrap();
        // A claim whose job row never landed.
        catalog.claim_queued("r1", "ghost", 10).await.unwrap();

        recover_dangling_runs(&catalog).await.unwrap();

        let row = catalog.file_row("r1", "a").await.unwrap().unwrap();
        assert_eq!(row.state, FileState::Queued);
        assert!(row.job_id.is_none());
    }

    #[tokio::test]
    async fn test_recovery_on_clean_catalog_is_noop() {
        let catalog: Arc<dyn Catalog> = Arc::new(MemoryCatalog::new());
        recover_dangling_runs(&catalog).await.unwrap();
    }
}
