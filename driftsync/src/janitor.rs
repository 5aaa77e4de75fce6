//! Log retention.
//!
//! Job logs and their work directories accumulate forever unless pruned.
//! The janitor sweeps hourly, deleting `.log` files older than the
//! configured retention and the matching `jobs/<rule>/<job>` directory.
//! Retention of 0 disables the sweep.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::catalog::Catalog;

/// Sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Runs the retention sweep until cancelled. The first sweep is immediate.
pub async fn run_log_janitor(catalog: Arc<dyn Catalog>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => sweep_once(&catalog).await,
        }
    }
}

async fn sweep_once(catalog: &Arc<dyn Catalog>) {
    let settings = match catalog.runtime_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "janitor: load settings failed");
            return;
        }
    };
    if settings.log_retention_days == 0 || settings.log_dir.is_empty() {
        return;
    }
    let cutoff = SystemTime::now()
        - Duration::from_secs(u64::from(settings.log_retention_days) * 24 * 60 * 60);
    let log_dir = settings.log_dir.clone();
    let removed = tokio::task::spawn_blocking(move || clean_old_logs(&log_dir, cutoff))
        .await
        .unwrap_or(0);
    if removed > 0 {
        debug!(removed, "janitor: pruned old job logs");
    }
}

/// Deletes stale logs under `log_dir` and their job work directories.
/// Returns the number of logs removed.
pub fn clean_old_logs(log_dir: &str, cutoff: SystemTime) -> usize {
    let log_root = Path::new(log_dir);
    let base = match log_root.parent() {
        Some(base) => base.to_path_buf(),
        None => return 0,
    };
    let mut removed = 0;
    for entry in WalkDir::new(log_root).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if !name.ends_with(".log") {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(modified) = meta.modified() else { continue };
        if modified >= cutoff {
            continue;
        }

        if std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
        // Logs live at <log_dir>/<rule>/<job>.log; drop the job's work
        // directory alongside and sweep now-empty parents.
        if let Ok(rel) = entry.path().strip_prefix(log_root) {
            let parts: Vec<_> = rel.components().collect();
            if parts.len() >= 2 {
                let rule_id = parts[0].as_os_str().to_string_lossy().to_string();
                let job_id = entry
                    .path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                if !rule_id.is_empty() && !job_id.is_empty() {
                    let _ = std::fs::remove_dir_all(base.join("jobs").join(&rule_id).join(&job_id));
                    let _ = std::fs::remove_dir(log_root.join(&rule_id));
                    let _ = std::fs::remove_dir(base.join("jobs").join(&rule_id));
                }
            }
        }
    }
    removed
}
