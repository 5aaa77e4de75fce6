//! Per-rule worker loop.
//!
//! Each enabled, non-manual rule gets one worker: an event loop over a scan
//! ticker, a scheduling ticker, a one-slot manual scan trigger, and the
//! cancellation chain from the supervisor. Scans feed the file state
//! machine and keep the queue warm; scheduling ticks drain the per-rule
//! parallelism semaphore, spawning one executor task per free slot.
//!
//! Workers are immutable: when a rule's effective configuration changes the
//! supervisor stops the worker and starts a fresh one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::models::{Rule, SourceKind};
use crate::executor::{launch_scheduled_job, ExecContext};
use crate::scanner::{scan_rule, spawn_local_watcher};

/// A running worker as the supervisor sees it.
pub struct WorkerHandle {
    rule: Rule,
    cancel: CancellationToken,
    scan_trigger: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// The rule snapshot this worker was started with.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Nudges the worker to scan now. A trigger that finds one already
    /// pending is dropped.
    pub fn trigger_scan(&self) {
        let _ = self.scan_trigger.try_send(());
    }

    /// Stops the worker and everything it spawned, including in-flight
    /// executors, which kill their child processes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// True once the worker's loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns the worker loop for one rule.
pub fn spawn_rule_worker(
    ctx: Arc<ExecContext>,
    rule: Rule,
    cancel: CancellationToken,
) -> WorkerHandle {
    let (scan_tx, scan_rx) = mpsc::channel(1);
    let handle_rule = rule.clone();
    let handle_cancel = cancel.clone();
    let scan_trigger = scan_tx.clone();
    let task = tokio::spawn(run_worker(ctx, rule, cancel, scan_tx, scan_rx));
    WorkerHandle {
        rule: handle_rule,
        cancel: handle_cancel,
        scan_trigger,
        task,
    }
}

async fn run_worker(
    ctx: Arc<ExecContext>,
    rule: Rule,
    cancel: CancellationToken,
    scan_tx: mpsc::Sender<()>,
    mut scan_rx: mpsc::Receiver<()>,
) {
    let settings = match ctx.catalog.runtime_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(rule = %rule.id, error = %e, "worker: load settings failed");
            return;
        }
    };

    let mut scan_ticker = tokio::time::interval(Duration::from_secs(rule.scan_interval_sec));
    scan_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut sched_ticker = tokio::time::interval(settings.scheduler_tick);
    sched_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    if rule.src_kind == SourceKind::Local && rule.local_watch {
        spawn_local_watcher(
            rule.id.clone(),
            rule.src_local_root.clone().into(),
            scan_tx,
            cancel.child_token(),
        );
    }

    // The per-rule parallelism gate. Executors hold a permit for their whole
    // run; a replacement worker gets a fresh semaphore and the old permits
    // die with their tasks.
    let job_slots = Arc::new(Semaphore::new(rule.max_parallel_jobs));

    debug!(rule = %rule.id, "worker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(rule = %rule.id, "worker stopped");
                return;
            }
            // The first ticker fire is immediate, which doubles as the
            // startup scan.
            _ = scan_ticker.tick() => do_scan(&ctx, &rule).await,
            Some(()) = scan_rx.recv() => do_scan(&ctx, &rule).await,
            _ = sched_ticker.tick() => do_schedule(&ctx, &rule, &job_slots, &cancel).await,
        }
    }
}

/// Runs one scan: enumerate the source, upsert observations, top up the
/// queue. Failures are transient; the next tick retries.
async fn do_scan(ctx: &Arc<ExecContext>, rule: &Rule) {
    let settings = match ctx.catalog.runtime_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(rule = %rule.id, error = %e, "scan: load settings failed");
            return;
        }
    };
    let entries = match scan_rule(&ctx.tool, rule, &settings).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(rule = %rule.id, error = %e, "scan failed");
            return;
        }
    };
    debug!(rule = %rule.id, entries = entries.len(), "scan complete");
    if let Err(e) = ctx.catalog.upsert_scan_entries(rule, &entries).await {
        warn!(rule = %rule.id, error = %e, "scan upsert failed");
        return;
    }
    if let Err(e) = ctx
        .catalog
        .enqueue_stable(&rule.id, rule.batch_size, rule.min_file_size_bytes)
        .await
    {
        warn!(rule = %rule.id, error = %e, "enqueue failed");
    }
}

/// Runs one scheduling pass: keep the queue warm, then start a launch
/// attempt for every free parallelism slot.
async fn do_schedule(
    ctx: &Arc<ExecContext>,
    rule: &Rule,
    job_slots: &Arc<Semaphore>,
    cancel: &CancellationToken,
) {
    if let Err(e) = ctx
        .catalog
        .enqueue_stable(&rule.id, rule.batch_size, rule.min_file_size_bytes)
        .await
    {
        warn!(rule = %rule.id, error = %e, "enqueue failed");
    }

    while let Ok(permit) = job_slots.clone().try_acquire_owned() {
        if cancel.is_cancelled() {
            return;
        }
        let ctx = ctx.clone();
        let rule = rule.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = launch_scheduled_job(&ctx, &rule, &cancel).await {
                warn!(rule = %rule.id, error = %e, "job launch failed");
            }
        });
    }
}
