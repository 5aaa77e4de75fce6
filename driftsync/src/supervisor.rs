//! Worker supervision.
//!
//! The supervisor owns the process-wide pools (port pool, global job
//! limiter, process registry) and reconciles the set of running workers
//! against the rule table: every enabled, non-manual rule gets exactly one
//! worker, and a worker whose rule changed in any effective way is replaced
//! rather than mutated. It is also the operator surface for manual scans,
//! rule stops, job termination, and one-off manual jobs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::models::Rule;
use crate::catalog::Catalog;
use crate::executor::{run_manual_job, ExecContext};
use crate::worker::{spawn_rule_worker, WorkerHandle};

/// How often settings and the rule set are re-read.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Supervises one worker per enabled rule.
pub struct Supervisor {
    ctx: Arc<ExecContext>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    root: CancellationToken,
}

impl Supervisor {
    pub fn new(ctx: Arc<ExecContext>, root: CancellationToken) -> Self {
        Self {
            ctx,
            workers: Mutex::new(HashMap::new()),
            root,
        }
    }

    /// Shared execution context (pools, registry, catalog).
    pub fn context(&self) -> &Arc<ExecContext> {
        &self.ctx
    }

    /// Runs until the root token cancels, reconciling every 5 s.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.root.cancelled() => {
                    self.stop_all();
                    return;
                }
                _ = ticker.tick() => {
                    self.refresh_runtime().await;
                    self.reconcile().await;
                }
            }
        }
    }

    /// Re-applies live-tunable settings to the shared pools.
    async fn refresh_runtime(&self) {
        match self.ctx.catalog.runtime_settings().await {
            Ok(settings) => {
                self.ctx.limiter.set_cap(settings.global_max_jobs);
                self.ctx
                    .ports
                    .set_range(settings.rc_port_start, settings.rc_port_end);
            }
            Err(e) => warn!(error = %e, "supervisor: load settings failed"),
        }
    }

    /// Aligns running workers with the enabled, non-manual rule set.
    async fn reconcile(&self) {
        let rules = match self.ctx.catalog.list_enabled_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "supervisor: list rules failed");
                return;
            }
        };
        let desired: HashMap<String, Rule> =
            rules.into_iter().map(|r| (r.id.clone(), r)).collect();

        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());

        workers.retain(|id, worker| match desired.get(id) {
            None => {
                info!(rule = %id, "stopping worker: rule removed or disabled");
                worker.stop();
                false
            }
            Some(rule) if !worker.rule().same_effective_config(rule) => {
                info!(rule = %id, "stopping worker: rule changed");
                worker.stop();
                false
            }
            Some(_) => true,
        });

        for (id, rule) in desired {
            if workers.contains_key(&id) {
                continue;
            }
            info!(rule = %id, "starting worker");
            let handle = spawn_rule_worker(self.ctx.clone(), rule, self.root.child_token());
            workers.insert(id, handle);
        }
    }

    fn stop_all(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        for (id, worker) in workers.drain() {
            info!(rule = %id, "stopping worker: shutdown");
            worker.stop();
        }
    }

    /// Delivers a scan nudge to a rule's worker. False when none runs.
    pub fn trigger_scan(&self, rule_id: &str) -> bool {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        match workers.get(rule_id) {
            Some(worker) => {
                worker.trigger_scan();
                true
            }
            None => false,
        }
    }

    /// Evicts and stops a rule's worker. False when none runs.
    pub fn stop_rule(&self, rule_id: &str) -> bool {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        match workers.remove(rule_id) {
            Some(worker) => {
                worker.stop();
                true
            }
            None => false,
        }
    }

    /// Kills a specific running job. False when no live handle exists.
    pub fn terminate_job(&self, job_id: &str) -> bool {
        self.ctx.registry.terminate(job_id)
    }

    /// Launches a one-off manual job in the background.
    ///
    /// The rule is a manual rule the supervisor never schedules; the job
    /// row must already exist. Resource acquisition and finalization run
    /// on the spawned task.
    pub fn start_manual_job(&self, rule: Rule, job_id: String, log_path: PathBuf) {
        let ctx = self.ctx.clone();
        let cancel = self.root.child_token();
        tokio::spawn(async move {
            if let Err(e) = run_manual_job(&ctx, &rule, &job_id, &log_path, &cancel).await {
                warn!(job = %job_id, error = %e, "manual job failed to finalize");
            }
        });
    }

    /// Number of currently running workers.
    pub fn worker_count(&self) -> usize {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.len()
    }
}
