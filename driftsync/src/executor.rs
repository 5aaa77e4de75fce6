//! Job execution.
//!
//! One executor run drives one child transfer process from claim to
//! finalization. Files are claimed optimistically into `transferring`,
//! the child is supervised with live RPC polling, and completion is
//! reconciled from the transfer log after exit. Every resource a run takes
//! (admission slot, port lease, handle registration, claimed files) is
//! released on all exit paths, so partial failure never strands a file in
//! `transferring` or a job in `running`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::GlobalJobLimiter;
use crate::catalog::models::{FileState, Job, JobMetric, JobStatus, Rule};
use crate::catalog::settings::RuntimeSettings;
use crate::catalog::Catalog;
use crate::cliargs::{parse_extra_args, sanitize_extra_args, sanitize_filter_args};
use crate::error::{CoreError, CoreResult};
use crate::extensions::parse_ignore_extensions;
use crate::id::new_job_id;
use crate::ports::PortPool;
use crate::rc::{RcClient, RcStats};
use crate::registry::ProcessRegistry;
use crate::transfer_log::{had_nothing_to_transfer, transferred_paths, LogCursor};

/// Default transfer-tool binary.
pub const DEFAULT_TRANSFER_TOOL: &str = "rclone";

/// Budget for the first successful RPC poll after spawn.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll cadence inside the readiness window.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Everything an executor run needs; shared by all workers.
pub struct ExecContext {
    pub catalog: Arc<dyn Catalog>,
    pub ports: Arc<PortPool>,
    pub limiter: Arc<GlobalJobLimiter>,
    pub registry: Arc<ProcessRegistry>,
    pub rc: RcClient,
    pub log_cursor: Arc<LogCursor>,
    /// Transfer-tool binary; tests substitute a script.
    pub tool: String,
}

impl ExecContext {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        ports: Arc<PortPool>,
        limiter: Arc<GlobalJobLimiter>,
        registry: Arc<ProcessRegistry>,
    ) -> Self {
        Self {
            catalog,
            ports,
            limiter,
            registry,
            rc: RcClient::new(),
            log_cursor: Arc::new(LogCursor::new()),
            tool: DEFAULT_TRANSFER_TOOL.to_string(),
        }
    }
}

/// How a child run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// Non-zero exit; carries trimmed stderr or the exit status.
    ChildFailed(String),
    /// Operator kill via the process registry.
    UserTerminated,
    /// Child died to an external signal.
    SignalTerminated,
    /// Worker or root cancellation.
    Cancelled,
}

/// Totals and outcome of one child run.
#[derive(Clone, Debug)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub bytes_done: i64,
    pub avg_speed: f64,
}

struct AdmissionGuard {
    limiter: Arc<GlobalJobLimiter>,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

struct PortLease {
    ports: Arc<PortPool>,
    port: u16,
}

impl PortLease {
    fn acquire(ports: Arc<PortPool>) -> CoreResult<Self> {
        let port = ports.acquire()?;
        Ok(Self { ports, port })
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.ports.release(self.port);
    }
}

struct RegistrationGuard {
    registry: Arc<ProcessRegistry>,
    job_id: String,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.job_id);
    }
}

/// Resolved quota for one launch attempt.
#[derive(Clone, Debug)]
enum QuotaScope {
    Unlimited,
    Rule { limit: i64 },
    Group { name: String, limit: i64 },
}

async fn resolve_quota(ctx: &ExecContext, rule: &Rule) -> CoreResult<QuotaScope> {
    if !rule.limit_group.is_empty() {
        match ctx.catalog.get_limit_group(&rule.limit_group).await? {
            Some(group) if group.daily_limit_bytes > 0 => {
                return Ok(QuotaScope::Group {
                    name: group.name,
                    limit: group.daily_limit_bytes,
                });
            }
            Some(_) => return Ok(QuotaScope::Unlimited),
            None => {
                // The console can delete a group rules still reference.
                warn!(
                    rule = %rule.id,
                    group = %rule.limit_group,
                    "limit group missing; treating as unlimited"
                );
                return Ok(QuotaScope::Unlimited);
            }
        }
    }
    if rule.daily_limit_bytes > 0 {
        Ok(QuotaScope::Rule {
            limit: rule.daily_limit_bytes,
        })
    } else {
        Ok(QuotaScope::Unlimited)
    }
}

/// Attempts one scheduled job launch for a rule.
///
/// Returns without error when there is nothing to do: empty queue, quota
/// reached, cancellation. The caller retries on its next scheduling tick.
pub async fn launch_scheduled_job(
    ctx: &ExecContext,
    rule: &Rule,
    cancel: &CancellationToken,
) -> CoreResult<()> {
    if cancel.is_cancelled() {
        return Ok(());
    }
    let settings = ctx.catalog.runtime_settings().await?;
    if !ctx.catalog.has_queued(&rule.id).await? {
        return Ok(());
    }

    let quota = resolve_quota(ctx, rule).await?;
    let window_start = Utc::now() - chrono::Duration::hours(24);
    match &quota {
        QuotaScope::Unlimited => {}
        QuotaScope::Rule { limit } => {
            let usage = ctx.catalog.rule_usage_since(&rule.id, window_start).await?;
            if usage >= *limit {
                debug!(rule = %rule.id, usage, limit, "daily limit reached");
                return Ok(());
            }
        }
        QuotaScope::Group { name, limit } => {
            let usage = ctx.catalog.group_usage_since(name, window_start).await?;
            if usage >= *limit {
                debug!(rule = %rule.id, group = %name, usage, limit, "group limit reached");
                return Ok(());
            }
        }
    }

    if !ctx.limiter.acquire(cancel).await {
        return Ok(());
    }
    let _admission = AdmissionGuard {
        limiter: ctx.limiter.clone(),
    };
    let port_lease = PortLease::acquire(ctx.ports.clone())?;
    let port = port_lease.port;

    let job_id = new_job_id();
    let paths = ctx
        .catalog
        .claim_queued(&rule.id, &job_id, rule.batch_size)
        .await?;
    if paths.is_empty() {
        return Ok(());
    }

    // Re-check against the in-flight budget now that the claim is visible:
    // the budget already reserves this job's own file sizes, so comparing
    // it to the limit directly prevents concurrent jobs from jointly
    // overshooting without double-counting the claim.
    let limit = match &quota {
        QuotaScope::Unlimited => 0,
        QuotaScope::Rule { limit } => *limit,
        QuotaScope::Group { limit, .. } => *limit,
    };
    if limit > 0 {
        let budget = match &quota {
            QuotaScope::Group { name, .. } => {
                ctx.catalog.group_budget_since(name, window_start).await?
            }
            _ => ctx.catalog.rule_budget_since(&rule.id, window_start).await?,
        };
        if budget > limit {
            let job_size = ctx.catalog.job_files_size(&job_id).await.unwrap_or(0);
            info!(
                rule = %rule.id,
                job = %job_id,
                budget,
                job_size,
                limit,
                "daily limit would be exceeded; releasing claim"
            );
            ctx.catalog.release_claimed(&job_id).await?;
            return Ok(());
        }
    }

    if cancel.is_cancelled() {
        ctx.catalog.release_claimed(&job_id).await?;
        return Ok(());
    }

    let layout = JobLayout::new(&settings.log_dir, &rule.id, &job_id);
    if let Err(e) = layout.prepare(&paths) {
        ctx.catalog.release_claimed(&job_id).await?;
        return Err(e);
    }

    let job = Job {
        job_id: job_id.clone(),
        rule_id: rule.id.clone(),
        transfer_mode: rule.transfer_mode,
        rc_port: port,
        started_at: Utc::now(),
        ended_at: None,
        status: JobStatus::Running,
        bytes_done: 0,
        avg_speed: 0.0,
        error: String::new(),
        log_path: layout.log_path.to_string_lossy().to_string(),
    };
    if let Err(e) = ctx.catalog.create_job(job).await {
        ctx.catalog.release_claimed(&job_id).await?;
        return Err(e);
    }

    if cancel.is_cancelled() {
        ctx.catalog
            .finish_job(&job_id, JobStatus::Terminated, "rule disabled", 0, 0.0)
            .await?;
        ctx.catalog.release_claimed(&job_id).await?;
        return Ok(());
    }

    info!(rule = %rule.id, job = %job_id, files = paths.len(), port, "starting job");
    let result = run_with_metrics(
        ctx,
        rule,
        &settings,
        port,
        Some(&layout.files_from),
        &layout.log_path,
        &job_id,
        cancel,
    )
    .await;

    finalize_scheduled_job(ctx, &job_id, &paths, &layout.log_path, result).await
}

/// Settles the job row and every claimed file after the child has exited.
async fn finalize_scheduled_job(
    ctx: &ExecContext,
    job_id: &str,
    paths: &[String],
    log_path: &Path,
    result: RunResult,
) -> CoreResult<()> {
    ctx.log_cursor.forget(job_id);
    let RunResult {
        outcome,
        bytes_done,
        avg_speed,
    } = result;

    match outcome {
        RunOutcome::UserTerminated | RunOutcome::SignalTerminated | RunOutcome::Cancelled => {
            let status_text = if outcome == RunOutcome::UserTerminated {
                "terminated by user"
            } else {
                "terminated"
            };
            ctx.catalog
                .finish_job(job_id, JobStatus::Terminated, status_text, bytes_done, avg_speed)
                .await?;
            let done = done_in_claim_order(paths, log_path);
            ctx.catalog
                .finalize_job_files(job_id, &done, FileState::Queued, "")
                .await
        }
        RunOutcome::ChildFailed(error) => {
            ctx.catalog
                .finish_job(job_id, JobStatus::Failed, &error, bytes_done, avg_speed)
                .await?;
            let done = done_in_claim_order(paths, log_path);
            ctx.catalog
                .finalize_job_files(job_id, &done, FileState::Queued, &error)
                .await
        }
        RunOutcome::Success => {
            let done_set = match transferred_paths(log_path) {
                Ok(set) => set,
                Err(e) => {
                    let error = format!("log parse: {e}");
                    ctx.catalog
                        .finish_job(job_id, JobStatus::Failed, &error, bytes_done, avg_speed)
                        .await?;
                    return ctx
                        .catalog
                        .finalize_job_files(job_id, &[], FileState::Queued, "")
                        .await;
                }
            };
            let done: Vec<String> = paths
                .iter()
                .filter(|p| done_set.contains(p.as_str()))
                .cloned()
                .collect();
            if done.len() == paths.len() {
                ctx.catalog
                    .finish_job(job_id, JobStatus::Done, "", bytes_done, avg_speed)
                    .await?;
                return ctx
                    .catalog
                    .finalize_job_files(job_id, paths, FileState::Queued, "")
                    .await;
            }
            if had_nothing_to_transfer(log_path) {
                // The destination already has everything; marking the whole
                // claim done keeps identical batches from re-queueing
                // forever.
                ctx.catalog
                    .finish_job(job_id, JobStatus::Done, "", bytes_done, avg_speed)
                    .await?;
                return ctx
                    .catalog
                    .finalize_job_files(job_id, paths, FileState::Queued, "")
                    .await;
            }
            let error = format!("incomplete: {}/{} transferred", done.len(), paths.len());
            ctx.catalog
                .finish_job(job_id, JobStatus::Failed, &error, bytes_done, avg_speed)
                .await?;
            ctx.catalog
                .finalize_job_files(job_id, &done, FileState::Queued, &error)
                .await
        }
    }
}

/// Runs a one-off manual job.
///
/// Manual rules are never scheduled; the job row already exists and no
/// files are claimed, so the child runs free-form over the rule's source
/// (no files-from list) and only the job row is finalized. Admission and
/// the port lease are released on every path out.
pub async fn run_manual_job(
    ctx: &ExecContext,
    rule: &Rule,
    job_id: &str,
    log_path: &Path,
    cancel: &CancellationToken,
) -> CoreResult<()> {
    let settings = match ctx.catalog.runtime_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            let msg = format!("load settings: {e}");
            return ctx
                .catalog
                .finish_job(job_id, JobStatus::Failed, &msg, 0, 0.0)
                .await;
        }
    };
    if !ctx.limiter.acquire(cancel).await {
        return ctx
            .catalog
            .finish_job(job_id, JobStatus::Failed, "acquire global job slot failed", 0, 0.0)
            .await;
    }
    let _admission = AdmissionGuard {
        limiter: ctx.limiter.clone(),
    };
    let port_lease = match PortLease::acquire(ctx.ports.clone()) {
        Ok(lease) => lease,
        Err(e) => {
            let msg = format!("acquire rc port: {e}");
            return ctx
                .catalog
                .finish_job(job_id, JobStatus::Failed, &msg, 0, 0.0)
                .await;
        }
    };
    ctx.catalog.update_job_running(job_id, port_lease.port).await?;

    info!(rule = %rule.id, job = %job_id, port = port_lease.port, "starting manual job");
    let result = run_with_metrics(
        ctx,
        rule,
        &settings,
        port_lease.port,
        None,
        log_path,
        job_id,
        cancel,
    )
    .await;
    ctx.log_cursor.forget(job_id);

    let RunResult {
        outcome,
        bytes_done,
        avg_speed,
    } = result;
    match outcome {
        RunOutcome::UserTerminated => {
            ctx.catalog
                .finish_job(job_id, JobStatus::Terminated, "terminated by user", bytes_done, avg_speed)
                .await
        }
        RunOutcome::SignalTerminated | RunOutcome::Cancelled => {
            ctx.catalog
                .finish_job(job_id, JobStatus::Terminated, "terminated", bytes_done, avg_speed)
                .await
        }
        RunOutcome::ChildFailed(error) => {
            ctx.catalog
                .finish_job(job_id, JobStatus::Failed, &error, bytes_done, avg_speed)
                .await
        }
        RunOutcome::Success => {
            ctx.catalog
                .finish_job(job_id, JobStatus::Done, "", bytes_done, avg_speed)
                .await
        }
    }
}

fn done_in_claim_order(paths: &[String], log_path: &Path) -> Vec<String> {
    let done_set = transferred_paths(log_path).unwrap_or_default();
    paths
        .iter()
        .filter(|p| done_set.contains(p.as_str()))
        .cloned()
        .collect()
}

/// Filesystem layout for one job: a work directory holding the files-from
/// list and the per-job transfer log.
pub struct JobLayout {
    pub job_dir: PathBuf,
    pub files_from: PathBuf,
    pub log_path: PathBuf,
}

impl JobLayout {
    pub fn new(log_dir: &str, rule_id: &str, job_id: &str) -> Self {
        let base = Path::new(log_dir).parent().unwrap_or(Path::new(".")).to_path_buf();
        let job_dir = base.join("jobs").join(rule_id).join(job_id);
        Self {
            files_from: job_dir.join("files.txt"),
            log_path: Path::new(log_dir).join(rule_id).join(format!("{job_id}.log")),
            job_dir,
        }
    }

    /// Creates the work directory and writes the files list, one claimed
    /// path per line, newline-terminated, readable by the owner only.
    pub fn prepare(&self, paths: &[String]) -> CoreResult<()> {
        std::fs::create_dir_all(&self.job_dir)?;
        let mut body = paths.join("\n");
        body.push('\n');
        write_private(&self.files_from, body.as_bytes())?;
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    f.write_all(body)
}

#[cfg(not(unix))]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, body)
}

/// Assembles the child's argument list.
///
/// `files_from` is absent for manual jobs, which may run free-form over the
/// whole source. Extra arguments are tokenized and sanitized; jobs driven
/// by a files list additionally drop operator filter flags that would make
/// log reconciliation ambiguous.
pub fn build_transfer_args(
    rule: &Rule,
    settings: &RuntimeSettings,
    port: u16,
    files_from: Option<&Path>,
    log_path: &Path,
) -> CoreResult<Vec<String>> {
    let mut args: Vec<String> = vec![
        rule.transfer_mode.as_str().to_string(),
        rule.source_spec(),
        rule.dest_spec(),
    ];
    if let Some(files_from) = files_from {
        args.push("--files-from".into());
        args.push(files_from.to_string_lossy().to_string());
    }
    args.extend([
        "--stats".to_string(),
        "0".to_string(),
        "--rc".to_string(),
        "--rc-no-auth".to_string(),
        "--rc-addr".to_string(),
        format!("127.0.0.1:{port}"),
        "--log-file".to_string(),
        log_path.to_string_lossy().to_string(),
        "--log-level".to_string(),
        "INFO".to_string(),
        format!("--transfers={}", settings.transfers),
        format!("--checkers={}", settings.checkers),
    ]);
    if !settings.config_path.is_empty() {
        args.push("--config".into());
        args.push(settings.config_path.clone());
    }
    if !settings.buffer_size.is_empty() {
        args.push("--buffer-size".into());
        args.push(settings.buffer_size.clone());
    }
    if !settings.drive_chunk_size.is_empty() {
        args.push("--drive-chunk-size".into());
        args.push(settings.drive_chunk_size.clone());
    }
    let bwlimit = if rule.bwlimit.is_empty() {
        settings.bwlimit.as_str()
    } else {
        rule.bwlimit.as_str()
    };
    if !bwlimit.is_empty() {
        args.push("--bwlimit".into());
        args.push(bwlimit.to_string());
    }
    if rule.min_file_size_bytes > 0 {
        args.push("--min-size".into());
        args.push(rule.min_file_size_bytes.to_string());
    }
    for ext in parse_ignore_extensions(&rule.ignore_extensions) {
        args.push("--exclude".into());
        args.push(format!("*{ext}"));
    }
    if !rule.extra_args.trim().is_empty() {
        let parsed = parse_extra_args(&rule.extra_args)?;
        let mut sanitized = sanitize_extra_args(&parsed);
        if files_from.is_some() {
            sanitized = sanitize_filter_args(&sanitized.args);
        }
        args.extend(sanitized.args);
    }
    Ok(args)
}

/// Runs the child to completion, streaming metric samples into the catalog.
///
/// Registered in the process registry for the whole run so the operator can
/// terminate it; the registry flag decides between [`RunOutcome::UserTerminated`]
/// and [`RunOutcome::Cancelled`] after the kill.
#[allow(clippy::too_many_arguments)]
pub async fn run_with_metrics(
    ctx: &ExecContext,
    rule: &Rule,
    settings: &RuntimeSettings,
    port: u16,
    files_from: Option<&Path>,
    log_path: &Path,
    job_id: &str,
    cancel: &CancellationToken,
) -> RunResult {
    let started = std::time::Instant::now();
    let fail = |msg: String| RunResult {
        outcome: RunOutcome::ChildFailed(msg),
        bytes_done: 0,
        avg_speed: 0.0,
    };

    let args = match build_transfer_args(rule, settings, port, files_from, log_path) {
        Ok(args) => args,
        Err(e) => return fail(e.to_string()),
    };
    if let Some(dir) = log_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            return fail(format!("create log dir: {e}"));
        }
    }

    debug!(job = %job_id, tool = %ctx.tool, ?args, "spawning transfer tool");
    let mut child = match Command::new(&ctx.tool)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return fail(format!("spawn {}: {e}", ctx.tool)),
    };

    let stderr_task = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf).await;
            buf
        })
    });

    let handle = ctx.registry.register(job_id);
    let _registration = RegistrationGuard {
        registry: ctx.registry.clone(),
        job_id: job_id.to_string(),
    };

    let mut last = RcStats::default();
    let mut exit_status = None;

    // Readiness: wait for the first successful poll so the RPC endpoint is
    // known live before the metrics cadence starts. A child that exits
    // first (tiny batch, immediate failure) short-circuits the window.
    let ready_deadline = tokio::time::Instant::now() + READY_TIMEOUT;
    while tokio::time::Instant::now() < ready_deadline {
        if cancel.is_cancelled() || handle.kill_requested().is_cancelled() {
            break;
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                exit_status = Some(status);
                break;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(job = %job_id, error = %e, "child wait probe failed");
                break;
            }
        }
        if let Ok(stats) = ctx.rc.poll_stats(port).await {
            last = stats;
            break;
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }

    let mut ticker = tokio::time::interval(settings.metrics_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.reset();

    let status = loop {
        if let Some(status) = exit_status {
            break Ok(status);
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                break child.wait().await;
            }
            _ = handle.kill_requested().cancelled() => {
                let _ = child.start_kill();
                break child.wait().await;
            }
            waited = child.wait() => break waited,
            _ = ticker.tick() => {
                match ctx.rc.poll_stats(port).await {
                    Ok(stats) => {
                        last = stats;
                        let metric = JobMetric {
                            job_id: job_id.to_string(),
                            ts: Utc::now(),
                            bytes: stats.bytes,
                            speed: stats.speed,
                            transfers: stats.transfers,
                            errors: stats.errors,
                        };
                        if let Err(e) = ctx.catalog.insert_metric(metric).await {
                            warn!(job = %job_id, error = %e, "metric insert failed");
                        }
                        if let Err(e) = ctx
                            .catalog
                            .update_job_running_stats(job_id, stats.bytes, stats.speed)
                            .await
                        {
                            warn!(job = %job_id, error = %e, "stats update failed");
                        }
                        if let Ok(done) = ctx.log_cursor.done_paths(job_id, log_path) {
                            debug!(job = %job_id, bytes = stats.bytes, completed = done.len(), "progress");
                        }
                    }
                    Err(e) => {
                        // The endpoint may simply not be up yet; the next
                        // tick retries.
                        debug!(job = %job_id, error = %e, "stats poll failed");
                    }
                }
            }
        }
    };

    let stderr_text = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    let bytes_done = last.bytes;
    let avg_speed = average_speed(bytes_done, started.elapsed());

    let outcome = match status {
        Err(e) => RunOutcome::ChildFailed(format!("wait for child: {e}")),
        Ok(status) => {
            if handle.terminated_by_user() {
                RunOutcome::UserTerminated
            } else if cancel.is_cancelled() && !status.success() {
                RunOutcome::Cancelled
            } else if status.success() {
                RunOutcome::Success
            } else if killed_by_signal(&status) {
                RunOutcome::SignalTerminated
            } else {
                let msg = stderr_text.trim();
                if msg.is_empty() {
                    RunOutcome::ChildFailed(format!("exit status {status}"))
                } else {
                    RunOutcome::ChildFailed(msg.to_string())
                }
            }
        }
    };

    info!(
        job = %job_id,
        ?outcome,
        bytes_done,
        avg_speed,
        "transfer tool finished"
    );
    RunResult {
        outcome,
        bytes_done,
        avg_speed,
    }
}

/// Final average over the whole run.
pub fn average_speed(bytes: i64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        bytes as f64 / secs
    }
}

#[cfg(unix)]
fn killed_by_signal(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
fn killed_by_signal(_status: &std::process::ExitStatus) -> bool {
    false
}
