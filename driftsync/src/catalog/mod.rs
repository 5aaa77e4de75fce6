//! Catalog access.
//!
//! The catalog is a transactional store holding rules, files, jobs, metric
//! samples, limit groups, and settings. The core talks to it through the
//! [`Catalog`] trait so the real store stays external and tests inject
//! [`MemoryCatalog`]. Every operation is serializable from the caller's
//! point of view; multi-row mutations (scan upsert, promotion, claim,
//! finalize) are single transactions.

mod memory;
pub mod models;
pub mod settings;

pub use memory::MemoryCatalog;
pub use models::{
    FileRow, FileState, FileStateCounts, Job, JobMetric, JobStatus, LimitGroup, RealtimeSummary,
    Rule, ScanEntry, SourceKind, TransferMode,
};
pub use settings::RuntimeSettings;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;

/// Narrow transactional surface the core consumes.
///
/// Implementations must make [`Catalog::claim_queued`] atomic: the scan for
/// claimable rows and their transition to `transferring` happen in one
/// transaction, so two workers can never claim the same path.
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    // --- rules ---

    /// Inserts or replaces a rule after normalization.
    async fn upsert_rule(&self, rule: Rule) -> CoreResult<()>;

    /// Deletes a rule, cascading to its files and jobs.
    async fn delete_rule(&self, rule_id: &str) -> CoreResult<()>;

    async fn get_rule(&self, rule_id: &str) -> CoreResult<Option<Rule>>;

    async fn list_rules(&self) -> CoreResult<Vec<Rule>>;

    /// Enabled, non-manual rules — the supervisor's desired worker set.
    async fn list_enabled_rules(&self) -> CoreResult<Vec<Rule>>;

    // --- files ---

    /// Applies one scan's observations in a single transaction.
    ///
    /// State math follows [`crate::statemachine`]; files the scan did not
    /// observe keep their rows (the source side has no deletion semantics).
    async fn upsert_scan_entries(&self, rule: &Rule, entries: &[ScanEntry]) -> CoreResult<()>;

    /// Promotes up to `limit` stable files of at least `min_size` bytes to
    /// queued, newest `last_seen` first. Returns the number promoted.
    async fn enqueue_stable(&self, rule_id: &str, limit: usize, min_size: i64)
        -> CoreResult<usize>;

    async fn has_queued(&self, rule_id: &str) -> CoreResult<bool>;

    /// Atomically claims up to `limit` queued files for `job_id`, moving
    /// them to `transferring`. Returns the claimed paths, newest first.
    async fn claim_queued(
        &self,
        rule_id: &str,
        job_id: &str,
        limit: usize,
    ) -> CoreResult<Vec<String>>;

    /// Returns a job's still-transferring files to queued and clears their
    /// job id. Used when a claim must be abandoned before or after a run.
    async fn release_claimed(&self, job_id: &str) -> CoreResult<()>;

    /// Settles every file claimed by a job: `done_paths` become done, the
    /// rest take `fallback` (queued or failed); job ids are cleared on all.
    /// A non-empty `error` is recorded as `last_error` (and bumps
    /// `fail_count`) on the fallback rows.
    async fn finalize_job_files(
        &self,
        job_id: &str,
        done_paths: &[String],
        fallback: FileState,
        error: &str,
    ) -> CoreResult<()>;

    /// Moves up to `limit` failed files back to queued. Returns the count.
    async fn retry_failed(&self, rule_id: &str, limit: usize) -> CoreResult<usize>;

    /// Sum of `size` over the files currently claimed by a job.
    async fn job_files_size(&self, job_id: &str) -> CoreResult<i64>;

    async fn file_row(&self, rule_id: &str, path: &str) -> CoreResult<Option<FileRow>>;

    async fn rule_file_counts(&self, rule_id: &str) -> CoreResult<FileStateCounts>;

    // --- jobs ---

    /// Inserts a job row with status `running`.
    async fn create_job(&self, job: Job) -> CoreResult<()>;

    /// Marks a pre-created (manual) job running on its assigned port.
    async fn update_job_running(&self, job_id: &str, rc_port: u16) -> CoreResult<()>;

    /// Live progress while the job remains `running`.
    async fn update_job_running_stats(
        &self,
        job_id: &str,
        bytes_done: i64,
        speed: f64,
    ) -> CoreResult<()>;

    /// Terminal transition: sets status, end time, error text, totals.
    async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        error: &str,
        bytes_done: i64,
        avg_speed: f64,
    ) -> CoreResult<()>;

    async fn get_job(&self, job_id: &str) -> CoreResult<Option<Job>>;

    /// Most recent jobs first.
    async fn list_jobs(&self, limit: usize) -> CoreResult<Vec<Job>>;

    async fn running_jobs(&self) -> CoreResult<Vec<Job>>;

    async fn realtime_summary(&self, rule_id: Option<&str>) -> CoreResult<RealtimeSummary>;

    // --- metrics ---

    /// Appends a metric sample; duplicates at the same millisecond are
    /// silently dropped.
    async fn insert_metric(&self, metric: JobMetric) -> CoreResult<()>;

    async fn latest_metric(&self, job_id: &str) -> CoreResult<Option<JobMetric>>;

    // --- quotas ---

    /// Bytes attributable to a rule since `since`: finished jobs that ended
    /// in the window plus the current `bytes_done` of running jobs.
    async fn rule_usage_since(&self, rule_id: &str, since: DateTime<Utc>) -> CoreResult<i64>;

    async fn group_usage_since(&self, group: &str, since: DateTime<Utc>) -> CoreResult<i64>;

    /// Scheduling-side usage estimate: finished bytes in the window plus
    /// the full declared size of currently transferring files, so two
    /// concurrent jobs under one quota cannot jointly overshoot.
    async fn rule_budget_since(&self, rule_id: &str, since: DateTime<Utc>) -> CoreResult<i64>;

    async fn group_budget_since(&self, group: &str, since: DateTime<Utc>) -> CoreResult<i64>;

    // --- limit groups ---

    async fn upsert_limit_group(&self, group: LimitGroup) -> CoreResult<()>;

    async fn delete_limit_group(&self, name: &str) -> CoreResult<()>;

    async fn get_limit_group(&self, name: &str) -> CoreResult<Option<LimitGroup>>;

    async fn list_limit_groups(&self) -> CoreResult<Vec<LimitGroup>>;

    // --- settings ---

    async fn runtime_settings(&self) -> CoreResult<RuntimeSettings>;

    async fn set_setting(&self, key: &str, value: &str) -> CoreResult<()>;

    // --- recovery ---

    /// Fails every still-`running` job with `error`, preserving an already
    /// recorded error text. Returns the affected job ids.
    async fn mark_running_jobs_failed(&self, error: &str) -> CoreResult<Vec<String>>;

    /// Returns any remaining `transferring` rows to queued with job ids
    /// cleared. Safety net after per-job recovery.
    async fn requeue_orphan_transferring(&self) -> CoreResult<usize>;
}
