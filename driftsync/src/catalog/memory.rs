//! In-memory reference catalog.
//!
//! One mutex over the whole store: every operation is trivially
//! serializable, which is exactly the contract the core demands of a real
//! catalog. Tests run against this implementation, and the demo daemon
//! seeds one from its config file.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::catalog::models::{
    FileRow, FileState, FileStateCounts, Job, JobMetric, JobStatus, LimitGroup, RealtimeSummary,
    Rule, ScanEntry,
};
use crate::catalog::settings::RuntimeSettings;
use crate::catalog::Catalog;
use crate::error::CoreResult;
use crate::statemachine;

#[derive(Default)]
struct Inner {
    rules: HashMap<String, Rule>,
    /// Keyed `(rule_id, path)`.
    files: BTreeMap<(String, String), FileRow>,
    jobs: HashMap<String, Job>,
    /// Per job, keyed by sample millisecond.
    metrics: HashMap<String, BTreeMap<i64, JobMetric>>,
    groups: HashMap<String, LimitGroup>,
    settings: HashMap<String, String>,
}

/// Reference [`Catalog`] backed by process memory.
#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<Inner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Paths of a rule's files in the scheduler's claim order: newest
/// `last_seen` first, ties broken by path so runs are deterministic.
fn ordered_paths<'a>(
    files: impl Iterator<Item = &'a FileRow>,
    state: FileState,
    min_size: i64,
) -> Vec<String> {
    let mut rows: Vec<(&DateTime<Utc>, &String)> = files
        .filter(|f| f.state == state && f.size >= min_size)
        .map(|f| (&f.last_seen, &f.path))
        .collect();
    rows.sort_by(|a, b| b.0.cmp(a.0).then_with(|| a.1.cmp(b.1)));
    rows.into_iter().map(|(_, p)| p.clone()).collect()
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn upsert_rule(&self, mut rule: Rule) -> CoreResult<()> {
        rule.normalize()?;
        rule.updated_at = Utc::now();
        self.lock().rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn delete_rule(&self, rule_id: &str) -> CoreResult<()> {
        let mut inner = self.lock();
        inner.rules.remove(rule_id);
        inner.files.retain(|(rid, _), _| rid != rule_id);
        let dead: Vec<String> = inner
            .jobs
            .values()
            .filter(|j| j.rule_id == rule_id)
            .map(|j| j.job_id.clone())
            .collect();
        for job_id in dead {
            inner.jobs.remove(&job_id);
            inner.metrics.remove(&job_id);
        }
        Ok(())
    }

    async fn get_rule(&self, rule_id: &str) -> CoreResult<Option<Rule>> {
        Ok(self.lock().rules.get(rule_id).cloned())
    }

    async fn list_rules(&self) -> CoreResult<Vec<Rule>> {
        let mut rules: Vec<Rule> = self.lock().rules.values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }

    async fn list_enabled_rules(&self) -> CoreResult<Vec<Rule>> {
        let mut rules = self.list_rules().await?;
        rules.retain(|r| r.enabled && !r.is_manual);
        Ok(rules)
    }

    async fn upsert_scan_entries(&self, rule: &Rule, entries: &[ScanEntry]) -> CoreResult<()> {
        let now = Utc::now();
        let stable_seconds = rule.stable_seconds.max(0);
        let mut inner = self.lock();
        for entry in entries {
            let key = (rule.id.clone(), entry.path.clone());
            match inner.files.get_mut(&key) {
                Some(row) => {
                    row.state = statemachine::observed_state(now, row, entry, stable_seconds);
                    row.seen_size = row.size;
                    row.seen_mod_time = Some(row.mod_time);
                    row.size = entry.size;
                    row.mod_time = entry.mod_time;
                    row.last_seen = now;
                }
                None => {
                    inner.files.insert(
                        key,
                        FileRow {
                            rule_id: rule.id.clone(),
                            path: entry.path.clone(),
                            size: entry.size,
                            mod_time: entry.mod_time,
                            seen_size: 0,
                            seen_mod_time: None,
                            state: statemachine::initial_state(now, entry, stable_seconds),
                            job_id: None,
                            fail_count: 0,
                            last_error: String::new(),
                            last_seen: now,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn enqueue_stable(
        &self,
        rule_id: &str,
        limit: usize,
        min_size: i64,
    ) -> CoreResult<usize> {
        let mut inner = self.lock();
        let picks = ordered_paths(
            inner.files.values().filter(|f| f.rule_id == rule_id),
            FileState::Stable,
            min_size,
        );
        let mut promoted = 0;
        for path in picks.into_iter().take(limit) {
            if let Some(row) = inner.files.get_mut(&(rule_id.to_string(), path)) {
                row.state = FileState::Queued;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn has_queued(&self, rule_id: &str) -> CoreResult<bool> {
        let inner = self.lock();
        Ok(inner
            .files
            .values()
            .any(|f| f.rule_id == rule_id && f.state == FileState::Queued))
    }

    async fn claim_queued(
        &self,
        rule_id: &str,
        job_id: &str,
        limit: usize,
    ) -> CoreResult<Vec<String>> {
        let mut inner = self.lock();
        let picks = ordered_paths(
            inner
                .files
                .values()
                .filter(|f| f.rule_id == rule_id && f.job_id.is_none()),
            FileState::Queued,
            i64::MIN,
        );
        let mut claimed = Vec::new();
        for path in picks.into_iter().take(limit) {
            if let Some(row) = inner.files.get_mut(&(rule_id.to_string(), path.clone())) {
                row.state = FileState::Transferring;
                row.job_id = Some(job_id.to_string());
                claimed.push(path);
            }
        }
        Ok(claimed)
    }

    async fn release_claimed(&self, job_id: &str) -> CoreResult<()> {
        let mut inner = self.lock();
        for row in inner.files.values_mut() {
            if row.job_id.as_deref() == Some(job_id) && row.state == FileState::Transferring {
                row.state = FileState::Queued;
                row.job_id = None;
            }
        }
        Ok(())
    }

    async fn finalize_job_files(
        &self,
        job_id: &str,
        done_paths: &[String],
        fallback: FileState,
        error: &str,
    ) -> CoreResult<()> {
        let mut inner = self.lock();
        for row in inner.files.values_mut() {
            if row.job_id.as_deref() != Some(job_id) {
                continue;
            }
            row.job_id = None;
            if done_paths.iter().any(|p| p == &row.path) {
                row.state = FileState::Done;
                row.last_error.clear();
            } else {
                row.state = fallback;
                if !error.is_empty() {
                    row.last_error = error.to_string();
                    row.fail_count += 1;
                }
            }
        }
        Ok(())
    }

    async fn retry_failed(&self, rule_id: &str, limit: usize) -> CoreResult<usize> {
        let mut inner = self.lock();
        let picks = ordered_paths(
            inner.files.values().filter(|f| f.rule_id == rule_id),
            FileState::Failed,
            i64::MIN,
        );
        let mut moved = 0;
        for path in picks.into_iter().take(limit) {
            if let Some(row) = inner.files.get_mut(&(rule_id.to_string(), path)) {
                row.state = FileState::Queued;
                row.job_id = None;
                row.last_error.clear();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn job_files_size(&self, job_id: &str) -> CoreResult<i64> {
        let inner = self.lock();
        Ok(inner
            .files
            .values()
            .filter(|f| f.job_id.as_deref() == Some(job_id))
            .map(|f| f.size)
            .sum())
    }

    async fn file_row(&self, rule_id: &str, path: &str) -> CoreResult<Option<FileRow>> {
        let inner = self.lock();
        Ok(inner
            .files
            .get(&(rule_id.to_string(), path.to_string()))
            .cloned())
    }

    async fn rule_file_counts(&self, rule_id: &str) -> CoreResult<FileStateCounts> {
        let inner = self.lock();
        let mut counts = FileStateCounts::default();
        for row in inner.files.values().filter(|f| f.rule_id == rule_id) {
            match row.state {
                FileState::New => counts.new += 1,
                FileState::Stable => counts.stable += 1,
                FileState::Queued => counts.queued += 1,
                FileState::Transferring => counts.transferring += 1,
                FileState::Done => counts.done += 1,
                FileState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn create_job(&self, job: Job) -> CoreResult<()> {
        self.lock().jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn update_job_running(&self, job_id: &str, rc_port: u16) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.status = JobStatus::Running;
            job.rc_port = rc_port;
        }
        Ok(())
    }

    async fn update_job_running_stats(
        &self,
        job_id: &str,
        bytes_done: i64,
        speed: f64,
    ) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.get_mut(job_id) {
            if job.status == JobStatus::Running {
                job.bytes_done = bytes_done;
                job.avg_speed = speed;
            }
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        error: &str,
        bytes_done: i64,
        avg_speed: f64,
    ) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.status = status;
            job.ended_at = Some(Utc::now());
            job.error = error.to_string();
            job.bytes_done = bytes_done;
            job.avg_speed = avg_speed;
        }
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> CoreResult<Option<Job>> {
        Ok(self.lock().jobs.get(job_id).cloned())
    }

    async fn list_jobs(&self, limit: usize) -> CoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self.lock().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.job_id.cmp(&b.job_id)));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn running_jobs(&self) -> CoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .lock()
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(jobs)
    }

    async fn realtime_summary(&self, rule_id: Option<&str>) -> CoreResult<RealtimeSummary> {
        let inner = self.lock();
        let mut summary = RealtimeSummary::default();
        for job in inner.jobs.values() {
            if rule_id.is_some_and(|rid| rid != job.rule_id) {
                continue;
            }
            summary.bytes_total += job.bytes_done;
            if job.status == JobStatus::Running {
                summary.speed_total += job.avg_speed;
                summary.running_jobs += 1;
            }
        }
        Ok(summary)
    }

    async fn insert_metric(&self, metric: JobMetric) -> CoreResult<()> {
        let mut inner = self.lock();
        inner
            .metrics
            .entry(metric.job_id.clone())
            .or_default()
            .entry(metric.ts.timestamp_millis())
            .or_insert(metric);
        Ok(())
    }

    async fn latest_metric(&self, job_id: &str) -> CoreResult<Option<JobMetric>> {
        let inner = self.lock();
        Ok(inner
            .metrics
            .get(job_id)
            .and_then(|samples| samples.values().next_back().cloned()))
    }

    async fn rule_usage_since(&self, rule_id: &str, since: DateTime<Utc>) -> CoreResult<i64> {
        let inner = self.lock();
        Ok(usage(inner.jobs.values().filter(|j| j.rule_id == rule_id), since))
    }

    async fn group_usage_since(&self, group: &str, since: DateTime<Utc>) -> CoreResult<i64> {
        if group.is_empty() {
            return Ok(0);
        }
        let inner = self.lock();
        let member_jobs = inner.jobs.values().filter(|j| {
            inner
                .rules
                .get(&j.rule_id)
                .is_some_and(|r| r.limit_group == group)
        });
        Ok(usage(member_jobs, since))
    }

    async fn rule_budget_since(&self, rule_id: &str, since: DateTime<Utc>) -> CoreResult<i64> {
        let inner = self.lock();
        let ended = ended_bytes(inner.jobs.values().filter(|j| j.rule_id == rule_id), since);
        let inflight: i64 = inner
            .files
            .values()
            .filter(|f| f.rule_id == rule_id && f.state == FileState::Transferring)
            .map(|f| f.size)
            .sum();
        Ok(ended + inflight)
    }

    async fn group_budget_since(&self, group: &str, since: DateTime<Utc>) -> CoreResult<i64> {
        if group.is_empty() {
            return Ok(0);
        }
        let inner = self.lock();
        let in_group = |rule_id: &str| {
            inner
                .rules
                .get(rule_id)
                .is_some_and(|r| r.limit_group == group)
        };
        let ended = ended_bytes(
            inner.jobs.values().filter(|j| in_group(&j.rule_id)),
            since,
        );
        let inflight: i64 = inner
            .files
            .values()
            .filter(|f| f.state == FileState::Transferring && in_group(&f.rule_id))
            .map(|f| f.size)
            .sum();
        Ok(ended + inflight)
    }

    async fn upsert_limit_group(&self, mut group: LimitGroup) -> CoreResult<()> {
        group.name = group.name.trim().to_string();
        if group.name.is_empty() {
            return Err(crate::error::CoreError::config("group name required"));
        }
        group.daily_limit_bytes = group.daily_limit_bytes.max(0);
        group.updated_at = Utc::now();
        self.lock().groups.insert(group.name.clone(), group);
        Ok(())
    }

    async fn delete_limit_group(&self, name: &str) -> CoreResult<()> {
        self.lock().groups.remove(name);
        Ok(())
    }

    async fn get_limit_group(&self, name: &str) -> CoreResult<Option<LimitGroup>> {
        Ok(self.lock().groups.get(name).cloned())
    }

    async fn list_limit_groups(&self) -> CoreResult<Vec<LimitGroup>> {
        let mut groups: Vec<LimitGroup> = self.lock().groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn runtime_settings(&self) -> CoreResult<RuntimeSettings> {
        Ok(RuntimeSettings::from_map(&self.lock().settings))
    }

    async fn set_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        self.lock()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn mark_running_jobs_failed(&self, error: &str) -> CoreResult<Vec<String>> {
        let now = Utc::now();
        let mut inner = self.lock();
        let mut failed = Vec::new();
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Failed;
                job.ended_at = Some(now);
                if job.error.is_empty() {
                    job.error = error.to_string();
                }
                failed.push(job.job_id.clone());
            }
        }
        failed.sort();
        Ok(failed)
    }

    async fn requeue_orphan_transferring(&self) -> CoreResult<usize> {
        let mut inner = self.lock();
        let mut moved = 0;
        for row in inner.files.values_mut() {
            if row.state == FileState::Transferring {
                row.state = FileState::Queued;
                row.job_id = None;
                moved += 1;
            }
        }
        Ok(moved)
    }
}

fn usage<'a>(jobs: impl Iterator<Item = &'a Job>, since: DateTime<Utc>) -> i64 {
    jobs.filter(|j| {
        j.status == JobStatus::Running || j.ended_at.is_some_and(|ended| ended >= since)
    })
    .map(|j| j.bytes_done)
    .sum()
}

fn ended_bytes<'a>(jobs: impl Iterator<Item = &'a Job>, since: DateTime<Utc>) -> i64 {
    jobs.filter(|j| {
        j.status != JobStatus::Running && j.ended_at.is_some_and(|ended| ended >= since)
    })
    .map(|j| j.bytes_done)
    .sum()
}
