//! Catalog entities.
//!
//! The catalog is the single source of truth; everything in memory (worker
//! table, port pool, process registry) is a cache of decisions, never of
//! persistent state. Rules own their files and jobs, jobs own their metric
//! samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Where a rule's source entries come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A named remote plus path, enumerated via the transfer tool.
    Remote,
    /// A local directory walked by the daemon, optionally change-watched.
    Local,
}

/// How the child moves bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    Copy,
    Move,
}

impl TransferMode {
    /// The child CLI subcommand for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
        }
    }
}

/// Operator-defined replication policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,

    pub src_kind: SourceKind,
    /// Remote source: remote name + path (`src_kind == Remote`).
    #[serde(default)]
    pub src_remote: String,
    #[serde(default)]
    pub src_path: String,
    /// Local source root (`src_kind == Local`).
    #[serde(default)]
    pub src_local_root: String,
    /// Watch the local root for changes and nudge scans.
    #[serde(default)]
    pub local_watch: bool,

    pub dst_remote: String,
    pub dst_path: String,
    pub transfer_mode: TransferMode,

    /// Scheduling parameters.
    #[serde(default = "defaults::max_parallel_jobs")]
    pub max_parallel_jobs: usize,
    #[serde(default = "defaults::scan_interval_sec")]
    pub scan_interval_sec: u64,
    #[serde(default = "defaults::stable_seconds")]
    pub stable_seconds: i64,
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Daily byte quota; 0 = unlimited. Ignored when `limit_group` is set.
    #[serde(default)]
    pub daily_limit_bytes: i64,
    /// Named shared quota bucket; empty = none.
    #[serde(default)]
    pub limit_group: String,

    /// Tuning passed through to the child.
    #[serde(default)]
    pub bwlimit: String,
    #[serde(default)]
    pub min_file_size_bytes: i64,
    #[serde(default)]
    pub ignore_extensions: String,
    #[serde(default)]
    pub extra_args: String,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Manual rules back one-off jobs and are never scheduled.
    #[serde(default)]
    pub is_manual: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

mod defaults {
    pub fn max_parallel_jobs() -> usize {
        1
    }
    pub fn scan_interval_sec() -> u64 {
        15
    }
    pub fn stable_seconds() -> i64 {
        60
    }
    pub fn batch_size() -> usize {
        100
    }
    pub fn enabled() -> bool {
        true
    }
}

impl Rule {
    /// Validates and normalizes in place: trims identifiers, cleans remote
    /// paths, clamps parameters to their minimums.
    pub fn normalize(&mut self) -> CoreResult<()> {
        self.id = self.id.trim().to_string();
        if self.id.is_empty() {
            return Err(CoreError::config("rule id required"));
        }
        self.src_remote = self.src_remote.trim().to_string();
        self.src_path = clean_remote_path(&self.src_path);
        self.src_local_root = self.src_local_root.trim().to_string();
        self.dst_remote = self.dst_remote.trim().to_string();
        self.dst_path = clean_remote_path(&self.dst_path);
        self.bwlimit = self.bwlimit.trim().to_string();
        self.limit_group = self.limit_group.trim().to_string();

        match self.src_kind {
            SourceKind::Remote => {
                if self.src_remote.is_empty() {
                    return Err(CoreError::config("src_remote required for remote source"));
                }
                if self.src_path.is_empty() {
                    return Err(CoreError::config("src_path required for remote source"));
                }
            }
            SourceKind::Local => {
                if self.src_local_root.is_empty() {
                    return Err(CoreError::config("src_local_root required for local source"));
                }
            }
        }
        if self.dst_remote.is_empty() {
            return Err(CoreError::config("dst_remote required"));
        }
        if self.dst_path.is_empty() {
            return Err(CoreError::config("dst_path required"));
        }

        self.max_parallel_jobs = self.max_parallel_jobs.max(1);
        if self.scan_interval_sec == 0 {
            self.scan_interval_sec = defaults::scan_interval_sec();
        }
        if self.stable_seconds < 0 {
            self.stable_seconds = defaults::stable_seconds();
        }
        self.batch_size = self.batch_size.max(1);
        if self.daily_limit_bytes < 0 {
            self.daily_limit_bytes = 0;
        }
        if self.min_file_size_bytes < 0 {
            self.min_file_size_bytes = 0;
        }
        Ok(())
    }

    /// Source spec as the child CLI expects it.
    pub fn source_spec(&self) -> String {
        match self.src_kind {
            SourceKind::Local => self.src_local_root.clone(),
            SourceKind::Remote => format!("{}:{}", self.src_remote, self.src_path),
        }
    }

    /// Destination spec as the child CLI expects it.
    pub fn dest_spec(&self) -> String {
        format!("{}:{}", self.dst_remote, self.dst_path)
    }

    /// True when two snapshots describe the same effective worker config.
    ///
    /// Timestamps are excluded: a touched row with identical parameters must
    /// not restart its worker.
    pub fn same_effective_config(&self, other: &Rule) -> bool {
        self.id == other.id
            && self.src_kind == other.src_kind
            && self.src_remote == other.src_remote
            && self.src_path == other.src_path
            && self.src_local_root == other.src_local_root
            && self.local_watch == other.local_watch
            && self.dst_remote == other.dst_remote
            && self.dst_path == other.dst_path
            && self.transfer_mode == other.transfer_mode
            && self.max_parallel_jobs == other.max_parallel_jobs
            && self.scan_interval_sec == other.scan_interval_sec
            && self.stable_seconds == other.stable_seconds
            && self.batch_size == other.batch_size
            && self.daily_limit_bytes == other.daily_limit_bytes
            && self.limit_group == other.limit_group
            && self.bwlimit == other.bwlimit
            && self.min_file_size_bytes == other.min_file_size_bytes
            && self.ignore_extensions == other.ignore_extensions
            && self.extra_args == other.extra_args
            && self.enabled == other.enabled
            && self.is_manual == other.is_manual
    }
}

/// Normalizes a remote path: forward slashes, collapsed separators, a
/// leading slash, no trailing slash.
pub fn clean_remote_path(p: &str) -> String {
    let p = p.trim();
    if p.is_empty() {
        return String::new();
    }
    let mut p = p.replace('\\', "/");
    while p.contains("//") {
        p = p.replace("//", "/");
    }
    if !p.starts_with('/') {
        p.insert(0, '/');
    }
    while p.len() > 1 && p.ends_with('/') {
        p.pop();
    }
    p
}

/// Per-file state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// Observed recently; may still be changing.
    New,
    /// Unchanged long enough to transfer.
    Stable,
    /// Selected for the next job.
    Queued,
    /// Claimed by a running job.
    Transferring,
    Done,
    Failed,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Stable => "stable",
            Self::Queued => "queued",
            Self::Transferring => "transferring",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One source-relative path under a rule.
#[derive(Clone, Debug)]
pub struct FileRow {
    pub rule_id: String,
    pub path: String,
    /// Currently observed size and mtime.
    pub size: i64,
    pub mod_time: DateTime<Utc>,
    /// Snapshot from the previous scan.
    pub seen_size: i64,
    pub seen_mod_time: Option<DateTime<Utc>>,
    pub state: FileState,
    /// Set while state is queued-claimed or transferring.
    pub job_id: Option<String>,
    pub fail_count: u32,
    pub last_error: String,
    pub last_seen: DateTime<Utc>,
}

/// One scan observation.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanEntry {
    pub path: String,
    pub size: i64,
    pub mod_time: DateTime<Utc>,
}

/// Job lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
    Terminated,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// One invocation of the child transfer tool.
#[derive(Clone, Debug)]
pub struct Job {
    pub job_id: String,
    pub rule_id: String,
    pub transfer_mode: TransferMode,
    pub rc_port: u16,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub bytes_done: i64,
    pub avg_speed: f64,
    pub error: String,
    pub log_path: String,
}

/// One progress sample taken from the child's RPC endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct JobMetric {
    pub job_id: String,
    /// Millisecond precision; samples landing on the same ms deduplicate.
    pub ts: DateTime<Utc>,
    pub bytes: i64,
    pub speed: f64,
    pub transfers: i64,
    pub errors: i64,
}

/// Named quota bucket shared by many rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitGroup {
    pub name: String,
    pub daily_limit_bytes: i64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Per-rule file-state counts for dashboards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileStateCounts {
    pub new: usize,
    pub stable: usize,
    pub queued: usize,
    pub transferring: usize,
    pub done: usize,
    pub failed: usize,
}

/// Aggregate over running jobs for dashboards.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RealtimeSummary {
    pub bytes_total: i64,
    pub speed_total: f64,
    pub running_jobs: usize,
}
