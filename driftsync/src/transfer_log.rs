//! Transfer-log parsing.
//!
//! The child process appends lines of the form
//! `YYYY/MM/DD HH:MM:SS LEVEL : <path> : <marker> ...` to its log file. The
//! `Copied` / `Moved` / `Skipped` markers are the authoritative per-file
//! completion record: live RPC reports progress, but only the log survives
//! the process, so both the executor's post-exit reconciliation and crash
//! recovery read it.
//!
//! [`LogCursor`] keeps an incremental per-job cache so that polling a large
//! log during a long run only parses the appended bytes.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

const COMPLETION_MARKERS: [&str; 3] = [": Copied", ": Moved", ": Skipped"];

const NOTHING_TO_TRANSFER: [&str; 3] = [
    "There was nothing to transfer",
    "There was nothing to copy",
    "There was nothing to move",
];

/// Extracts the source-relative path from one completed-transfer line.
///
/// Marker detection uses the last occurrence so embedded colons in the path
/// are tolerated. The path is everything between the level separator
/// (`" : "` preferred, `": "` fallback) and the marker, with backslashes
/// normalized to slashes.
pub fn parse_transferred_line(line: &str) -> Option<String> {
    let line = line.trim_end_matches('\r');
    let mut idx: Option<usize> = None;
    for marker in COMPLETION_MARKERS {
        if let Some(j) = line.rfind(marker) {
            if idx.map_or(true, |cur| j > cur) {
                idx = Some(j);
            }
        }
    }
    let idx = idx?;
    if idx == 0 {
        return None;
    }
    let mut head = line[..idx].trim();
    if let Some(j) = head.rfind(" : ") {
        head = &head[j + 3..];
    } else if let Some(j) = head.rfind(": ") {
        head = &head[j + 2..];
    }
    let p = head.trim().replace('\\', "/");
    if p.is_empty() {
        None
    } else {
        Some(p)
    }
}

/// Parses the whole log and returns the set of completed paths.
pub fn transferred_paths(log_path: &Path) -> io::Result<HashSet<String>> {
    let file = File::open(log_path)?;
    let mut done = HashSet::new();
    for line in BufReader::new(file).lines() {
        if let Some(p) = parse_transferred_line(&line?) {
            done.insert(p);
        }
    }
    Ok(done)
}

/// Returns true when the log records a successful no-op run.
///
/// A child that finds everything already present at the destination exits 0
/// without per-path lines; without this signal an identical batch would
/// re-queue forever.
pub fn had_nothing_to_transfer(log_path: &Path) -> bool {
    let Ok(file) = File::open(log_path) else {
        return false;
    };
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { return false };
        if NOTHING_TO_TRANSFER.iter().any(|m| line.contains(m)) {
            return true;
        }
    }
    false
}

#[derive(Default)]
struct CursorEntry {
    log_path: PathBuf,
    offset: u64,
    carry: String,
    done: HashSet<String>,
    last_size: u64,
    last_mtime: Option<SystemTime>,
}

/// Incremental per-job log reader.
///
/// Each `(job_id, log_path)` pair is cached by `(size, mtime)` and byte
/// offset; repeated polls parse only appended bytes. A shrinking file means
/// rotation or truncation and resets the cache. Partial trailing lines are
/// kept in a carry buffer across polls.
#[derive(Default)]
pub struct LogCursor {
    cache: Mutex<HashMap<String, CursorEntry>>,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completed paths recorded so far for one job's log.
    pub fn done_paths(&self, job_id: &str, log_path: &Path) -> io::Result<HashSet<String>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let entry = cache.entry(job_id.to_string()).or_default();
        if entry.log_path != log_path {
            *entry = CursorEntry {
                log_path: log_path.to_path_buf(),
                ..CursorEntry::default()
            };
        }

        let meta = match std::fs::metadata(log_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e),
        };
        let size = meta.len();
        let mtime = meta.modified().ok();
        if size == entry.last_size && mtime == entry.last_mtime && entry.last_mtime.is_some() {
            return Ok(entry.done.clone());
        }

        if size < entry.offset {
            entry.offset = 0;
            entry.carry.clear();
            entry.done.clear();
        }

        let mut file = match File::open(log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e),
        };
        if entry.offset > 0 && file.seek(SeekFrom::Start(entry.offset)).is_err() {
            entry.offset = 0;
            entry.carry.clear();
            entry.done.clear();
            file.seek(SeekFrom::Start(0))?;
        }

        let mut appended = String::new();
        file.take(size.saturating_sub(entry.offset))
            .read_to_string(&mut appended)?;

        let mut buf = std::mem::take(&mut entry.carry);
        buf.push_str(&appended);
        let mut rest = buf.as_str();
        while let Some(nl) = rest.find('\n') {
            let (line, tail) = rest.split_at(nl);
            if let Some(p) = parse_transferred_line(line) {
                entry.done.insert(p);
            }
            rest = &tail[1..];
        }
        entry.carry = rest.to_string();
        entry.offset = size;
        entry.last_size = size;
        entry.last_mtime = mtime;
        Ok(entry.done.clone())
    }

    /// Drops the cached state for a finished job.
    pub fn forget(&self, job_id: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.remove(job_id);
    }
}
