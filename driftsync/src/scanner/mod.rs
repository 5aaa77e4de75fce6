//! Source enumeration.
//!
//! Remote sources are listed through the transfer tool's JSON listing
//! subcommand; local sources are walked directly. Both produce
//! [`ScanEntry`] values with slash-normalized paths relative to the
//! source root, with the rule's ignored extensions already filtered out.

pub mod cli;
mod watch;

pub use watch::spawn_local_watcher;

use std::path::Path;
use std::process::Stdio;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::warn;
use walkdir::WalkDir;

use crate::catalog::models::{Rule, ScanEntry, SourceKind};
use crate::catalog::settings::RuntimeSettings;
use crate::error::{CoreError, CoreResult};
use crate::extensions::{is_ignored, parse_ignore_extensions};

/// One record in the tool's `lsjson` output.
#[derive(Debug, Deserialize)]
struct ListingEntry {
    #[serde(rename = "Path", default)]
    path: String,
    #[serde(rename = "Size", default)]
    size: i64,
    #[serde(rename = "ModTime", default)]
    mod_time: String,
    #[serde(rename = "IsDir", default)]
    is_dir: bool,
}

/// Enumerates a rule's source.
pub async fn scan_rule(
    tool: &str,
    rule: &Rule,
    settings: &RuntimeSettings,
) -> CoreResult<Vec<ScanEntry>> {
    match rule.src_kind {
        SourceKind::Remote => scan_remote(tool, rule, settings).await,
        SourceKind::Local => scan_local(rule).await,
    }
}

async fn scan_remote(
    tool: &str,
    rule: &Rule,
    settings: &RuntimeSettings,
) -> CoreResult<Vec<ScanEntry>> {
    let mut cmd = Command::new(tool);
    cmd.arg("lsjson")
        .arg(rule.source_spec())
        .arg("--recursive")
        .arg("--files-only")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if !settings.config_path.is_empty() {
        cmd.arg("--config").arg(&settings.config_path);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| CoreError::transient(format!("run {tool} lsjson: {e}")))?;
    if !output.status.success() {
        let mut msg = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if msg.is_empty() {
            msg = format!("exit status {}", output.status);
        }
        return Err(CoreError::transient(format!("{tool} lsjson: {msg}")));
    }

    let listing: Vec<ListingEntry> = serde_json::from_slice(&output.stdout)
        .map_err(|e| CoreError::transient(format!("decode lsjson output: {e}")))?;

    let ignore = parse_ignore_extensions(&rule.ignore_extensions);
    let now = Utc::now();
    let mut out = Vec::with_capacity(listing.len());
    for entry in listing {
        if entry.is_dir || entry.path.is_empty() {
            continue;
        }
        let Some(path) = normalize_path(&entry.path) else {
            continue;
        };
        if is_ignored(&path, &ignore) {
            continue;
        }
        out.push(ScanEntry {
            path,
            size: entry.size,
            mod_time: parse_mod_time(&entry.mod_time, now),
        });
    }
    Ok(out)
}

async fn scan_local(rule: &Rule) -> CoreResult<Vec<ScanEntry>> {
    let root = rule.src_local_root.clone();
    let ignore = parse_ignore_extensions(&rule.ignore_extensions);
    tokio::task::spawn_blocking(move || walk_local(&root, &ignore))
        .await
        .map_err(|e| CoreError::transient(format!("local scan task: {e}")))?
}

fn walk_local(root: &str, ignore: &[String]) -> CoreResult<Vec<ScanEntry>> {
    let root_path = Path::new(root);
    let mut out = Vec::new();
    for entry in WalkDir::new(root_path).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(root, error = %e, "local scan: skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(root_path) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => continue,
        };
        let Some(path) = normalize_path(&rel) else {
            continue;
        };
        if is_ignored(&path, ignore) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(root, path, error = %e, "local scan: stat failed");
                continue;
            }
        };
        let mod_time = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        out.push(ScanEntry {
            path,
            size: meta.len() as i64,
            mod_time,
        });
    }
    Ok(out)
}

/// Slash-normalizes a listing path and strips leading separators. Returns
/// `None` when nothing remains.
fn normalize_path(raw: &str) -> Option<String> {
    let p = raw
        .trim_start_matches(['/', '\\'])
        .replace('\\', "/");
    if p.is_empty() {
        None
    } else {
        Some(p)
    }
}

/// Parses the listing's `ModTime`, high-precision first; substitutes `now`
/// when the field is absent or malformed.
fn parse_mod_time(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}
