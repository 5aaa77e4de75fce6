//! Per-file state transitions.
//!
//! Scans observe `(path, size, mod_time)` triples; these functions decide
//! what each observation does to the file's state. Keeping the math here,
//! out of any particular catalog implementation, means every store applies
//! identical semantics and the transitions can be tested exhaustively.
//!
//! The lifecycle is `new → stable → queued → transferring → {done, failed}`.
//! Only scans move files between the passive states; promotion (stable →
//! queued) and claiming (queued → transferring) are separate catalog
//! operations driven by the scheduler.

use chrono::{DateTime, Utc};

use crate::catalog::models::{FileRow, FileState, ScanEntry};

/// State for a path seen for the first time.
///
/// A file younger than the rule's stability window may still be written to,
/// so it starts as `new` and must survive a rescan unchanged (or age out)
/// before becoming eligible.
pub fn initial_state(now: DateTime<Utc>, entry: &ScanEntry, stable_seconds: i64) -> FileState {
    if age_seconds(now, entry.mod_time) < stable_seconds {
        FileState::New
    } else {
        FileState::Stable
    }
}

/// State for a path that already has a row.
///
/// Active rows (`queued`, `transferring`) are never touched by scans.
/// A `done` row leaves `done` only when the observation differs from what
/// was transferred; a `failed` row stays parked until it changes or an
/// operator retries it. For passive rows, an unchanged snapshot or an aged
/// mtime means stable; anything else is still settling.
pub fn observed_state(
    now: DateTime<Utc>,
    prior: &FileRow,
    entry: &ScanEntry,
    stable_seconds: i64,
) -> FileState {
    let changed = entry.size != prior.size || entry.mod_time != prior.mod_time;
    match prior.state {
        FileState::Transferring | FileState::Queued => prior.state,
        FileState::Done => {
            if changed {
                FileState::New
            } else {
                FileState::Done
            }
        }
        FileState::Failed => {
            if !changed {
                FileState::Failed
            } else if age_seconds(now, entry.mod_time) > stable_seconds {
                FileState::Stable
            } else {
                FileState::New
            }
        }
        FileState::New | FileState::Stable => {
            if !changed || age_seconds(now, entry.mod_time) > stable_seconds {
                FileState::Stable
            } else {
                FileState::New
            }
        }
    }
}

fn age_seconds(now: DateTime<Utc>, mod_time: DateTime<Utc>) -> i64 {
    (now - mod_time).num_seconds()
}
