//! Local change watching.
//!
//! A rule with a local source may opt into live change detection. Raw
//! filesystem events are noisy (one save can emit several), so events are
//! debounced: the first event arms a quiet-period timer and the scan
//! trigger fires once the burst settles.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Quiet period before a change burst becomes one scan trigger.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(600);

/// Watches `root` recursively and nudges `scan_trigger` after each settled
/// burst of changes, until `cancel` fires.
///
/// The trigger channel has one slot; a nudge that finds it full is dropped
/// because a scan is already pending.
pub fn spawn_local_watcher(
    rule_id: String,
    root: PathBuf,
    scan_trigger: mpsc::Sender<()>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = match notify::recommended_watcher(
            move |res: Result<Event, notify::Error>| match res {
                Ok(_) => {
                    let _ = event_tx.send(());
                }
                Err(e) => {
                    warn!(error = %e, "change watcher event error");
                }
            },
        ) {
            Ok(w) => w,
            Err(e) => {
                warn!(rule = %rule_id, error = %e, "change watcher unavailable");
                return;
            }
        };
        // Recursive mode follows directories created later, so the whole
        // tree stays covered without re-walking.
        if let Err(e) = watcher.watch(&root, RecursiveMode::Recursive) {
            warn!(rule = %rule_id, root = %root.display(), error = %e, "watch root failed");
            return;
        }
        debug!(rule = %rule_id, root = %root.display(), "change watcher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                first = event_rx.recv() => {
                    if first.is_none() {
                        break;
                    }
                    // Burst settling: keep absorbing events until the tree
                    // has been quiet for the debounce window.
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            more = event_rx.recv() => {
                                if more.is_none() {
                                    return;
                                }
                            }
                            _ = tokio::time::sleep(DEBOUNCE_WINDOW) => break,
                        }
                    }
                    if scan_trigger.try_send(()).is_ok() {
                        debug!(rule = %rule_id, "change watcher triggered scan");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_watcher_triggers_after_change() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let handle = spawn_local_watcher(
            "r1".into(),
            dir.path().to_path_buf(),
            tx,
            cancel.clone(),
        );

        // Let the watcher install before mutating the tree.
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(dir.path().join("f.txt"), b"x").unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(fired.is_ok(), "expected a debounced scan trigger");

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_watcher_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let handle = spawn_local_watcher(
            "r1".into(),
            dir.path().to_path_buf(),
            tx,
            cancel.clone(),
        );
        cancel.cancel();
        let done = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn test_watcher_missing_root_exits_cleanly() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = spawn_local_watcher(
            "r1".into(),
            PathBuf::from("/nonexistent/driftsync-watch"),
            tx,
            cancel,
        );
        let done = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(done.is_ok());
    }
}
