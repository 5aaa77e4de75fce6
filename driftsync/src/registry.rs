//! Live process registry.
//!
//! Maps job ids to handles on running child processes so an operator can
//! terminate a specific job. The handle's flag lets the executor tell an
//! operator kill apart from an ordinary cancellation after the child exits:
//! both paths kill the same process, but they finalize with different
//! status text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Handle on one running child process.
///
/// The executor owns the `tokio` child; the registry only needs an edge to
/// request the kill ([`ProcessHandle::kill`]) and a flag recording that the
/// request came from an operator.
#[derive(Default)]
pub struct ProcessHandle {
    terminated: AtomicBool,
    kill: CancellationToken,
}

impl ProcessHandle {
    /// True once an operator asked for this job to die.
    pub fn terminated_by_user(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Fires when the process should be killed.
    pub fn kill_requested(&self) -> &CancellationToken {
        &self.kill
    }
}

/// Registry of live jobs.
#[derive(Default)]
pub struct ProcessRegistry {
    handles: DashMap<String, Arc<ProcessHandle>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly spawned job and returns its handle.
    pub fn register(&self, job_id: &str) -> Arc<ProcessHandle> {
        let handle = Arc::new(ProcessHandle::default());
        self.handles.insert(job_id.to_string(), handle.clone());
        handle
    }

    /// Removes the handle at child exit.
    pub fn unregister(&self, job_id: &str) {
        self.handles.remove(job_id);
    }

    /// Requests termination of a running job.
    ///
    /// Sets the terminated-by-user flag before firing the kill edge so the
    /// executor observes the flag no matter how quickly the child dies.
    /// Returns false when no live handle exists for the id.
    pub fn terminate(&self, job_id: &str) -> bool {
        match self.handles.get(job_id) {
            Some(handle) => {
                handle.terminated.store(true, Ordering::Release);
                handle.kill.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of live jobs.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_terminate_unregister() {
        let registry = ProcessRegistry::new();
        let handle = registry.register("job-1");
        assert!(!handle.terminated_by_user());
        assert!(!handle.kill_requested().is_cancelled());

        assert!(registry.terminate("job-1"));
        assert!(handle.terminated_by_user());
        assert!(handle.kill_requested().is_cancelled());

        registry.unregister("job-1");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_terminate_unknown_job() {
        let registry = ProcessRegistry::new();
        assert!(!registry.terminate("nope"));
    }

    #[test]
    fn test_handle_survives_unregister() {
        let registry = ProcessRegistry::new();
        let handle = registry.register("job-1");
        registry.unregister("job-1");
        // The executor still holds the Arc and can read the flag.
        assert!(!handle.terminated_by_user());
        assert!(!registry.terminate("job-1"));
    }
}
