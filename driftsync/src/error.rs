//! Core error types.

use thiserror::Error;

/// Errors surfaced by the core.
///
/// Scheduling-side failures (scan, poll, catalog hiccups) are transient: the
/// caller logs them and the next tick retries. Configuration failures are
/// surfaced to the caller and cause no state change.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed rule, bad size literal, invalid extra arguments.
    #[error("config: {0}")]
    Config(String),

    /// Retryable I/O: catalog access, scan subprocess, RPC poll.
    #[error("transient: {0}")]
    Transient(String),

    /// The remote-control port range is exhausted.
    #[error("no free rc port in range {start}-{end}")]
    NoPortAvailable { start: u16, end: u16 },

    /// Filesystem error while preparing or cleaning job artifacts.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The child transfer process could not be spawned.
    #[error("spawn transfer tool: {0}")]
    Spawn(String),
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;
