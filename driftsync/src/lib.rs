//! Driftsync - rule-driven sync orchestration
//!
//! This library keeps configured source locations replicated into
//! destination locations by driving an external transfer tool: rules are
//! scanned into a per-file state machine, eligible files are batched into
//! jobs, and each job supervises one child process through its local RPC
//! endpoint and append-only transfer log.
//!
//! # High-Level API
//!
//! The [`supervisor`] module is the entry point for a running daemon:
//!
//! ```ignore
//! use driftsync::admission::GlobalJobLimiter;
//! use driftsync::catalog::MemoryCatalog;
//! use driftsync::executor::ExecContext;
//! use driftsync::ports::PortPool;
//! use driftsync::registry::ProcessRegistry;
//! use driftsync::supervisor::Supervisor;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let catalog = Arc::new(MemoryCatalog::new());
//! driftsync::recovery::recover_dangling_runs(&(catalog.clone() as _)).await?;
//!
//! let ctx = Arc::new(ExecContext::new(
//!     catalog,
//!     Arc::new(PortPool::new(55720, 55800)),
//!     Arc::new(GlobalJobLimiter::new(0)),
//!     Arc::new(ProcessRegistry::new()),
//! ));
//! let supervisor = Supervisor::new(ctx, CancellationToken::new());
//! supervisor.run().await;
//! ```

pub mod admission;
pub mod catalog;
pub mod cliargs;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod id;
pub mod janitor;
pub mod logging;
pub mod ports;
pub mod rc;
pub mod recovery;
pub mod registry;
pub mod scanner;
pub mod sizeparse;
pub mod statemachine;
pub mod supervisor;
pub mod transfer_log;
pub mod worker;

/// Version of the driftsync library and daemon.
///
/// Synchronized across the workspace; injected at compile time from
/// `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
