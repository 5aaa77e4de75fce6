//! Logging infrastructure.
//!
//! Structured logging via `tracing`: a console layer always, plus a
//! non-blocking file layer when a log directory is configured. Filtering
//! honors `RUST_LOG` and defaults to `info`.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keep this alive for the daemon's lifetime; dropping it flushes and
/// closes the file writer.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Daemon log file name inside the log directory.
pub const DAEMON_LOG_FILE: &str = "driftsyncd.log";

/// Initializes the global subscriber.
///
/// With a log directory, daemon logs also land in
/// `<log_dir>/driftsyncd.log` (distinct from the per-job transfer logs the
/// child processes write underneath the same directory).
pub fn init_logging(log_dir: Option<&str>) -> io::Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true);

    let (file_layer, file_guard) = match log_dir {
        Some(dir) if !dir.is_empty() => {
            std::fs::create_dir_all(Path::new(dir))?;
            let appender = tracing_appender::rolling::never(dir, DAEMON_LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    // A subscriber may already be installed (embedding application,
    // repeated init in one process); keep the first one in that case.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
