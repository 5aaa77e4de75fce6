//! CLI error handling.

use std::fmt;

/// Errors surfaced to the terminal.
#[derive(Debug)]
pub enum CliError {
    /// Seed config unreadable or invalid.
    Config(String),
    /// Core failure during startup or shutdown.
    Core(driftsync::error::CoreError),
    /// I/O around the CLI itself.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Core(e) => write!(f, "Daemon error: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<driftsync::error::CoreError> for CliError {
    fn from(e: driftsync::error::CoreError) -> Self {
        Self::Core(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl CliError {
    /// Prints the error and exits non-zero.
    pub fn exit(self) -> ! {
        eprintln!("Error: {}", self);
        std::process::exit(1);
    }
}
