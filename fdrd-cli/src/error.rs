//! CLI error handling with per-cause exit codes.
//!
//! Monitoring tells failure causes apart by exit code alone, so each
//! fatal class maps to a distinct code. Usage errors are the one
//! exception: clap prints its own diagnostic and exits 2 before any of
//! this runs.

use std::fmt;
use std::process;

use fdrd::config::ConfigError;
use fdrd::daemon::DaemonError;
use fdrd::supervisor::FatalCode;

/// Fatal errors surfaced by the CLI before or during daemon startup.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Failed to detach from the controlling terminal
    Daemonize(std::io::Error),
    /// Configuration could not be loaded
    Config(ConfigError),
    /// Daemon startup failed
    Daemon(DaemonError),
}

impl CliError {
    pub fn fatal_code(&self) -> FatalCode {
        match self {
            CliError::LoggingInit(_) => FatalCode::LogOpen,
            CliError::Daemonize(_) => FatalCode::System,
            CliError::Config(ConfigError::UnknownVerb { .. }) => FatalCode::BadVerb,
            CliError::Config(_) => FatalCode::Syntax,
            CliError::Daemon(e) => e.fatal_code(),
        }
    }

    /// Print the error and exit with its code.
    pub fn exit(&self) -> ! {
        eprintln!("fdrd: {}", self);
        process::exit(self.fatal_code().code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "failed to initialize logging: {}", e),
            CliError::Daemonize(e) => write!(f, "failed to daemonize: {}", e),
            CliError::Config(e) => write!(f, "configuration error: {}", e),
            CliError::Daemon(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) | CliError::Daemonize(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Daemon(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<DaemonError> for CliError {
    fn from(e: DaemonError) -> Self {
        CliError::Daemon(e)
    }
}
