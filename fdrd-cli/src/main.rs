//! fdrd - flight data recorder daemon for kernel trace capture.
//!
//! Reads `*.conf` files from the configuration directory, sets up one
//! kernel tracing instance per `instance` directive, and streams each
//! instance's `trace_pipe` to its configured output file until told to
//! stop.

mod error;

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use fdrd::config::{discover_config_files, load_config_files, DEFAULT_CONFIG_DIR};
use fdrd::daemon::Daemon;
use fdrd::logging::init_logging;
use fdrd::tracefs::{TraceFs, DEFAULT_TRACING_ROOT};

use error::CliError;

#[derive(Parser)]
#[command(name = "fdrd")]
#[command(version = fdrd::VERSION)]
#[command(about = "Capture kernel trace output per configured tracing instance", long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Tracing instances directory
    #[arg(short = 'd', long = "tracing-root", default_value = DEFAULT_TRACING_ROOT)]
    tracing_root: PathBuf,

    /// Configuration directory scanned for *.conf files
    #[arg(short = 'c', long = "config-dir", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Stay in the foreground instead of daemonizing
    #[arg(short = 'f', long = "foreground")]
    foreground: bool,

    /// Also write logs to this file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

fn run(args: Args) -> Result<(), CliError> {
    if !args.foreground {
        // Keep the cwd; config and output paths may be relative to it.
        nix::unistd::daemon(true, false)
            .map_err(|e| CliError::Daemonize(e.into()))?;
    }

    let _guard =
        init_logging(args.verbose, args.log_file.as_deref()).map_err(CliError::LoggingInit)?;
    info!(version = fdrd::VERSION, "fdrd starting");

    let files = discover_config_files(&args.config_dir).unwrap_or_else(|e| {
        warn!(
            dir = %args.config_dir.display(),
            error = %e,
            "could not read configuration directory"
        );
        Vec::new()
    });
    let registry = load_config_files(&files)?;
    info!(
        files = files.len(),
        instances = registry.len(),
        "configuration loaded"
    );

    let daemon = Daemon::new(TraceFs::new(&args.tracing_root));
    daemon.run(registry)?;
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        e.exit();
    }
}
