//! FDRD - Flight Data Recorder Daemon
//!
//! This library provides always-on, crash-durable capture of kernel
//! function-tracer output. Each configured tracing instance gets its own
//! execution context that prepares the instance's control directory,
//! toggles probes, and streams `trace_pipe` to a file while enforcing
//! size quotas, a free-space floor, and logrotate coordination.
//!
//! # High-Level Flow
//!
//! ```ignore
//! use fdrd::config::{discover_config_files, load_config_files};
//! use fdrd::daemon::Daemon;
//! use fdrd::tracefs::TraceFs;
//!
//! let paths = discover_config_files("/etc/fdr.d".as_ref())?;
//! let registry = load_config_files(&paths)?;
//!
//! // Spawns one context per instance, runs until SIGTERM/SIGINT.
//! Daemon::new(TraceFs::default()).run(registry)?;
//! ```

pub mod capture;
pub mod config;
pub mod daemon;
pub mod instance;
pub mod logging;
pub mod supervisor;
pub mod tracefs;

/// Version of the fdrd library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
