//! Daemon lifecycle: signal wiring, context spawn, shutdown cleanup.
//!
//! SIGTERM and SIGINT handlers do nothing but raise a flag; all
//! teardown happens on the coordinator's ordinary control path. SIGHUP
//! is fanned out to every context's rotation pipe before any context
//! spawns, so the handler only ever touches frozen data.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::{install_sighup_fan_out, RotationSignal, DEFAULT_LOGROTATE_DIR};
use crate::instance::Registry;
use crate::supervisor::{spawn_context, ContextError, FatalCode, Runtime};
use crate::tracefs::TraceFs;

static TERMINATE: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_terminate(_: libc::c_int) {
    TERMINATE.store(true, Ordering::Relaxed);
}

/// Ask the coordinator to shut down, exactly as SIGTERM does.
pub fn request_termination() {
    TERMINATE.store(true, Ordering::Relaxed);
}

pub fn termination_requested() -> bool {
    TERMINATE.load(Ordering::Relaxed)
}

/// Coordinator failures; each carries a distinct process exit code.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to spawn context for instance {instance}: {source}")]
    Spawn {
        instance: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install signal handling: {source}")]
    Signal {
        #[source]
        source: std::io::Error,
    },
}

impl DaemonError {
    pub fn fatal_code(&self) -> FatalCode {
        match self {
            Self::Spawn { .. } => FatalCode::Spawn,
            Self::Signal { .. } => FatalCode::System,
        }
    }
}

/// Owns the spawned contexts and the shutdown sequence.
pub struct Daemon {
    tracefs: TraceFs,
    logrotate_dir: PathBuf,
}

impl Daemon {
    pub fn new(tracefs: TraceFs) -> Self {
        Self::with_logrotate_dir(tracefs, DEFAULT_LOGROTATE_DIR)
    }

    pub fn with_logrotate_dir(tracefs: TraceFs, logrotate_dir: impl Into<PathBuf>) -> Self {
        Self {
            tracefs,
            logrotate_dir: logrotate_dir.into(),
        }
    }

    /// Run every configured instance until termination is requested or
    /// all contexts finish on their own.
    pub fn run(&self, registry: Registry) -> Result<(), DaemonError> {
        let instances = registry.into_instances();
        if instances.is_empty() {
            warn!("no instances configured, nothing to do");
            return Ok(());
        }

        install_termination_handlers().map_err(|source| DaemonError::Signal { source })?;

        let mut signals = Vec::with_capacity(instances.len());
        for _ in &instances {
            signals.push(RotationSignal::new().map_err(|source| DaemonError::Signal { source })?);
        }
        install_sighup_fan_out(&signals).map_err(|source| DaemonError::Signal { source })?;

        let mut names = Vec::with_capacity(instances.len());
        let mut contexts = Vec::with_capacity(instances.len());
        for (instance, signal) in instances.into_iter().zip(signals) {
            let runtime =
                Runtime::with_logrotate_dir(self.tracefs.clone(), signal, &self.logrotate_dir);
            names.push(instance.name.clone());
            let name = instance.name.clone();
            let handle = spawn_context(instance, runtime)
                .map_err(|source| DaemonError::Spawn {
                    instance: name,
                    source,
                })?;
            contexts.push(handle);
        }
        info!(contexts = contexts.len(), "daemon running");

        while !termination_requested() {
            if contexts.iter().all(JoinHandle::is_finished) {
                info!("all contexts finished");
                break;
            }
            std::thread::sleep(Duration::from_millis(200));
        }

        info!("shutting down");
        shutdown_cleanup(&self.tracefs, &names);
        reap_contexts(&names, contexts);
        Ok(())
    }
}

fn install_termination_handlers() -> std::io::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_terminate),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGTERM, &action)?;
        sigaction(Signal::SIGINT, &action)?;
    }
    Ok(())
}

/// Remove every instance's tracing directory. Directories that are
/// already gone are tolerated.
fn shutdown_cleanup(tracefs: &TraceFs, names: &[String]) {
    for name in names {
        tracefs.remove_instance(name);
    }
}

/// Collect outcomes from finished contexts. A context still blocked in
/// its capture read is left behind; the process is exiting anyway.
fn reap_contexts(names: &[String], contexts: Vec<JoinHandle<Result<(), ContextError>>>) {
    for (name, handle) in names.iter().zip(contexts) {
        if !handle.is_finished() {
            debug!(instance = name, "context still capturing, not joining");
            continue;
        }
        match handle.join() {
            Ok(Ok(())) => debug!(instance = name, "context exited cleanly"),
            Ok(Err(e)) => warn!(
                instance = name,
                error = %e,
                code = e.fatal_code().code(),
                "context failed"
            ),
            Err(_) => warn!(instance = name, "context panicked"),
        }
    }
}
