//! Kernel tracing control-filesystem layout and instance setup.
//!
//! All paths hang off a configurable instances root (the `-d` flag);
//! the default is the debugfs tracing instances directory. Nothing here
//! touches `trace_pipe` itself; streaming lives in [`crate::capture`].

mod events;

use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use events::split_target;

use crate::instance::Instance;

/// Default root for per-instance tracing control directories.
pub const DEFAULT_TRACING_ROOT: &str = "/sys/kernel/debug/tracing/instances";

/// Control-filesystem failures that are fatal to an instance context.
#[derive(Debug, Error)]
pub enum TraceFsError {
    #[error("failed to create tracing directory {}: {source}", dir.display())]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open control file {}: {source}", path.display())]
    ControlOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write control file {}: {source}", path.display())]
    ControlWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Path layout beneath the tracing instances root.
#[derive(Debug, Clone)]
pub struct TraceFs {
    root: PathBuf,
}

impl Default for TraceFs {
    fn default() -> Self {
        Self::new(DEFAULT_TRACING_ROOT)
    }
}

impl TraceFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{instance}`
    pub fn instance_dir(&self, instance: &str) -> PathBuf {
        self.root.join(instance)
    }

    /// `{root}/{instance}/buffer_size_kb`
    pub fn buffer_size_path(&self, instance: &str) -> PathBuf {
        self.instance_dir(instance).join("buffer_size_kb")
    }

    /// `{root}/{instance}/trace_pipe`
    pub fn trace_pipe_path(&self, instance: &str) -> PathBuf {
        self.instance_dir(instance).join("trace_pipe")
    }

    /// Enable switch for one probe, or for a whole subsystem when
    /// `probe` is `None`.
    pub fn event_enable_path(
        &self,
        instance: &str,
        subsystem: &str,
        probe: Option<&str>,
    ) -> PathBuf {
        self.event_control_path(instance, subsystem, probe, "enable")
    }

    /// Filter file for one probe, or for a whole subsystem when `probe`
    /// is `None`.
    pub fn event_filter_path(
        &self,
        instance: &str,
        subsystem: &str,
        probe: Option<&str>,
    ) -> PathBuf {
        self.event_control_path(instance, subsystem, probe, "filter")
    }

    fn event_control_path(
        &self,
        instance: &str,
        subsystem: &str,
        probe: Option<&str>,
        control: &str,
    ) -> PathBuf {
        let mut path = self.instance_dir(instance).join("events").join(subsystem);
        if let Some(probe) = probe {
            path.push(probe);
        }
        path.push(control);
        path
    }

    /// Idempotently prepare an instance's control directory.
    ///
    /// A stale directory from an unclean shutdown is removed best-effort
    /// first; if the create still reports it exists, the leftover is
    /// reused rather than failing outright. Setting the configured
    /// buffer size is non-fatal - the instance still captures with the
    /// platform default.
    pub fn setup_instance(&self, instance: &Instance) -> Result<(), TraceFsError> {
        let dir = self.instance_dir(&instance.name);
        info!(dir = %dir.display(), "creating tracing instance");

        let _ = std::fs::remove_dir(&dir);
        match std::fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(dir = %dir.display(), "tracing directory already exists, reusing");
            }
            Err(source) => return Err(TraceFsError::CreateDir { dir, source }),
        }

        if let Some(size) = instance.buffer_size {
            let path = self.buffer_size_path(&instance.name);
            debug!(instance = instance.name, size, "setting buffer size");
            if let Err(e) = write_control(&path, &size.to_string()) {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not set buffer size, using platform default"
                );
            }
        }

        Ok(())
    }

    /// Remove an instance's control directory during shutdown.
    ///
    /// An already-removed directory is tolerated.
    pub fn remove_instance(&self, instance: &str) {
        let dir = self.instance_dir(instance);
        debug!(dir = %dir.display(), "removing tracing instance");
        match std::fs::remove_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "rmdir failed"),
        }
    }

    /// Flip a probe (or whole-subsystem) enable switch, optionally
    /// applying a filter expression. See [`events`] for the semantics.
    pub fn apply_event_switch(
        &self,
        instance: &str,
        target: &str,
        enable: bool,
        filter: Option<&str>,
    ) -> Result<(), TraceFsError> {
        events::apply_event_switch(self, instance, target, enable, filter)
    }
}

/// Write a value into an existing control file.
///
/// Control files are created by the kernel when the instance directory
/// is made; this never creates them.
fn write_control(path: &Path, value: &str) -> Result<(), TraceFsError> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|source| TraceFsError::ControlOpen {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(value.as_bytes())
        .map_err(|source| TraceFsError::ControlWrite {
            path: path.to_path_buf(),
            source,
        })
}
