//! Rotation plumbing: the per-context rotation-request signal and the
//! logrotate(8) hook.
//!
//! An external rotator renames the live output file and sends SIGHUP;
//! the capture loop must notice promptly even while blocked in a read
//! with no trace data flowing. The signal handler does nothing but write
//! one byte into each context's self-pipe; everything else happens on
//! the ordinary control path.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use nix::fcntl::OFlag;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::{debug, info, warn};

/// Directory probed for a rotation config named after the instance.
pub const DEFAULT_LOGROTATE_DIR: &str = "/etc/logrotate.d";

/// Per-context rotation-request channel.
///
/// A non-blocking self-pipe whose read end is multiplexed with the
/// trace-source read. Each capture context owns exactly one; draining
/// one context's pipe never disturbs a sibling.
#[derive(Debug)]
pub struct RotationSignal {
    rx: OwnedFd,
    tx: OwnedFd,
}

impl RotationSignal {
    pub fn new() -> io::Result<Self> {
        let (rx, tx) = nix::unistd::pipe2(OFlag::O_NONBLOCK)?;
        Ok(Self { rx, tx })
    }

    /// Read end, for polling alongside the trace source.
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.rx.as_fd()
    }

    pub(crate) fn notify_fd(&self) -> RawFd {
        self.tx.as_raw_fd()
    }

    /// Request a rotation, exactly as the SIGHUP handler does.
    pub fn notify(&self) {
        // A full pipe already carries a pending request; EAGAIN is fine.
        let _ = nix::unistd::write(self.tx.as_fd(), &[1u8]);
    }

    /// Drain the pipe; true if a rotation request was pending.
    pub fn take_pending(&self) -> bool {
        let mut buf = [0u8; 16];
        let mut pending = false;
        while let Ok(n) = nix::unistd::read(self.rx.as_raw_fd(), &mut buf) {
            if n == 0 {
                break;
            }
            pending = true;
        }
        pending
    }
}

/// Write ends of every context's rotation pipe, frozen before the
/// contexts spawn so the handler only ever reads immutable data.
static ROTATION_FAN_OUT: OnceLock<Vec<RawFd>> = OnceLock::new();

extern "C" fn handle_sighup(_: libc::c_int) {
    // Async-signal-safe: write(2) only.
    if let Some(fds) = ROTATION_FAN_OUT.get() {
        let byte = [1u8];
        for &fd in fds {
            unsafe {
                libc::write(fd, byte.as_ptr().cast(), 1);
            }
        }
    }
}

/// Install the SIGHUP handler fanning rotation requests out to every
/// registered context.
///
/// Must be called once, after all signals are created and before any
/// context spawns.
pub fn install_sighup_fan_out(signals: &[RotationSignal]) -> io::Result<()> {
    let fds: Vec<RawFd> = signals.iter().map(|s| s.notify_fd()).collect();
    ROTATION_FAN_OUT
        .set(fds)
        .map_err(|_| io::Error::other("rotation fan-out already installed"))?;

    let action = SigAction::new(
        SigHandler::Handler(handle_sighup),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGHUP, &action) }?;
    Ok(())
}

/// Hook invoked when a quota or free-space rotation fires.
pub trait RotateHook: Send {
    /// Attempt to archive the instance's current output file. The file
    /// is closed when this runs; the caller reopens afterwards.
    fn rotate(&mut self, instance: &str);
}

/// Routes rotation through logrotate(8) when a config file named after
/// the instance exists in the rotation-config directory.
///
/// Without such a file, rotation degrades to truncate-and-reopen at the
/// same path: old content is **discarded, not archived**. Ship a
/// logrotate config alongside any instance whose data matters.
#[derive(Debug, Clone)]
pub struct LogrotateHook {
    config_dir: PathBuf,
}

impl Default for LogrotateHook {
    fn default() -> Self {
        Self::with_config_dir(DEFAULT_LOGROTATE_DIR)
    }
}

impl LogrotateHook {
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    fn config_file(&self, instance: &str) -> PathBuf {
        self.config_dir.join(instance)
    }
}

impl RotateHook for LogrotateHook {
    fn rotate(&mut self, instance: &str) {
        let cfile = self.config_file(instance);
        if !cfile.exists() {
            debug!(
                instance,
                config = %cfile.display(),
                "no logrotate config, old data will be truncated"
            );
            return;
        }

        info!(instance, config = %cfile.display(), "forcing log rotation");
        match Command::new("logrotate").arg("-f").arg(&cfile).status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(instance, %status, "logrotate failed"),
            Err(e) => warn!(instance, error = %e, "could not run logrotate"),
        }
    }
}

/// Test helper: a hook that archives by renaming, counting invocations.
#[cfg(test)]
pub(crate) struct RenameHook {
    pub target: PathBuf,
    pub rotations: usize,
}

#[cfg(test)]
impl RenameHook {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            rotations: 0,
        }
    }
}

#[cfg(test)]
impl RotateHook for RenameHook {
    fn rotate(&mut self, _instance: &str) {
        self.rotations += 1;
        let archived = archive_path(&self.target, self.rotations);
        let _ = std::fs::rename(&self.target, archived);
    }
}

#[cfg(test)]
pub(crate) fn archive_path(target: &std::path::Path, n: usize) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}
