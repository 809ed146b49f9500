//! The capture-rotation pipeline.
//!
//! One pipeline owns one instance's saveto target for the lifetime of
//! its context. The loop blocks in `poll(2)` across the trace source and
//! the rotation-request pipe, so an external rotation is observed
//! promptly even when no trace data is flowing. Every read is preceded
//! by three independent housekeeping checks against the open output
//! file: unlink resilience, the size quota, and the free-space floor.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::PathBuf;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use thiserror::Error;
use tracing::{info, warn};

use super::rotation::{RotateHook, RotationSignal};
use super::throttle::Throttle;
use crate::instance::Instance;
use crate::tracefs::TraceFs;

/// Fallback read chunk size when the source reports no block size.
const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Smallest read chunk the loop will use.
const MIN_CHUNK_SIZE: usize = 512;

/// Capture failures that are fatal to an instance context.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open trace source {}: {source}", path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to stat trace source: {source}")]
    StatSource {
        #[source]
        source: io::Error,
    },

    #[error("failed to open output file {}: {source}", path.display())]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("poll on trace source failed: {source}")]
    Poll {
        #[source]
        source: io::Error,
    },
}

/// Accounting for one pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Close-and-reopen events of any kind: external rotation, unlink
    /// recovery, size quota, free-space floor.
    pub rotations: u64,
}

/// Free-space probe for the filesystem holding the output file.
pub trait FreeSpace: Send {
    /// Percentage of the filesystem still available, if determinable.
    fn free_percent(&mut self, file: &File) -> Option<u8>;
}

/// statvfs(3)-backed probe used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsProbe;

impl FreeSpace for StatvfsProbe {
    fn free_percent(&mut self, file: &File) -> Option<u8> {
        let vfs = nix::sys::statvfs::fstatvfs(file).ok()?;
        let total = vfs.blocks() as u64;
        if total == 0 {
            return None;
        }
        let available = vfs.blocks_available() as u64;
        Some((available.saturating_mul(100) / total).min(100) as u8)
    }
}

/// Open an instance's trace source for blocking reads.
pub fn open_trace_source(fs: &TraceFs, instance: &str) -> Result<File, CaptureError> {
    let path = fs.trace_pipe_path(instance);
    File::open(&path).map_err(|source| CaptureError::OpenSource { path, source })
}

enum Wake {
    Data,
    Rotation,
}

/// The blocking capture loop for one instance.
pub struct CapturePipeline<H: RotateHook, P: FreeSpace> {
    instance: String,
    output_path: PathBuf,
    max_file_size: u64,
    min_free_percent: u8,
    hook: H,
    space: P,
    rotation: RotationSignal,
}

impl<H: RotateHook, P: FreeSpace> CapturePipeline<H, P> {
    pub fn new(
        instance: &Instance,
        output_path: impl Into<PathBuf>,
        hook: H,
        space: P,
        rotation: RotationSignal,
    ) -> Self {
        Self {
            instance: instance.name.clone(),
            output_path: output_path.into(),
            max_file_size: instance.max_file_size,
            min_free_percent: instance.min_free_percent,
            hook,
            space,
            rotation,
        }
    }

    /// Run the capture loop until the trace source reports end of
    /// stream. Does not return before then unless a fatal error occurs.
    pub fn run(mut self, mut source: File) -> Result<CaptureStats, CaptureError> {
        // A fresh daemon start must not silently overwrite unarchived
        // data left by the previous run (e.g. after a reboot).
        if let Ok(meta) = std::fs::metadata(&self.output_path) {
            if meta.len() > 0 {
                info!(
                    instance = self.instance,
                    output = %self.output_path.display(),
                    "rotating pre-existing output file"
                );
                self.hook.rotate(&self.instance);
            }
        }

        let meta = source
            .metadata()
            .map_err(|source| CaptureError::StatSource { source })?;
        let chunk = preferred_chunk_size(meta.blksize());
        let mut buf = vec![0u8; chunk];

        let mut out = self.open_output()?;
        info!(
            instance = self.instance,
            output = %self.output_path.display(),
            chunk,
            "capture started"
        );

        let mut stats = CaptureStats::default();
        // One counter per fault condition; bursts on one stream must
        // not disturb another's diagnostic cadence.
        let mut unlink_throttle = Throttle::new();
        let mut size_throttle = Throttle::new();
        let mut space_throttle = Throttle::new();
        let mut read_throttle = Throttle::new();
        let mut write_throttle = Throttle::new();
        // One rotation attempt per low-space episode.
        let mut space_rotated = false;

        loop {
            let n = match self.wait_readable(&source)? {
                Wake::Rotation => {
                    // The external rotator renamed the old inode away;
                    // reopening preserves the output file's name.
                    info!(
                        instance = self.instance,
                        output = %self.output_path.display(),
                        "rotation requested, reopening output"
                    );
                    drop(out);
                    out = self.open_output()?;
                    stats.rotations += 1;
                    continue;
                }
                Wake::Data => match source.read(&mut buf) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        if read_throttle.should_log() {
                            warn!(instance = self.instance, error = %e, "trace source read failed");
                        }
                        continue;
                    }
                },
            };

            if n == 0 {
                break;
            }
            stats.bytes_read += n as u64;

            if let Ok(meta) = out.metadata() {
                if meta.nlink() == 0 {
                    // Deleted while open; reopen to release the dead
                    // inode's storage and resume onto a fresh file.
                    if unlink_throttle.should_log() {
                        warn!(
                            instance = self.instance,
                            output = %self.output_path.display(),
                            "output file deleted externally, reopening"
                        );
                    }
                    drop(out);
                    out = self.open_output()?;
                    stats.rotations += 1;
                } else if meta.len() > self.max_file_size {
                    if size_throttle.should_log() {
                        warn!(
                            instance = self.instance,
                            output = %self.output_path.display(),
                            size = meta.len(),
                            max = self.max_file_size,
                            "file size exceeded, rotating"
                        );
                    }
                    drop(out);
                    self.hook.rotate(&self.instance);
                    out = self.open_output()?;
                    stats.rotations += 1;
                }
            }

            if let Some(pct) = self.space.free_percent(&out) {
                if pct <= self.min_free_percent {
                    if space_throttle.should_log() {
                        warn!(
                            instance = self.instance,
                            output = %self.output_path.display(),
                            free_percent = pct,
                            floor = self.min_free_percent,
                            "free space too low"
                        );
                    }
                    if !space_rotated {
                        drop(out);
                        self.hook.rotate(&self.instance);
                        out = self.open_output()?;
                        stats.rotations += 1;
                        space_rotated = true;
                    }
                } else {
                    space_rotated = false;
                }
            }

            match out.write(&buf[..n]) {
                Ok(written) => {
                    stats.bytes_written += written as u64;
                    if written < n && write_throttle.should_log() {
                        warn!(
                            instance = self.instance,
                            output = %self.output_path.display(),
                            written,
                            expected = n,
                            "short write"
                        );
                    }
                }
                Err(e) => {
                    if write_throttle.should_log() {
                        warn!(
                            instance = self.instance,
                            output = %self.output_path.display(),
                            error = %e,
                            "write failed"
                        );
                    }
                }
            }
        }

        info!(
            instance = self.instance,
            bytes_read = stats.bytes_read,
            bytes_written = stats.bytes_written,
            rotations = stats.rotations,
            "trace source closed, capture ending"
        );
        Ok(stats)
    }

    /// Block until the source has data or a rotation request arrives.
    ///
    /// Data wins when both are ready; the request stays pending in the
    /// pipe and is handled on the next iteration.
    fn wait_readable(&self, source: &File) -> Result<Wake, CaptureError> {
        loop {
            let mut fds = [
                PollFd::new(source.as_fd(), PollFlags::POLLIN),
                PollFd::new(self.rotation.fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(CaptureError::Poll { source: e.into() });
                }
            }

            let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
            if fds[0].revents().is_some_and(|r| r.intersects(readable)) {
                return Ok(Wake::Data);
            }
            if self.rotation.take_pending() {
                return Ok(Wake::Rotation);
            }
        }
    }

    /// Create-or-truncate the output file at its configured path with
    /// owner-only permissions.
    fn open_output(&self) -> Result<File, CaptureError> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.output_path)
            .map_err(|source| CaptureError::OpenOutput {
                path: self.output_path.clone(),
                source,
            })
    }
}

fn preferred_chunk_size(blksize: u64) -> usize {
    let size = if blksize == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        blksize as usize
    };
    size.max(MIN_CHUNK_SIZE)
}
