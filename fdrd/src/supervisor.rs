//! Per-instance supervision.
//!
//! Every instance runs on its own OS thread and fails independently: a
//! broken probe list or a vanished trace source takes down one context
//! while its siblings keep capturing. Directives dispatch strictly in
//! file order, through a runtime seam so the order is testable without a
//! kernel.

use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{error, info};

use crate::capture::{
    open_trace_source, CaptureError, CapturePipeline, LogrotateHook, RotationSignal, StatvfsProbe,
    DEFAULT_LOGROTATE_DIR,
};
use crate::config::DirectiveKind;
use crate::instance::Instance;
use crate::tracefs::{TraceFs, TraceFsError};

/// Process exit codes, one per fatal failure class.
///
/// Stable across releases; monitoring distinguishes failure causes by
/// code alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FatalCode {
    /// Could not create a tracing instance directory.
    Mkdir = 1,
    /// A subprocess or system facility failed (modprobe, poll).
    System = 2,
    /// Malformed configuration line.
    Syntax = 3,
    /// Directive cannot be dispatched as written.
    BadDirective = 4,
    /// Could not open a control or output file.
    Open = 5,
    /// Could not write a control file.
    Write = 6,
    /// Could not initialize logging.
    LogOpen = 7,
    /// Could not open the trace source.
    TraceOpen = 8,
    /// Could not stat the trace source.
    Stat = 9,
    /// Out of memory. Reserved: allocation failure aborts the process
    /// before any error path runs, but the code stays allocated so
    /// monitoring tables remain stable.
    Alloc = 10,
    /// Unknown configuration verb.
    BadVerb = 11,
    /// Could not spawn a supervisor context.
    Spawn = 12,
    /// Invalid command-line arguments. Reserved: clap prints its own
    /// usage diagnostic and exits 2 before this table is consulted.
    BadArgs = 13,
    /// Could not exec a helper program. Reserved: helper invocations go
    /// through `Command`, whose failures surface as [`Self::System`].
    Exec = 15,
}

impl FatalCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// A failure that ends one instance's context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    TraceFs(#[from] TraceFsError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("modprobe {module} failed: {reason}")]
    Modprobe { module: String, reason: String },

    #[error("instance {instance} has more than one saveto target")]
    DuplicateSaveTo { instance: String },
}

impl ContextError {
    pub fn fatal_code(&self) -> FatalCode {
        match self {
            Self::TraceFs(TraceFsError::CreateDir { .. }) => FatalCode::Mkdir,
            Self::TraceFs(TraceFsError::ControlOpen { .. }) => FatalCode::Open,
            Self::TraceFs(TraceFsError::ControlWrite { .. }) => FatalCode::Write,
            Self::Capture(CaptureError::OpenSource { .. }) => FatalCode::TraceOpen,
            Self::Capture(CaptureError::StatSource { .. }) => FatalCode::Stat,
            Self::Capture(CaptureError::OpenOutput { .. }) => FatalCode::Open,
            Self::Capture(CaptureError::Poll { .. }) => FatalCode::System,
            Self::Modprobe { .. } => FatalCode::System,
            Self::DuplicateSaveTo { .. } => FatalCode::BadDirective,
        }
    }
}

/// The operations a directive can request of its environment.
///
/// Production is [`Runtime`]; tests substitute a recording mock to
/// verify dispatch order and short-circuiting.
pub trait InstanceRuntime {
    fn setup_instance(&mut self, instance: &Instance) -> Result<(), ContextError>;

    fn load_module(&mut self, module: &str) -> Result<(), ContextError>;

    fn event_switch(
        &mut self,
        instance: &str,
        target: &str,
        enable: bool,
        filter: Option<&str>,
    ) -> Result<(), ContextError>;

    /// Stream the instance's trace source to `output`; blocks until the
    /// source reaches end of stream.
    fn capture(&mut self, instance: &Instance, output: &str) -> Result<(), ContextError>;
}

/// Run an instance's directives top to bottom, stopping at the first
/// failure.
///
/// `minfree` and the reserved `logrotate` verb were consumed at load
/// time and dispatch to nothing.
pub fn dispatch_directives<R: InstanceRuntime>(
    instance: &Instance,
    runtime: &mut R,
) -> Result<(), ContextError> {
    for directive in &instance.directives {
        match directive.kind {
            DirectiveKind::DefineInstance => runtime.setup_instance(instance)?,
            DirectiveKind::LoadModule => runtime.load_module(&directive.target)?,
            DirectiveKind::Enable => runtime.event_switch(
                &instance.name,
                &directive.target,
                true,
                directive.argument.as_deref(),
            )?,
            DirectiveKind::Disable => runtime.event_switch(
                &instance.name,
                &directive.target,
                false,
                directive.argument.as_deref(),
            )?,
            DirectiveKind::SaveTo => runtime.capture(instance, &directive.target)?,
            DirectiveKind::MinFree | DirectiveKind::RotateHint => {}
        }
    }
    Ok(())
}

/// Production runtime backed by the kernel tracing filesystem.
pub struct Runtime {
    tracefs: TraceFs,
    /// Taken by the first `saveto`; a second one is a config defect.
    rotation: Option<RotationSignal>,
    logrotate_dir: PathBuf,
}

impl Runtime {
    pub fn new(tracefs: TraceFs, rotation: RotationSignal) -> Self {
        Self::with_logrotate_dir(tracefs, rotation, DEFAULT_LOGROTATE_DIR)
    }

    pub fn with_logrotate_dir(
        tracefs: TraceFs,
        rotation: RotationSignal,
        logrotate_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tracefs,
            rotation: Some(rotation),
            logrotate_dir: logrotate_dir.into(),
        }
    }
}

impl InstanceRuntime for Runtime {
    fn setup_instance(&mut self, instance: &Instance) -> Result<(), ContextError> {
        self.tracefs.setup_instance(instance)?;
        Ok(())
    }

    fn load_module(&mut self, module: &str) -> Result<(), ContextError> {
        info!(module, "loading kernel module");
        let status =
            Command::new("modprobe")
                .arg(module)
                .status()
                .map_err(|e| ContextError::Modprobe {
                    module: module.to_string(),
                    reason: e.to_string(),
                })?;
        if !status.success() {
            return Err(ContextError::Modprobe {
                module: module.to_string(),
                reason: status.to_string(),
            });
        }
        Ok(())
    }

    fn event_switch(
        &mut self,
        instance: &str,
        target: &str,
        enable: bool,
        filter: Option<&str>,
    ) -> Result<(), ContextError> {
        self.tracefs
            .apply_event_switch(instance, target, enable, filter)?;
        Ok(())
    }

    fn capture(&mut self, instance: &Instance, output: &str) -> Result<(), ContextError> {
        let rotation = self
            .rotation
            .take()
            .ok_or_else(|| ContextError::DuplicateSaveTo {
                instance: instance.name.clone(),
            })?;

        let source = open_trace_source(&self.tracefs, &instance.name)?;
        let pipeline = CapturePipeline::new(
            instance,
            output,
            LogrotateHook::with_config_dir(&self.logrotate_dir),
            StatvfsProbe,
            rotation,
        );
        let stats = pipeline.run(source)?;
        info!(
            instance = instance.name,
            bytes_written = stats.bytes_written,
            rotations = stats.rotations,
            "capture complete"
        );
        Ok(())
    }
}

/// Spawn one supervisor context on a named thread.
///
/// The instance moves into the thread; the context's outcome comes back
/// through the join handle.
pub fn spawn_context<R>(
    instance: Instance,
    mut runtime: R,
) -> io::Result<JoinHandle<Result<(), ContextError>>>
where
    R: InstanceRuntime + Send + 'static,
{
    thread::Builder::new()
        .name(format!("fdr-{}", instance.name))
        .spawn(move || {
            info!(instance = instance.name, "context started");
            let result = dispatch_directives(&instance, &mut runtime);
            match &result {
                Ok(()) => info!(instance = instance.name, "context finished"),
                Err(e) => error!(
                    instance = instance.name,
                    error = %e,
                    code = e.fatal_code().code(),
                    "context failed"
                ),
            }
            result
        })
}
