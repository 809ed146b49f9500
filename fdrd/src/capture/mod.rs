//! Capture-rotation pipeline: the blocking read/write loop that streams
//! `trace_pipe` to the saveto target with quota, free-space, and
//! rotation handling.

mod pipeline;
mod rotation;
mod throttle;

pub use pipeline::{
    open_trace_source, CaptureError, CapturePipeline, CaptureStats, FreeSpace, StatvfsProbe,
};
pub use rotation::{
    install_sighup_fan_out, LogrotateHook, RotateHook, RotationSignal, DEFAULT_LOGROTATE_DIR,
};
pub use throttle::Throttle;
