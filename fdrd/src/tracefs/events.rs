//! Probe enable/disable switches and filter application.

use tracing::{debug, warn};

use super::{write_control, TraceFs, TraceFsError};

/// Split an event target into subsystem and probe.
///
/// A probe of `all` selects the whole subsystem and yields `None`: the
/// switch written is `events/{subsystem}/enable`, not a probe literally
/// named "all".
pub fn split_target(target: &str) -> Option<(&str, Option<&str>)> {
    let (subsystem, probe) = target.split_once('/')?;
    if subsystem.is_empty() || probe.is_empty() {
        return None;
    }
    Some((subsystem, (probe != "all").then_some(probe)))
}

/// Write `"1"` or `"0"` into the target's enable switch, then apply the
/// filter expression if one was given.
///
/// A missing switch means the probe is unsupported on this kernel build:
/// soft, capture continues with whatever probes exist. Any other
/// open/write failure is fatal to the context. Filter failures are
/// always soft - filtering is a refinement, not a precondition.
pub(super) fn apply_event_switch(
    fs: &TraceFs,
    instance: &str,
    target: &str,
    enable: bool,
    filter: Option<&str>,
) -> Result<(), TraceFsError> {
    let Some((subsystem, probe)) = split_target(target) else {
        // The loader rejects malformed targets before dispatch.
        warn!(instance, target, "malformed event target, skipping");
        return Ok(());
    };

    let path = fs.event_enable_path(instance, subsystem, probe);
    let value = if enable { "1" } else { "0" };
    debug!(instance, target, value, path = %path.display(), "event switch");

    match write_control(&path, value) {
        Ok(()) => {}
        Err(TraceFsError::ControlOpen { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            warn!(instance, target, "no such probe");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    if let Some(expr) = filter {
        let path = fs.event_filter_path(instance, subsystem, probe);
        debug!(instance, target, filter = expr, "applying filter");
        if let Err(e) = write_control(&path, expr) {
            warn!(instance, target, error = %e, "filter not applied");
        }
    }

    Ok(())
}
