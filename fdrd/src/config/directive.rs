//! Parsed configuration directives.

use std::path::PathBuf;

/// Classified action for one configuration line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// `instance <name> [bufsize]` - begins a new tracing instance.
    DefineInstance,
    /// `modprobe <module>` - load a kernel module before capture starts.
    LoadModule,
    /// `enable <subsystem/probe> [filter]` - turn a probe on.
    Enable,
    /// `disable <subsystem/probe>` - turn a probe off.
    Disable,
    /// `saveto <path> [maxsize]` - capture trace output to a file.
    SaveTo,
    /// Reserved `logrotate` verb; accepted but currently inert.
    RotateHint,
    /// `minfree <pct>` - free-space floor, consumed at load time.
    MinFree,
}

/// One parsed configuration line.
///
/// Immutable once parsed. Owned by its instance and kept in file order;
/// the supervisor dispatches directives strictly top to bottom.
#[derive(Debug, Clone)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub target: String,
    /// Rest-of-line argument. Embedded whitespace is preserved, which
    /// filter expressions rely on.
    pub argument: Option<String>,
    pub file: PathBuf,
    pub line: u32,
}
