//! Rate limiting for high-frequency fault diagnostics.

/// Per-condition occurrence counter.
///
/// A sustained fault (a persistently full disk, an over-subscribed probe
/// set) can fire on every loop iteration; logging each occurrence would
/// flood the journal. One diagnostic is surfaced per 1000 occurrences,
/// so the condition still reaches the operator periodically.
#[derive(Debug, Default)]
pub struct Throttle {
    count: u64,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence; true when it should be logged.
    ///
    /// The first occurrence in a burst is suppressed.
    pub fn should_log(&mut self) -> bool {
        self.count += 1;
        self.count % 1000 == 0
    }

    /// Total occurrences recorded so far.
    pub fn occurrences(&self) -> u64 {
        self.count
    }
}
