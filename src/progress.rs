//! Free-text progress reporting sink supplied by the driving caller.

/// Receives human-readable progress messages from pipeline stages.
///
/// Implementations must be callable from worker threads.
pub trait ProgressSink: Sync {
    fn log(&self, message: &str);
}

impl<F: Fn(&str) + Sync> ProgressSink for F {
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Discards all messages.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn log(&self, _message: &str) {}
}
