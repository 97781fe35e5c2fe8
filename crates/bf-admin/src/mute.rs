//! Process-wide mute flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// A single atomic boolean: the Admin Channel is the only writer, the main
/// dispatcher and the scheduler are the only readers. Single-writer,
/// single-bit semantics mean relaxed ordering is sufficient — there are no
/// dependent reads to synchronize.
#[derive(Default)]
pub struct MuteFlag(AtomicBool);

impl MuteFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn is_muted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn mute(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn unmute(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unmuted() {
        assert!(!MuteFlag::new().is_muted());
    }

    #[test]
    fn mute_then_unmute_round_trips() {
        let flag = MuteFlag::new();
        flag.mute();
        assert!(flag.is_muted());
        flag.unmute();
        assert!(!flag.is_muted());
    }
}
