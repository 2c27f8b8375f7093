//! Cooperative interruption.
//!
//! Long-running work (reaper sweeps, store purges, scans) checks an
//! [`InterruptFlag`] between units of work. Whoever owns the work raises the
//! flag to cancel it; code that observes an interruption reported by a
//! backing medium raises it again before propagating, so the owner still sees
//! the interrupted status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, cloneable interruption flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// Create a flag in the cleared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn interrupt(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Check whether the flag is raised.
    pub fn is_interrupted(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was raised.
    pub fn clear(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
}
