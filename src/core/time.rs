//! Time sources.
//!
//! Every expiry decision is taken against a [`TimeService`] rather than by
//! sampling the clock directly, so tests can drive expiration deterministically.
//! Times are milliseconds since the Unix epoch, signed so that `-1` can mean
//! "not applicable" in entry metadata.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time for expiration.
pub trait TimeService: Send + Sync {
    /// Current wall-clock time in milliseconds.
    fn wall_clock_ms(&self) -> i64;
}

/// Time service backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn wall_clock_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Manually advanced time service.
///
/// Used by tests and by embedders that replay a recorded timeline.
#[derive(Debug, Default)]
pub struct ControlledTimeService {
    now_ms: AtomicI64,
}

impl ControlledTimeService {
    /// Create a controlled clock starting at the given time.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::AcqRel);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, ms: i64) {
        self.now_ms.store(ms, Ordering::Release);
    }
}

impl TimeService for ControlledTimeService {
    fn wall_clock_ms(&self) -> i64 {
        self.now_ms.load(Ordering::Acquire)
    }
}
