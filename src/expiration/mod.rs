//! Entry expiration.
//!
//! - [`manager`] - In-memory and in-store expiration, write leases
//! - [`reaper`] - Scheduled sweep driver
//! - [`notifier`] - Entry event sink

pub mod manager;
pub mod notifier;
pub mod reaper;

pub use manager::{ExpirationManager, SweepStats, WriteLease};
pub use notifier::{CacheNotifier, LoggingNotifier};
pub use reaper::{ExpirationReaper, ReaperState};
