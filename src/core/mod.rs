//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Component wiring and lifecycle
//! - [`time`] - Wall-clock sources for expiry decisions
//! - [`error`] - Error types per subsystem
//! - [`interrupt`] - Cooperative interruption of long-running work
//! - [`striped`] - Stable hashing, lock stripes and segmented maps
//! - [`telemetry`] - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod interrupt;
pub mod runtime;
pub mod striped;
pub mod telemetry;
pub mod time;
