//! Gridcore - consistency core of a clusterable key-value data grid.
//!
//! Gridcore keeps the entries a node owns consistent while they are written,
//! replicated, cached remotely and persisted. It is embedded by a cache layer
//! that supplies the transport and decides key placement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Write Path                            │
//! │        lease → compute(command) → L1 invalidate → write-through │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                    │                      │
//! ┌──────────────────┐ ┌────────────────────┐ ┌─────────────────────┐
//! │  Command Engine  │ │  L1 Invalidation   │ │  Bucket Persistence │
//! │ matchers, views, │ │ requestor registry │ │ striped bucket locks│
//! │ marshalling      │ │ unicast/multicast  │ │ purge, scan         │
//! └──────────────────┘ └────────────────────┘ └─────────────────────┘
//!            │                                           │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Data Container  +  Expiration Reaper               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Component wiring and lifecycle
//! - [`core::error`] - Error types
//! - [`core::time`] - Wall-clock sources
//! - [`core::striped`] - Stable hashing and lock striping
//!
//! ## Container
//! - [`container::entry`] - Metadata and entries
//! - [`container::data_container`] - Segmented in-memory container
//!
//! ## Commands
//! - [`commands::read_write`] - Single-key read-write commands
//! - [`commands::many`] - Multi-key commands
//! - [`commands::invalidate`] - L1 invalidation command
//! - [`commands::marshal`] - Versioned command envelope
//!
//! ## Distribution
//! - [`distribution::l1`] - L1 requestor tracking and invalidation
//! - [`distribution::rpc`] - Remote invocation seam
//!
//! ## Expiration
//! - [`expiration::manager`] - In-memory and in-store expiration
//! - [`expiration::reaper`] - Scheduled sweeps
//!
//! ## Persistence
//! - [`persistence::store`] - Bucket store
//! - [`persistence::medium`] - Backing media
//!
//! ## Cache
//! - [`cache::write_path`] - Write and read paths
//!
//! # Key Invariants
//!
//! - A command for a key this node does not own returns no result and
//!   touches nothing.
//! - A retried command is applied against the value it first observed, so
//!   redelivery does not apply it twice.
//! - L1 requestors are forgotten before invalidations are sent, whether or
//!   not the remote call succeeds.
//! - An entry is reported expired only while it is still the entry the
//!   container holds and no write to its key is in flight.
//! - Bucket locks are taken and released on the same thread.

// Core infrastructure
pub mod core;

// In-memory entries
pub mod container;

// Functional write commands
pub mod commands;

// Cluster distribution
pub mod distribution;

// Expiration
pub mod expiration;

// Persistence
pub mod persistence;

// Cache paths
pub mod cache;

// Re-exports for convenience
pub use self::core::error::{GridError, GridResult};
pub use self::core::{config, error, runtime, time};
pub use cache::WritePath;
pub use commands::{Command, CommandsFactory, FunctionRegistry, ValueMatcher};
pub use container::{InternalEntry, Metadata};
