//! Cache operations over the grid core.
//!
//! - [`write_path`] - Command execution, write-through, L1 invalidation and reads

pub mod write_path;

pub use write_path::WritePath;
