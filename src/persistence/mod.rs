//! Bucket-based persistence.
//!
//! - [`bucket`] - Key to bucket mapping and bucket payloads
//! - [`medium`] - Backing medium trait and the in-memory medium
//! - [`directory`] - File-per-bucket medium
//! - [`store`] - Bucket store with striped locking, purge and scan
//! - [`manager`] - Persistence manager over one or more stores

pub mod bucket;
pub mod directory;
pub mod manager;
pub mod medium;
pub mod store;

pub use bucket::{Bucket, BucketId, BucketMapper, KeyHasher, StableKeyHasher, StoredEntry};
pub use directory::DirectoryMedium;
pub use manager::{PersistenceManager, StoreManager};
pub use medium::{BackingMedium, MemoryMedium, Row, RowStream};
pub use store::{
    BucketStore, BucketStoreConfig, EntryStore, EntryVisitor, KeyFilter, PurgeListener,
    PurgeStats, ScanContext, ScanReport, StoreLookup,
};
