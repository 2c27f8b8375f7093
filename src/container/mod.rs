//! In-memory entry container.
//!
//! - [`entry`] - Metadata, stored entries and mutable working copies
//! - [`data_container`] - The segmented container and its trait

pub mod data_container;
pub mod entry;

pub use data_container::{DataContainer, EntryRef, SegmentedDataContainer};
pub use entry::{InternalEntry, Metadata, MvccEntry, UNLIMITED};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Bounds every cache key satisfies.
pub trait GridKey:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> GridKey for T where
    T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Bounds every cache value satisfies.
pub trait GridValue:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> GridValue for T where
    T: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}
