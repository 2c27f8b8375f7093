//! Entry views handed to mutation functions.
//!
//! Views borrow the working entry mutably for exactly the duration of the
//! function call. Anything a function wants to hand back about the entry is
//! laundered into an owned [`EntryViewSnapshot`] after the call.

use crate::container::{Metadata, MvccEntry};
use crate::core::error::FunctionError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Read-write view of one entry.
///
/// Reads start from the base the command chose (the pinned previous value on
/// a matcher hit, the live value otherwise) and reflect the view's own writes.
/// Writes go to the working entry.
pub struct ReadWriteEntryView<'a, K, V> {
    entry: &'a mut MvccEntry<K, V>,
    value: Option<V>,
    metadata: Metadata,
}

impl<'a, K: Clone + Debug, V: Clone> ReadWriteEntryView<'a, K, V> {
    pub(crate) fn new(entry: &'a mut MvccEntry<K, V>, value: Option<V>, metadata: Metadata) -> Self {
        Self {
            entry,
            value,
            metadata,
        }
    }

    pub fn key(&self) -> &K {
        self.entry.key()
    }

    /// Current value, if any.
    pub fn find(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Current value, failing when absent.
    pub fn get(&self) -> Result<&V, FunctionError> {
        self.value
            .as_ref()
            .ok_or_else(|| FunctionError::msg(format!("no value present for key {:?}", self.key())))
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Write a value, keeping the current metadata limits unless given new ones.
    pub fn set(&mut self, value: V, metadata: Option<Metadata>) {
        if let Some(metadata) = metadata {
            self.metadata = metadata;
        }
        self.entry.set_value(value.clone());
        self.entry.set_metadata(self.metadata);
        self.value = Some(value);
    }

    /// Remove the entry.
    pub fn remove(&mut self) {
        self.entry.remove();
        self.value = None;
    }
}

/// Write-only view of one entry.
pub struct WriteEntryView<'a, K, V> {
    entry: &'a mut MvccEntry<K, V>,
}

impl<'a, K: Clone, V: Clone> WriteEntryView<'a, K, V> {
    pub(crate) fn new(entry: &'a mut MvccEntry<K, V>) -> Self {
        Self { entry }
    }

    pub fn key(&self) -> &K {
        self.entry.key()
    }

    /// Write a value; without metadata the entry's current limits are kept.
    pub fn set(&mut self, value: V, metadata: Option<Metadata>) {
        let metadata = metadata.unwrap_or(*self.entry.metadata());
        self.entry.set_value(value);
        self.entry.set_metadata(metadata);
    }

    pub fn remove(&mut self) {
        self.entry.remove();
    }
}

/// Owned, immutable picture of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryViewSnapshot<K, V> {
    pub key: K,
    pub value: Option<V>,
    pub metadata: Metadata,
}

impl<K: Clone, V: Clone> EntryViewSnapshot<K, V> {
    /// Snapshot the current state of a working entry.
    pub fn of(entry: &MvccEntry<K, V>) -> Self {
        Self {
            key: entry.key().clone(),
            value: entry.value().cloned(),
            metadata: *entry.metadata(),
        }
    }

    pub fn find(&self) -> Option<&V> {
        self.value.as_ref()
    }
}

/// What a read-write function hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Returned<R> {
    /// A plain result value.
    Value(R),
    /// The function's own view; replaced by a snapshot of the entry.
    View,
}

/// Result of a single-key command applied locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandResult<K, V, R> {
    Value(R),
    Entry(EntryViewSnapshot<K, V>),
}

impl<K, V, R> CommandResult<K, V, R> {
    /// The plain value, if the function returned one.
    pub fn value(&self) -> Option<&R> {
        match self {
            Self::Value(r) => Some(r),
            Self::Entry(_) => None,
        }
    }

    /// The entry snapshot, if the function returned its view.
    pub fn entry(&self) -> Option<&EntryViewSnapshot<K, V>> {
        match self {
            Self::Value(_) => None,
            Self::Entry(snapshot) => Some(snapshot),
        }
    }
}

/// Turn what a function returned into a result safe to leave the invocation.
pub(crate) fn launder<K: Clone, V: Clone, R>(
    entry: &MvccEntry<K, V>,
    returned: Returned<R>,
) -> CommandResult<K, V, R> {
    match returned {
        Returned::Value(r) => CommandResult::Value(r),
        Returned::View => CommandResult::Entry(EntryViewSnapshot::of(entry)),
    }
}
