//! Invocation context: the entries a command may touch on this node.

use crate::container::{EntryRef, MvccEntry};
use std::collections::HashMap;
use std::hash::Hash;

/// Lookup of the working entries wrapped for a command.
///
/// `None` means the key is not applicable on this node (not wrapped, not local).
pub trait EntryLookup<K, V> {
    fn lookup_entry(&mut self, key: &K) -> Option<&mut MvccEntry<K, V>>;
}

/// Entries wrapped for one invocation.
#[derive(Debug)]
pub struct InvocationContext<K, V> {
    entries: HashMap<K, MvccEntry<K, V>>,
}

impl<K: Clone + Hash + Eq, V: Clone> InvocationContext<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Wrap the current container state for `key`.
    pub fn wrap(&mut self, key: K, current: Option<EntryRef<K, V>>) -> &mut MvccEntry<K, V> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| MvccEntry::new(key, current))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the context, yielding the working entries.
    pub fn into_entries(self) -> impl Iterator<Item = (K, MvccEntry<K, V>)> {
        self.entries.into_iter()
    }

    /// Remove one working entry.
    pub fn take(&mut self, key: &K) -> Option<MvccEntry<K, V>> {
        self.entries.remove(key)
    }
}

impl<K: Clone + Hash + Eq, V: Clone> Default for InvocationContext<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> EntryLookup<K, V> for InvocationContext<K, V> {
    fn lookup_entry(&mut self, key: &K) -> Option<&mut MvccEntry<K, V>> {
        self.entries.get_mut(key)
    }
}
