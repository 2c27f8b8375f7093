//! In-memory entry container.

use super::entry::{InternalEntry, Metadata};
use crate::core::striped::StripedMap;
use std::hash::Hash;
use std::sync::Arc;

/// Shared handle to a stored entry.
pub type EntryRef<K, V> = Arc<InternalEntry<K, V>>;

/// Atomic per-key access to the in-memory entries of a node.
pub trait DataContainer<K, V>: Send + Sync {
    /// Current entry, expired or not, without touching it.
    fn peek(&self, key: &K) -> Option<EntryRef<K, V>>;

    /// Current live entry; refreshes last-access for idle-limited entries.
    fn get(&self, key: &K, now: i64) -> Option<EntryRef<K, V>>;

    /// Replace the entry for `key`.
    fn put(&self, key: K, value: V, metadata: Metadata);

    /// Remove and return the entry for `key`.
    fn remove(&self, key: &K) -> Option<EntryRef<K, V>>;

    /// Atomically replace the entry for `key` with what `f` returns.
    ///
    /// `f` runs under the key's segment lock and receives the current entry;
    /// returning `None` removes the key. Returns the new entry.
    fn compute(
        &self,
        key: &K,
        f: &mut dyn FnMut(&K, Option<EntryRef<K, V>>) -> Option<EntryRef<K, V>>,
    ) -> Option<EntryRef<K, V>>;

    /// Weakly consistent iteration over every entry, expired ones included.
    fn iter_including_expired(&self) -> Box<dyn Iterator<Item = EntryRef<K, V>> + '_>;

    /// Number of entries, expired ones included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    fn clear(&self);
}

/// Container split into independently locked segments.
pub struct SegmentedDataContainer<K, V> {
    segments: StripedMap<K, EntryRef<K, V>>,
}

impl<K: Hash + Eq, V> SegmentedDataContainer<K, V> {
    pub fn new(segments: usize) -> Self {
        Self {
            segments: StripedMap::new(segments),
        }
    }
}

impl<K, V> DataContainer<K, V> for SegmentedDataContainer<K, V>
where
    K: Clone + Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    fn peek(&self, key: &K) -> Option<EntryRef<K, V>> {
        self.segments.with_segment(key, |map| map.get(key).cloned())
    }

    fn get(&self, key: &K, now: i64) -> Option<EntryRef<K, V>> {
        self.segments.with_segment(key, |map| {
            let entry = map.get(key)?;
            if entry.is_expired(now) {
                return None;
            }
            if entry.metadata.max_idle < 0 {
                return Some(entry.clone());
            }
            let touched = Arc::new(entry.touched(now));
            map.insert(key.clone(), touched.clone());
            Some(touched)
        })
    }

    fn put(&self, key: K, value: V, metadata: Metadata) {
        let entry = Arc::new(InternalEntry::new(key.clone(), value, metadata));
        self.segments.with_segment(&key, |map| {
            map.insert(key.clone(), entry);
        });
    }

    fn remove(&self, key: &K) -> Option<EntryRef<K, V>> {
        self.segments.with_segment(key, |map| map.remove(key))
    }

    fn compute(
        &self,
        key: &K,
        f: &mut dyn FnMut(&K, Option<EntryRef<K, V>>) -> Option<EntryRef<K, V>>,
    ) -> Option<EntryRef<K, V>> {
        self.segments.with_segment(key, |map| {
            let current = map.get(key).cloned();
            match f(key, current.clone()) {
                Some(next) => {
                    let unchanged = current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &next));
                    if !unchanged {
                        map.insert(key.clone(), next.clone());
                    }
                    Some(next)
                }
                None => {
                    if current.is_some() {
                        map.remove(key);
                    }
                    None
                }
            }
        })
    }

    fn iter_including_expired(&self) -> Box<dyn Iterator<Item = EntryRef<K, V>> + '_> {
        Box::new(SegmentIter {
            segments: &self.segments,
            next_segment: 0,
            buffered: Vec::new().into_iter(),
        })
    }

    fn len(&self) -> usize {
        self.segments.len()
    }

    fn clear(&self) {
        self.segments.clear();
    }
}

/// Snapshots one segment at a time so no lock is held while the caller works.
struct SegmentIter<'a, K, V> {
    segments: &'a StripedMap<K, EntryRef<K, V>>,
    next_segment: usize,
    buffered: std::vec::IntoIter<EntryRef<K, V>>,
}

impl<K: Hash + Eq, V> Iterator for SegmentIter<'_, K, V> {
    type Item = EntryRef<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffered.next() {
                return Some(entry);
            }
            if self.next_segment >= self.segments.segment_count() {
                return None;
            }
            let snapshot: Vec<_> = self
                .segments
                .with_segment_at(self.next_segment, |map| map.values().cloned().collect());
            self.next_segment += 1;
            self.buffered = snapshot.into_iter();
        }
    }
}
