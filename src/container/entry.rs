//! Entry types.
//!
//! [`InternalEntry`] is the immutable shape the container and stores hold.
//! [`MvccEntry`] is the mutable working copy a command sees through an entry
//! lookup; it is committed back into a fresh `InternalEntry`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentinel for "no limit" in lifespan and max idle.
pub const UNLIMITED: i64 = -1;

/// Expiration and versioning metadata of an entry.
///
/// All times are wall-clock milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Lifespan in ms, `-1` for unlimited.
    pub lifespan: i64,
    /// Max idle in ms, `-1` for unlimited.
    pub max_idle: i64,
    /// Creation time in ms.
    pub created: i64,
    /// Last access time in ms.
    pub last_used: i64,
    /// Optional entry version.
    pub version: Option<u64>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self::immortal()
    }
}

impl Metadata {
    /// Metadata that never expires.
    pub fn immortal() -> Self {
        Self::new(UNLIMITED, UNLIMITED)
    }

    /// Metadata with the given limits, not yet stamped with times.
    pub fn new(lifespan: i64, max_idle: i64) -> Self {
        Self {
            lifespan,
            max_idle,
            created: 0,
            last_used: 0,
            version: None,
        }
    }

    /// Metadata with only a lifespan.
    pub fn with_lifespan(lifespan: i64) -> Self {
        Self::new(lifespan, UNLIMITED)
    }

    /// Metadata with only a max idle.
    pub fn with_max_idle(max_idle: i64) -> Self {
        Self::new(UNLIMITED, max_idle)
    }

    /// Set the version.
    pub fn versioned(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Set both creation and last-access times.
    pub fn stamped(mut self, now: i64) -> Self {
        self.created = now;
        self.last_used = now;
        self
    }

    /// Whether either limit is set.
    pub fn can_expire(&self) -> bool {
        self.lifespan >= 0 || self.max_idle >= 0
    }

    /// Expired when past `created + lifespan` or past `last_used + max_idle`.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.expiry_time() {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// The earliest time after which this entry counts as expired.
    pub fn expiry_time(&self) -> Option<i64> {
        let by_lifespan =
            (self.lifespan >= 0).then(|| self.created.saturating_add(self.lifespan));
        let by_idle = (self.max_idle >= 0).then(|| self.last_used.saturating_add(self.max_idle));
        match (by_lifespan, by_idle) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Immutable stored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalEntry<K, V> {
    pub key: K,
    pub value: V,
    pub metadata: Metadata,
}

impl<K, V> InternalEntry<K, V> {
    pub fn new(key: K, value: V, metadata: Metadata) -> Self {
        Self {
            key,
            value,
            metadata,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.metadata.is_expired(now)
    }

    pub fn can_expire(&self) -> bool {
        self.metadata.can_expire()
    }
}

impl<K: Clone, V: Clone> InternalEntry<K, V> {
    /// Copy with last-access refreshed.
    pub fn touched(&self, now: i64) -> Self {
        let mut metadata = self.metadata;
        metadata.last_used = now;
        Self::new(self.key.clone(), self.value.clone(), metadata)
    }
}

/// Mutable working copy of an entry inside an invocation.
#[derive(Debug, Clone)]
pub struct MvccEntry<K, V> {
    key: K,
    value: Option<V>,
    metadata: Metadata,
    original: Option<Arc<InternalEntry<K, V>>>,
    changed: bool,
}

impl<K: Clone, V: Clone> MvccEntry<K, V> {
    /// Wrap the current container state for `key`.
    pub fn new(key: K, original: Option<Arc<InternalEntry<K, V>>>) -> Self {
        let (value, metadata) = match original.as_deref() {
            Some(entry) => (Some(entry.value.clone()), entry.metadata),
            None => (None, Metadata::immortal()),
        };
        Self {
            key,
            value,
            metadata,
            original,
            changed: false,
        }
    }
}

impl<K, V> MvccEntry<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Entry this working copy was created from.
    pub fn original(&self) -> Option<&Arc<InternalEntry<K, V>>> {
        self.original.as_ref()
    }

    pub fn set_value(&mut self, value: V) {
        self.value = Some(value);
        self.changed = true;
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
        self.changed = true;
    }

    /// Mark the entry removed.
    pub fn remove(&mut self) {
        self.value = None;
        self.changed = true;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn is_removed(&self) -> bool {
        self.changed && self.value.is_none()
    }

    /// Resolve the working copy into what the container should hold.
    ///
    /// Unchanged entries keep the original allocation. Writes are stamped with
    /// `now` as both creation and last-access time.
    pub fn commit(self, now: i64) -> Option<Arc<InternalEntry<K, V>>> {
        if !self.changed {
            return self.original;
        }
        self.value.map(|value| {
            Arc::new(InternalEntry::new(
                self.key,
                value,
                self.metadata.stamped(now),
            ))
        })
    }
}
