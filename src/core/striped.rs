//! Lock striping and stable key hashing.
//!
//! Keys are hashed with XxHash64 under a fixed seed so that stripe, segment
//! and bucket selection is stable across processes. Stripe counts are rounded
//! up to a power of two and selected by masking.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

/// Seed used for every stable hash in the crate.
pub const HASH_SEED: u64 = 0x6772_6964;

/// Hash a key with the crate-wide stable hasher.
pub fn stable_hash<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = XxHash64::with_seed(HASH_SEED);
    key.hash(&mut hasher);
    hasher.finish()
}

fn stripe_count(requested: usize) -> usize {
    requested.max(1).next_power_of_two()
}

/// Fixed set of reader/writer locks selected by hash.
///
/// Guards protect no data of their own; they serialize access to whatever
/// the hash identifies (a bucket row, for the bucket store).
pub struct StripedRwLock {
    stripes: Box<[RwLock<()>]>,
    mask: usize,
}

impl StripedRwLock {
    /// Create a striped lock with at least `concurrency_level` stripes.
    pub fn new(concurrency_level: usize) -> Self {
        let count = stripe_count(concurrency_level);
        let stripes = (0..count).map(|_| RwLock::new(())).collect();
        Self {
            stripes,
            mask: count - 1,
        }
    }

    /// Number of stripes.
    pub fn len(&self) -> usize {
        self.stripes.len()
    }

    /// Always false; a striped lock has at least one stripe.
    pub fn is_empty(&self) -> bool {
        self.stripes.is_empty()
    }

    /// Stripe index for a hash.
    pub fn stripe_for(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    /// Acquire the stripe for `hash` in shared mode.
    pub fn read(&self, hash: u64) -> RwLockReadGuard<'_, ()> {
        self.stripes[self.stripe_for(hash)].read()
    }

    /// Acquire the stripe for `hash` in exclusive mode.
    pub fn write(&self, hash: u64) -> RwLockWriteGuard<'_, ()> {
        self.stripes[self.stripe_for(hash)].write()
    }

    /// Try to acquire a stripe exclusively without waiting.
    pub fn try_write_stripe(&self, stripe: usize) -> Option<RwLockWriteGuard<'_, ()>> {
        self.stripes[stripe & self.mask].try_write()
    }
}

/// Hash map split into independently locked segments.
pub struct StripedMap<K, V> {
    segments: Box<[Mutex<HashMap<K, V>>]>,
    mask: usize,
}

impl<K: Hash + Eq, V> StripedMap<K, V> {
    /// Create a map with at least `segments` segments.
    pub fn new(segments: usize) -> Self {
        let count = stripe_count(segments);
        let segments = (0..count).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            segments,
            mask: count - 1,
        }
    }

    /// Index of the segment owning `key`.
    pub fn segment_of(&self, key: &K) -> usize {
        (stable_hash(key) as usize) & self.mask
    }

    /// Run `f` with exclusive access to the segment owning `key`.
    pub fn with_segment<R>(&self, key: &K, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let mut segment = self.segments[self.segment_of(key)].lock();
        f(&mut segment)
    }

    /// Run `f` with exclusive access to the segment at `index`.
    pub fn with_segment_at<R>(&self, index: usize, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let mut segment = self.segments[index & self.mask].lock();
        f(&mut segment)
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Total entries across segments. Not a consistent snapshot.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.lock().len()).sum()
    }

    /// Check whether every segment is empty.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.lock().is_empty())
    }

    /// Remove every entry.
    pub fn clear(&self) {
        for segment in self.segments.iter() {
            segment.lock().clear();
        }
    }
}
