//! Buckets: groups of entries sharing one stored row.
//!
//! A key's bucket id is its 32-bit hash with the low bits cleared, so the
//! number of rows (and row locks) stays bounded regardless of key count.

use super::medium::Row;
use crate::container::{InternalEntry, Metadata};
use crate::core::error::{StoreError, StoreResult};
use crate::core::striped::stable_hash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;

/// Identifier of a bucket row.
pub type BucketId = u32;

/// Source of the 32-bit key hash buckets are derived from.
pub trait KeyHasher<K>: Send + Sync {
    fn hash_key(&self, key: &K) -> u32;
}

/// Default hasher: XxHash64 folded to 32 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct StableKeyHasher;

impl<K: Hash> KeyHasher<K> for StableKeyHasher {
    fn hash_key(&self, key: &K) -> u32 {
        let hash = stable_hash(key);
        (hash ^ (hash >> 32)) as u32
    }
}

/// Maps keys to bucket ids.
pub struct BucketMapper<K> {
    hasher: Box<dyn KeyHasher<K>>,
    mask: u32,
    _key: PhantomData<fn(&K)>,
}

impl<K> BucketMapper<K> {
    /// Clear the `low_bits` lowest bits of each hash.
    pub fn new(hasher: Box<dyn KeyHasher<K>>, low_bits: u32) -> Self {
        let mask = u32::MAX.checked_shl(low_bits).unwrap_or(0);
        Self {
            hasher,
            mask,
            _key: PhantomData,
        }
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn bucket_id(&self, key: &K) -> BucketId {
        self.hasher.hash_key(key) & self.mask
    }
}

/// Value and metadata as stored inside a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry<V> {
    pub value: V,
    pub metadata: Metadata,
}

impl<V> StoredEntry<V> {
    pub fn is_expired(&self, now: i64) -> bool {
        self.metadata.is_expired(now)
    }
}

/// Decoded contents of one bucket row.
#[derive(Debug, Clone)]
pub struct Bucket<K, V> {
    id: BucketId,
    entries: HashMap<K, StoredEntry<V>>,
}

impl<K, V> Bucket<K, V>
where
    K: Clone + Eq + Hash + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn new(id: BucketId) -> Self {
        Self {
            id,
            entries: HashMap::new(),
        }
    }

    pub fn id(&self) -> BucketId {
        self.id
    }

    /// Row key of this bucket.
    pub fn id_as_string(&self) -> String {
        self.id.to_string()
    }

    /// Parse a row key back into a bucket id.
    pub fn parse_id(bucket_id: &str) -> StoreResult<BucketId> {
        bucket_id.parse().map_err(|_| StoreError::CorruptRow {
            bucket_id: bucket_id.to_string(),
            reason: "bucket id is not a 32-bit unsigned integer".to_string(),
        })
    }

    /// Decode a row.
    pub fn from_row(row: &Row) -> StoreResult<Self> {
        let id = Self::parse_id(&row.bucket_id)?;
        let entries = bincode::deserialize(&row.payload).map_err(|source| StoreError::Codec {
            bucket_id: row.bucket_id.clone(),
            source,
        })?;
        Ok(Self { id, entries })
    }

    /// Encode into a row carrying the current earliest expiry.
    pub fn to_row(&self) -> StoreResult<Row> {
        let payload = bincode::serialize(&self.entries).map_err(|source| StoreError::Codec {
            bucket_id: self.id_as_string(),
            source,
        })?;
        Ok(Row {
            bucket_id: self.id_as_string(),
            payload,
            earliest_expiry: self.timestamp_of_first_entry_to_expire(),
        })
    }

    pub fn add_entry(&mut self, key: K, entry: StoredEntry<V>) {
        self.entries.insert(key, entry);
    }

    /// Remove `key`, returning whether it was present.
    pub fn remove_entry(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Live entry for `key`.
    pub fn get_entry(&self, key: &K, now: i64) -> Option<&StoredEntry<V>> {
        self.entries.get(key).filter(|entry| !entry.is_expired(now))
    }

    /// Entry for `key`, expired or not.
    pub fn peek_entry(&self, key: &K) -> Option<&StoredEntry<V>> {
        self.entries.get(key)
    }

    /// Drop and return every entry expired at `now`.
    pub fn remove_expired_entries(&mut self, now: i64) -> Vec<(K, StoredEntry<V>)> {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|entry| (key, entry)))
            .collect()
    }

    /// Earliest expiry among the entries, `-1` when none can expire.
    pub fn timestamp_of_first_entry_to_expire(&self) -> i64 {
        self.entries
            .values()
            .filter_map(|entry| entry.metadata.expiry_time())
            .min()
            .unwrap_or(-1)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Live entries as full entries.
    pub fn live_entries(&self, now: i64) -> impl Iterator<Item = InternalEntry<K, V>> + '_ {
        self.entries
            .iter()
            .filter(move |(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| InternalEntry::new(key.clone(), entry.value.clone(), entry.metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedHasher(u32);

    impl KeyHasher<String> for FixedHasher {
        fn hash_key(&self, _key: &String) -> u32 {
            self.0
        }
    }

    #[test]
    fn low_bits_are_masked() {
        let mapper = BucketMapper::new(Box::new(FixedHasher((7 << 10) | 0x3ff)), 10);
        assert_eq!(mapper.bucket_id(&"k".to_string()), 7 << 10);
        assert_eq!(mapper.mask(), 0xffff_fc00);
    }

    #[test]
    fn earliest_expiry_tracks_entries() {
        let mut bucket: Bucket<String, i32> = Bucket::new(0);
        assert_eq!(bucket.timestamp_of_first_entry_to_expire(), -1);
        bucket.add_entry(
            "a".into(),
            StoredEntry {
                value: 1,
                metadata: Metadata::with_lifespan(500).stamped(100),
            },
        );
        bucket.add_entry(
            "b".into(),
            StoredEntry {
                value: 2,
                metadata: Metadata::with_lifespan(50).stamped(100),
            },
        );
        assert_eq!(bucket.timestamp_of_first_entry_to_expire(), 150);

        let expired = bucket.remove_expired_entries(200);
        assert_eq!(expired.len(), 1);
        assert_eq!(bucket.timestamp_of_first_entry_to_expire(), 600);
    }

    #[test]
    fn row_round_trip_keeps_entries() {
        let mut bucket: Bucket<String, i32> = Bucket::new(1024);
        bucket.add_entry(
            "a".into(),
            StoredEntry {
                value: 1,
                metadata: Metadata::immortal(),
            },
        );
        let row = bucket.to_row().unwrap();
        assert_eq!(row.bucket_id, "1024");
        let decoded: Bucket<String, i32> = Bucket::from_row(&row).unwrap();
        assert_eq!(decoded.get_entry(&"a".to_string(), 0).unwrap().value, 1);
    }
}
