//! Persistence manager: fans cache operations out to the configured stores.

use super::store::{EntryStore, PurgeListener, PurgeStats, StoreLookup};
use crate::container::InternalEntry;
use crate::core::error::{StoreError, StoreResult};
use crate::core::interrupt::InterruptFlag;
use std::sync::Arc;

/// Operations the cache performs against its stores.
pub trait PersistenceManager<K, V>: Send + Sync {
    /// Whether any store is configured.
    fn is_enabled(&self) -> bool;

    fn write_to_all_stores(&self, entry: &InternalEntry<K, V>) -> StoreResult<()>;

    /// First live entry found, in store order.
    fn load_from_all_stores(&self, key: &K) -> StoreResult<Option<InternalEntry<K, V>>>;

    /// First store that knows the key, expired or not.
    fn load_entry(&self, key: &K) -> StoreResult<StoreLookup<K, V>>;

    /// Returns whether any store held the key.
    fn delete_from_all_stores(&self, key: &K) -> StoreResult<bool>;

    /// Purge every store. A failing store does not stop the others; the first
    /// failure is returned once all stores were tried.
    fn purge_expired(
        &self,
        listener: &dyn PurgeListener<K, V>,
        interrupt: &InterruptFlag,
    ) -> StoreResult<PurgeStats>;

    fn clear_all_stores(&self) -> StoreResult<()>;
}

/// Persistence manager over an ordered list of stores.
pub struct StoreManager<K, V> {
    stores: Vec<Arc<dyn EntryStore<K, V>>>,
}

impl<K, V> StoreManager<K, V> {
    pub fn new(stores: Vec<Arc<dyn EntryStore<K, V>>>) -> Self {
        Self { stores }
    }

    /// A manager with no stores; every operation is a no-op.
    pub fn disabled() -> Self {
        Self { stores: Vec::new() }
    }

    pub fn stores(&self) -> &[Arc<dyn EntryStore<K, V>>] {
        &self.stores
    }
}

impl<K, V> PersistenceManager<K, V> for StoreManager<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn is_enabled(&self) -> bool {
        !self.stores.is_empty()
    }

    fn write_to_all_stores(&self, entry: &InternalEntry<K, V>) -> StoreResult<()> {
        for store in &self.stores {
            store.write(entry)?;
        }
        Ok(())
    }

    fn load_from_all_stores(&self, key: &K) -> StoreResult<Option<InternalEntry<K, V>>> {
        for store in &self.stores {
            if let Some(entry) = store.load(key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn load_entry(&self, key: &K) -> StoreResult<StoreLookup<K, V>> {
        for store in &self.stores {
            match store.load_entry(key)? {
                StoreLookup::Missing => continue,
                found => return Ok(found),
            }
        }
        Ok(StoreLookup::Missing)
    }

    fn delete_from_all_stores(&self, key: &K) -> StoreResult<bool> {
        let mut removed = false;
        for store in &self.stores {
            removed |= store.delete(key)?;
        }
        Ok(removed)
    }

    fn purge_expired(
        &self,
        listener: &dyn PurgeListener<K, V>,
        interrupt: &InterruptFlag,
    ) -> StoreResult<PurgeStats> {
        let mut total = PurgeStats::default();
        let mut first_error: Option<StoreError> = None;
        for (index, store) in self.stores.iter().enumerate() {
            if interrupt.is_interrupted() {
                first_error.get_or_insert(StoreError::Interrupted);
                break;
            }
            match store.purge(listener, interrupt) {
                Ok(stats) => {
                    total.candidates += stats.candidates;
                    total.skipped_busy += stats.skipped_busy;
                    total.purged_entries += stats.purged_entries;
                    total.updated_buckets += stats.updated_buckets;
                    total.deleted_buckets += stats.deleted_buckets;
                    total.failed_batches += stats.failed_batches;
                }
                Err(err) => {
                    tracing::error!(store = index, error = %err, "store purge failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(total),
        }
    }

    fn clear_all_stores(&self) -> StoreResult<()> {
        for store in &self.stores {
            store.clear()?;
        }
        Ok(())
    }
}
