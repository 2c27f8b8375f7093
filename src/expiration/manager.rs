//! Expiration manager.
//!
//! Removes expired entries from the container and the stores and fires the
//! matching notifications. Writers lease their key for the duration of a
//! write so a sweep that races them does not report an expiration the write
//! is about to supersede.

use super::notifier::CacheNotifier;
use crate::container::{DataContainer, EntryRef, GridKey, GridValue};
use crate::core::error::{StoreError, StoreResult};
use crate::core::interrupt::InterruptFlag;
use crate::core::striped::StripedMap;
use crate::core::time::TimeService;
use crate::persistence::{PersistenceManager, PurgeListener, PurgeStats, StoredEntry};
use parking_lot::Mutex;
use std::sync::Arc;

/// Outcome of one expiration sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Entries looked at in the container.
    pub examined: usize,
    /// Entries found expired.
    pub expired: usize,
    /// Expired entries removed and reported.
    pub removed: usize,
    /// Expired entries skipped because a write was in flight.
    pub suppressed: usize,
    /// Whether the sweep stopped early on an interruption.
    pub interrupted: bool,
    /// Store purge outcome, if the purge ran and succeeded.
    pub purge: Option<PurgeStats>,
    /// Entries reported after being purged from a store.
    pub purged_notified: usize,
    /// Failure that ended the in-memory sweep early.
    pub sweep_error: Option<String>,
    /// Failure reported by the store purge.
    pub purge_error: Option<String>,
}

/// Coordinates in-memory and in-store expiration.
pub struct ExpirationManager<K, V> {
    container: Arc<dyn DataContainer<K, V>>,
    persistence: Arc<dyn PersistenceManager<K, V>>,
    notifier: Arc<dyn CacheNotifier<K, V>>,
    time: Arc<dyn TimeService>,
    /// Keys with a write in flight, with the number of writers holding them.
    leases: StripedMap<K, usize>,
}

impl<K: GridKey, V: GridValue> ExpirationManager<K, V> {
    pub fn new(
        container: Arc<dyn DataContainer<K, V>>,
        persistence: Arc<dyn PersistenceManager<K, V>>,
        notifier: Arc<dyn CacheNotifier<K, V>>,
        time: Arc<dyn TimeService>,
        lease_segments: usize,
    ) -> Self {
        Self {
            container,
            persistence,
            notifier,
            time,
            leases: StripedMap::new(lease_segments),
        }
    }

    pub fn time(&self) -> &Arc<dyn TimeService> {
        &self.time
    }

    /// Run one full sweep: the container first, then the stores.
    ///
    /// A failure in either half is logged and recorded in the returned stats;
    /// it never escapes, so a scheduled caller keeps running.
    pub fn process_expiration(&self, interrupt: &InterruptFlag) -> SweepStats {
        let mut stats = SweepStats::default();
        if interrupt.is_interrupted() {
            stats.interrupted = true;
            return stats;
        }

        tracing::trace!("purging data container of expired entries");
        let now = self.time.wall_clock_ms();
        for entry in self.container.iter_including_expired() {
            if interrupt.is_interrupted() {
                stats.interrupted = true;
                break;
            }
            stats.examined += 1;
            if !entry.is_expired(now) {
                continue;
            }
            stats.expired += 1;
            if self.is_write_incoming(&entry.key) {
                tracing::trace!(key = ?entry.key, "write in flight, expiration suppressed");
                stats.suppressed += 1;
                continue;
            }
            match self.handle_in_memory_expiration(&entry, now) {
                Ok(true) => stats.removed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "expiration sweep of data container failed");
                    stats.sweep_error = Some(err.to_string());
                    break;
                }
            }
        }

        if interrupt.is_interrupted() {
            stats.interrupted = true;
            return stats;
        }

        if self.persistence.is_enabled() {
            let collector = PurgedEntries::default();
            match self.persistence.purge_expired(&collector, interrupt) {
                Ok(purge) => stats.purge = Some(purge),
                Err(StoreError::Interrupted) => stats.interrupted = true,
                Err(err) => stats.purge_error = Some(err.to_string()),
            }
            // Purged entries are reported once the store released its bucket locks.
            for (key, stored) in collector.into_inner() {
                if self.handle_purged_entry(&key, stored) {
                    stats.purged_notified += 1;
                }
            }
        }

        tracing::debug!(
            examined = stats.examined,
            removed = stats.removed,
            suppressed = stats.suppressed,
            purged = stats.purged_notified,
            "expiration sweep finished"
        );
        stats
    }

    /// Expire `entry` if it is still the entry the container holds.
    ///
    /// Returns whether it was removed. A concurrent write or removal wins and
    /// nothing is reported for the stale entry.
    pub fn handle_in_memory_expiration(&self, entry: &EntryRef<K, V>, now: i64) -> StoreResult<bool> {
        let mut outcome = Ok(false);
        self.container.compute(&entry.key, &mut |key, current| {
            let current = current?;
            if !Arc::ptr_eq(&current, entry) {
                return Some(current);
            }
            // Stores are cleaned too so no node reports the same expiration twice.
            if let Err(err) = self.persistence.delete_from_all_stores(key) {
                outcome = Err(err);
                return Some(current);
            }
            tracing::trace!(key = ?key, expired_at = now, "expired entry removed from memory");
            self.notifier
                .entry_expired(key, Some(&current.value), Some(&current.metadata));
            outcome = Ok(true);
            None
        });
        outcome
    }

    /// Expire `key` after a store load found its entry expired.
    ///
    /// Runs without the write lease, so a concurrent remove may already have
    /// emptied the slot; that case is still reported, which can produce one
    /// extra notification but never misses one.
    pub fn handle_in_store_expiration(&self, key: &K) -> StoreResult<bool> {
        let mut outcome = Ok(false);
        self.container.compute(key, &mut |key, current| {
            let now = self.time.wall_clock_ms();
            let expired = match &current {
                None => true,
                Some(entry) => entry.can_expire() && entry.is_expired(now),
            };
            if !expired {
                return current;
            }
            if let Err(err) = self.persistence.delete_from_all_stores(key) {
                outcome = Err(err);
                return current;
            }
            match &current {
                Some(entry) => {
                    self.notifier
                        .entry_expired(key, Some(&entry.value), Some(&entry.metadata))
                }
                None => self.notifier.entry_expired(key, None, None),
            }
            outcome = Ok(true);
            None
        });
        outcome
    }

    /// Report an entry a store purge removed, dropping the in-memory copy if
    /// it is expired as well. A live in-memory copy means the key was
    /// rewritten and nothing is reported.
    fn handle_purged_entry(&self, key: &K, stored: StoredEntry<V>) -> bool {
        if self.is_write_incoming(key) {
            return false;
        }
        let mut notified = false;
        self.container.compute(key, &mut |key, current| {
            let now = self.time.wall_clock_ms();
            match current {
                Some(entry) if !entry.is_expired(now) => Some(entry),
                Some(entry) => {
                    self.notifier
                        .entry_expired(key, Some(&entry.value), Some(&entry.metadata));
                    notified = true;
                    None
                }
                None => {
                    self.notifier
                        .entry_expired(key, Some(&stored.value), Some(&stored.metadata));
                    notified = true;
                    None
                }
            }
        });
        notified
    }

    /// Mark `key` as about to be written.
    pub fn register_write_incoming(&self, key: &K) {
        self.leases.with_segment(key, |leases| {
            *leases.entry(key.clone()).or_insert(0) += 1;
        });
    }

    /// Release one lease on `key`.
    pub fn unregister_write(&self, key: &K) {
        self.leases.with_segment(key, |leases| {
            if let Some(count) = leases.get_mut(key) {
                *count -= 1;
                if *count == 0 {
                    leases.remove(key);
                }
            }
        });
    }

    pub fn is_write_incoming(&self, key: &K) -> bool {
        self.leases.with_segment(key, |leases| leases.contains_key(key))
    }

    /// Lease `key` until the returned guard is dropped.
    pub fn lease_write(&self, key: &K) -> WriteLease<'_, K, V> {
        self.register_write_incoming(key);
        WriteLease {
            manager: self,
            key: key.clone(),
        }
    }

    /// Leases currently held.
    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }
}

/// Write lease released on drop, whichever way the write exits.
pub struct WriteLease<'a, K: GridKey, V: GridValue> {
    manager: &'a ExpirationManager<K, V>,
    key: K,
}

impl<K: GridKey, V: GridValue> WriteLease<'_, K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: GridKey, V: GridValue> Drop for WriteLease<'_, K, V> {
    fn drop(&mut self) {
        self.manager.unregister_write(&self.key);
    }
}

/// Purge listener that only records what was removed.
///
/// It runs while the store holds bucket locks, so it must not touch the
/// container; the manager reports the entries after the purge returns.
struct PurgedEntries<K, V> {
    entries: Mutex<Vec<(K, StoredEntry<V>)>>,
}

impl<K, V> Default for PurgedEntries<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<K, V> PurgedEntries<K, V> {
    fn into_inner(self) -> Vec<(K, StoredEntry<V>)> {
        self.entries.into_inner()
    }
}

impl<K: GridKey, V: GridValue> PurgeListener<K, V> for PurgedEntries<K, V> {
    fn entry_purged(&self, key: &K, entry: &StoredEntry<V>) {
        self.entries.lock().push((key.clone(), entry.clone()));
    }
}

impl<K, V> std::fmt::Debug for ExpirationManager<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirationManager").finish_non_exhaustive()
    }
}

