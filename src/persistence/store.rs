//! Bucket store.
//!
//! Entries are grouped into buckets (see [`super::bucket`]); every bucket is
//! one row on the backing medium and is guarded by a striped reader/writer
//! lock. Single-key operations lock one bucket. Purge and scan fan work out to
//! a scoped worker pool fed through crossbeam channels.
//!
//! Purge lock discipline: bucket locks are only ever taken and released on the
//! purging thread. Workers report back which buckets they finished with over a
//! completion channel and the purging thread unlocks them, including when a
//! worker fails. Buckets left empty stay locked until their rows are deleted.

use super::bucket::{Bucket, BucketId, BucketMapper, KeyHasher, StableKeyHasher, StoredEntry};
use super::medium::{BackingMedium, Row};
use crate::container::{GridKey, GridValue, InternalEntry};
use crate::core::config::PersistenceConfig;
use crate::core::error::{MediumError, StoreError, StoreResult};
use crate::core::interrupt::InterruptFlag;
use crate::core::striped::{stable_hash, StripedRwLock};
use crate::core::time::TimeService;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::RwLockWriteGuard;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Bucket store tuning.
#[derive(Debug, Clone)]
pub struct BucketStoreConfig {
    pub bucket_low_bits: u32,
    pub lock_concurrency_level: usize,
    pub purge_batch_size: usize,
    pub parallelism: usize,
    pub tolerate_corrupt_buckets: bool,
}

impl Default for BucketStoreConfig {
    fn default() -> Self {
        Self::from(&PersistenceConfig::default())
    }
}

impl From<&PersistenceConfig> for BucketStoreConfig {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            bucket_low_bits: config.bucket_low_bits,
            lock_concurrency_level: config.lock_concurrency_level,
            purge_batch_size: config.purge_batch_size,
            parallelism: config.parallelism,
            tolerate_corrupt_buckets: config.tolerate_corrupt_buckets,
        }
    }
}

/// Receives every entry removed by a purge.
///
/// Called from purge worker threads while the entry's bucket is locked; it
/// must not call back into the same store.
pub trait PurgeListener<K, V>: Sync {
    fn entry_purged(&self, key: &K, entry: &StoredEntry<V>);
}

/// Purge statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Rows selected as purge candidates.
    pub candidates: usize,
    /// Candidates skipped because their bucket was busy.
    pub skipped_busy: usize,
    /// Entries removed and reported to the listener.
    pub purged_entries: usize,
    /// Rows rewritten with their remaining entries.
    pub updated_buckets: usize,
    /// Empty rows deleted.
    pub deleted_buckets: usize,
    /// Batches that failed; their buckets were unlocked untouched.
    pub failed_batches: usize,
}

/// Shared state of a running scan; visitors may stop it early.
#[derive(Debug, Default)]
pub struct ScanContext {
    stopped: AtomicBool,
}

impl ScanContext {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Outcome of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Buckets read.
    pub buckets: usize,
    /// Entries handed to the visitor.
    pub visited: usize,
    /// Buckets that could not be decoded, with the reason.
    pub skipped_corrupt: Vec<(String, String)>,
    /// Whether the scan stopped before reading every bucket.
    pub stopped: bool,
}

/// Result of a single-key lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreLookup<K, V> {
    Found(InternalEntry<K, V>),
    /// Present but expired at lookup time.
    Expired(InternalEntry<K, V>),
    Missing,
}

pub type KeyFilter<'a, K> = &'a (dyn Fn(&K) -> bool + Sync);
pub type EntryVisitor<'a, K, V> = &'a (dyn Fn(InternalEntry<K, V>, &ScanContext) + Sync);

/// Durable entry storage.
pub trait EntryStore<K, V>: Send + Sync {
    /// Insert or overwrite; an already expired entry is deleted instead.
    fn write(&self, entry: &InternalEntry<K, V>) -> StoreResult<()>;

    /// Look up `key`, distinguishing expired entries from missing ones.
    fn load_entry(&self, key: &K) -> StoreResult<StoreLookup<K, V>>;

    /// Live entry for `key`.
    fn load(&self, key: &K) -> StoreResult<Option<InternalEntry<K, V>>> {
        Ok(match self.load_entry(key)? {
            StoreLookup::Found(entry) => Some(entry),
            _ => None,
        })
    }

    fn contains(&self, key: &K) -> StoreResult<bool> {
        Ok(self.load(key)?.is_some())
    }

    /// Remove `key`, returning whether it was present.
    fn delete(&self, key: &K) -> StoreResult<bool>;

    /// Remove every expired entry, reporting each to `listener`.
    fn purge(
        &self,
        listener: &dyn PurgeListener<K, V>,
        interrupt: &InterruptFlag,
    ) -> StoreResult<PurgeStats>;

    /// Visit every live entry whose key passes `filter`.
    fn scan_all(
        &self,
        filter: KeyFilter<'_, K>,
        visitor: EntryVisitor<'_, K, V>,
        parallelism: usize,
        interrupt: &InterruptFlag,
    ) -> StoreResult<ScanReport>;

    /// Remove everything. Returns rows removed.
    fn clear(&self) -> StoreResult<usize>;

    /// Number of live entries.
    fn size(&self) -> StoreResult<usize>;
}

/// Entry store over bucket rows.
pub struct BucketStore<K, V> {
    medium: Arc<dyn BackingMedium>,
    mapper: BucketMapper<K>,
    locks: StripedRwLock,
    time: Arc<dyn TimeService>,
    config: BucketStoreConfig,
    _value: PhantomData<fn() -> V>,
}

impl<K: GridKey, V: GridValue> BucketStore<K, V> {
    pub fn new(
        medium: Arc<dyn BackingMedium>,
        time: Arc<dyn TimeService>,
        config: BucketStoreConfig,
    ) -> Self {
        Self::with_hasher(medium, time, config, Box::new(StableKeyHasher))
    }

    /// Create a store with a custom key hasher.
    pub fn with_hasher(
        medium: Arc<dyn BackingMedium>,
        time: Arc<dyn TimeService>,
        config: BucketStoreConfig,
        hasher: Box<dyn KeyHasher<K>>,
    ) -> Self {
        Self {
            medium,
            mapper: BucketMapper::new(hasher, config.bucket_low_bits),
            locks: StripedRwLock::new(config.lock_concurrency_level),
            time,
            config,
            _value: PhantomData,
        }
    }

    pub fn bucket_id(&self, key: &K) -> BucketId {
        self.mapper.bucket_id(key)
    }

    pub fn config(&self) -> &BucketStoreConfig {
        &self.config
    }

    // Bucket ids share their low bits, so stripes are picked by a full hash.
    fn lock_hash(bucket_id: BucketId) -> u64 {
        stable_hash(&bucket_id)
    }

    fn stripe_of(&self, bucket_id: BucketId) -> usize {
        self.locks.stripe_for(Self::lock_hash(bucket_id))
    }

    fn select_bucket(&self, bucket_id: BucketId) -> StoreResult<Option<Bucket<K, V>>> {
        let row = self
            .medium
            .select_row(&bucket_id.to_string())
            .map_err(|e| StoreError::medium("select bucket", e))?;
        row.map(|row| Bucket::from_row(&row)).transpose()
    }

    fn insert_bucket(&self, bucket: &Bucket<K, V>) -> StoreResult<()> {
        let row = bucket.to_row()?;
        let affected = self
            .medium
            .insert_row(&row)
            .map_err(|e| StoreError::medium("insert bucket", e))?;
        expect_one("insert", &row, affected)
    }

    fn update_bucket(&self, bucket: &Bucket<K, V>) -> StoreResult<()> {
        let row = bucket.to_row()?;
        let affected = self
            .medium
            .update_row(&row)
            .map_err(|e| StoreError::medium("update bucket", e))?;
        expect_one("update", &row, affected)
    }

    fn interrupted(&self, err: StoreError, interrupt: &InterruptFlag) -> StoreError {
        if matches!(err, StoreError::Interrupted) {
            interrupt.interrupt();
        }
        err
    }
}

fn expect_one(operation: &'static str, row: &Row, affected: usize) -> StoreResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StoreError::Integrity {
            operation,
            bucket_id: row.bucket_id.clone(),
            expected: 1,
            actual: affected,
        })
    }
}

impl<K: GridKey, V: GridValue> EntryStore<K, V> for BucketStore<K, V> {
    fn write(&self, entry: &InternalEntry<K, V>) -> StoreResult<()> {
        let now = self.time.wall_clock_ms();
        if entry.is_expired(now) {
            tracing::trace!(key = ?entry.key, "write of expired entry becomes delete");
            self.delete(&entry.key)?;
            return Ok(());
        }

        let bucket_id = self.bucket_id(&entry.key);
        let stored = StoredEntry {
            value: entry.value.clone(),
            metadata: entry.metadata,
        };
        let _guard = self.locks.write(Self::lock_hash(bucket_id));
        match self.select_bucket(bucket_id)? {
            Some(mut bucket) => {
                bucket.add_entry(entry.key.clone(), stored);
                self.update_bucket(&bucket)
            }
            None => {
                let mut bucket = Bucket::new(bucket_id);
                bucket.add_entry(entry.key.clone(), stored);
                self.insert_bucket(&bucket)
            }
        }
    }

    fn load_entry(&self, key: &K) -> StoreResult<StoreLookup<K, V>> {
        let now = self.time.wall_clock_ms();
        let bucket_id = self.bucket_id(key);
        let _guard = self.locks.read(Self::lock_hash(bucket_id));
        let Some(bucket) = self.select_bucket(bucket_id)? else {
            return Ok(StoreLookup::Missing);
        };
        Ok(match bucket.peek_entry(key) {
            None => StoreLookup::Missing,
            Some(stored) => {
                let entry = InternalEntry::new(key.clone(), stored.value.clone(), stored.metadata);
                if stored.is_expired(now) {
                    StoreLookup::Expired(entry)
                } else {
                    StoreLookup::Found(entry)
                }
            }
        })
    }

    fn delete(&self, key: &K) -> StoreResult<bool> {
        let bucket_id = self.bucket_id(key);
        let _guard = self.locks.write(Self::lock_hash(bucket_id));
        let Some(mut bucket) = self.select_bucket(bucket_id)? else {
            return Ok(false);
        };
        if !bucket.remove_entry(key) {
            return Ok(false);
        }
        // Empty rows are left for purge to delete.
        self.update_bucket(&bucket)?;
        Ok(true)
    }

    fn purge(
        &self,
        listener: &dyn PurgeListener<K, V>,
        interrupt: &InterruptFlag,
    ) -> StoreResult<PurgeStats> {
        let now = self.time.wall_clock_ms();
        let workers = self.config.parallelism.max(1);
        let (job_tx, job_rx) = unbounded::<Vec<BucketId>>();
        let (done_tx, done_rx) = unbounded::<BatchOutcome>();

        let result = thread::scope(|scope| {
            for _ in 0..workers {
                let jobs = job_rx.clone();
                let done = done_tx.clone();
                scope.spawn(move || self.purge_worker(jobs, done, now, listener, interrupt));
            }
            drop(job_rx);
            drop(done_tx);

            let mut coordinator = PurgeCoordinator::new(self);
            let scheduled = coordinator.schedule(now, &job_tx, &done_rx, interrupt);
            drop(job_tx);
            coordinator.drain(&done_rx);
            coordinator.flush_empty(0);
            coordinator.release_all();
            let stats = std::mem::take(&mut coordinator.stats);
            scheduled.map(|()| stats)
        });

        match result {
            Ok(stats) => {
                tracing::debug!(
                    candidates = stats.candidates,
                    skipped_busy = stats.skipped_busy,
                    purged = stats.purged_entries,
                    deleted_buckets = stats.deleted_buckets,
                    "purged bucket store"
                );
                Ok(stats)
            }
            Err(err) => Err(self.interrupted(err, interrupt)),
        }
    }

    fn scan_all(
        &self,
        filter: KeyFilter<'_, K>,
        visitor: EntryVisitor<'_, K, V>,
        parallelism: usize,
        interrupt: &InterruptFlag,
    ) -> StoreResult<ScanReport> {
        let now = self.time.wall_clock_ms();
        let workers = parallelism.max(1);
        let ctx = ScanContext::default();
        let (row_tx, row_rx) = bounded::<Row>(workers * 2);
        let (done_tx, done_rx) = unbounded::<ScanOutcome>();

        let streamed = thread::scope(|scope| {
            for _ in 0..workers {
                let rows = row_rx.clone();
                let done = done_tx.clone();
                let ctx = &ctx;
                scope.spawn(move || scan_worker::<K, V>(rows, done, now, filter, visitor, ctx));
            }
            drop(row_rx);
            let corrupt_tx = done_tx;

            let streamed = (|| -> StoreResult<()> {
                let rows = self
                    .medium
                    .select_all_rows()
                    .map_err(|e| StoreError::medium("select rows", e))?;
                for row in rows {
                    if ctx.is_stopped() || interrupt.is_interrupted() {
                        break;
                    }
                    let row = match row {
                        Ok(row) => row,
                        Err(MediumError::CorruptRow { bucket_id, reason }) => {
                            let _ = corrupt_tx.send(ScanOutcome::Corrupt { bucket_id, reason });
                            continue;
                        }
                        Err(err) => return Err(StoreError::medium("read row", err)),
                    };
                    if row_tx.send(row).is_err() {
                        break;
                    }
                }
                Ok(())
            })();
            drop(row_tx);
            drop(corrupt_tx);
            streamed
        });

        let mut report = ScanReport::default();
        for outcome in done_rx.try_iter() {
            match outcome {
                ScanOutcome::Bucket { visited } => {
                    report.buckets += 1;
                    report.visited += visited;
                }
                ScanOutcome::Corrupt { bucket_id, reason } => {
                    tracing::warn!(bucket_id = %bucket_id, reason = %reason, "unreadable bucket during scan");
                    report.skipped_corrupt.push((bucket_id, reason));
                }
            }
        }
        streamed.map_err(|err| self.interrupted(err, interrupt))?;
        if interrupt.is_interrupted() {
            return Err(StoreError::Interrupted);
        }
        report.stopped = ctx.is_stopped();

        if !self.config.tolerate_corrupt_buckets && !report.skipped_corrupt.is_empty() {
            return Err(StoreError::Scan {
                failures: report
                    .skipped_corrupt
                    .iter()
                    .map(|(id, reason)| format!("{id}: {reason}"))
                    .collect(),
            });
        }
        Ok(report)
    }

    fn clear(&self) -> StoreResult<usize> {
        let removed = self
            .medium
            .delete_all()
            .map_err(|e| StoreError::medium("clear", e))?;
        tracing::debug!(rows = removed, "cleared bucket store");
        Ok(removed)
    }

    fn size(&self) -> StoreResult<usize> {
        let count = AtomicUsize::new(0);
        let visitor = |_: InternalEntry<K, V>, _: &ScanContext| {
            count.fetch_add(1, Ordering::Relaxed);
        };
        self.scan_all(
            &|_| true,
            &visitor,
            self.config.parallelism,
            &InterruptFlag::new(),
        )?;
        Ok(count.into_inner())
    }
}

/// What a purge worker reports for one batch.
struct BatchOutcome {
    /// Buckets to unlock now.
    release: Vec<BucketId>,
    /// Buckets left empty; unlocked after their rows are deleted.
    empty: Vec<BucketId>,
    purged_entries: usize,
    updated_buckets: usize,
    error: Option<StoreError>,
}

impl<K: GridKey, V: GridValue> BucketStore<K, V> {
    fn purge_worker(
        &self,
        jobs: Receiver<Vec<BucketId>>,
        done: Sender<BatchOutcome>,
        now: i64,
        listener: &dyn PurgeListener<K, V>,
        interrupt: &InterruptFlag,
    ) {
        for batch in jobs {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.purge_batch(&batch, now, listener, interrupt)
            }))
            .unwrap_or_else(|_| BatchOutcome {
                release: batch.clone(),
                empty: Vec::new(),
                purged_entries: 0,
                updated_buckets: 0,
                error: Some(StoreError::Task {
                    message: "purge task panicked".to_string(),
                }),
            });
            if done.send(outcome).is_err() {
                break;
            }
        }
    }

    /// Purge one batch of buckets whose locks the coordinator holds.
    fn purge_batch(
        &self,
        batch: &[BucketId],
        now: i64,
        listener: &dyn PurgeListener<K, V>,
        interrupt: &InterruptFlag,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            release: Vec::with_capacity(batch.len()),
            empty: Vec::new(),
            purged_entries: 0,
            updated_buckets: 0,
            error: None,
        };
        let mut updates = Vec::new();

        for (index, &bucket_id) in batch.iter().enumerate() {
            let step = if interrupt.is_interrupted() {
                Err(StoreError::Interrupted)
            } else {
                self.purge_bucket(bucket_id, now, listener)
            };
            match step {
                Ok(PurgedBucket::Empty(removed)) => {
                    outcome.purged_entries += removed;
                    outcome.empty.push(bucket_id);
                }
                Ok(PurgedBucket::Remaining(removed, row)) => {
                    outcome.purged_entries += removed;
                    updates.extend(row);
                    outcome.release.push(bucket_id);
                }
                Err(err) => {
                    outcome.release.extend_from_slice(&batch[index..]);
                    outcome.error = Some(err);
                    break;
                }
            }
        }

        if !updates.is_empty() {
            match self.medium.update_rows(&updates) {
                Ok(counts) => {
                    for (row, affected) in updates.iter().zip(counts) {
                        match expect_one("update", row, affected) {
                            Ok(()) => outcome.updated_buckets += 1,
                            Err(err) => {
                                outcome.error.get_or_insert(err);
                            }
                        }
                    }
                }
                Err(err) => {
                    outcome
                        .error
                        .get_or_insert(StoreError::medium("update buckets", err));
                }
            }
        }
        outcome
    }

    fn purge_bucket(
        &self,
        bucket_id: BucketId,
        now: i64,
        listener: &dyn PurgeListener<K, V>,
    ) -> StoreResult<PurgedBucket> {
        // Re-read under the lock; the candidate row may be stale.
        let Some(mut bucket) = self.select_bucket(bucket_id)? else {
            return Ok(PurgedBucket::Remaining(0, None));
        };
        let removed = bucket.remove_expired_entries(now);
        for (key, entry) in &removed {
            tracing::trace!(bucket_id, key = ?key, "purged entry");
            listener.entry_purged(key, entry);
        }
        if bucket.is_empty() {
            Ok(PurgedBucket::Empty(removed.len()))
        } else if removed.is_empty() {
            Ok(PurgedBucket::Remaining(0, None))
        } else {
            Ok(PurgedBucket::Remaining(removed.len(), Some(bucket.to_row()?)))
        }
    }
}

enum PurgedBucket {
    Empty(usize),
    Remaining(usize, Option<Row>),
}

/// Lock bookkeeping for the purging thread.
struct PurgeCoordinator<'s, K, V> {
    store: &'s BucketStore<K, V>,
    /// Held stripes with the number of scheduled buckets mapped to each.
    held: HashMap<usize, (RwLockWriteGuard<'s, ()>, usize)>,
    pending_empty: Vec<BucketId>,
    in_flight: usize,
    stats: PurgeStats,
}

impl<'s, K: GridKey, V: GridValue> PurgeCoordinator<'s, K, V> {
    fn new(store: &'s BucketStore<K, V>) -> Self {
        Self {
            store,
            held: HashMap::new(),
            pending_empty: Vec::new(),
            in_flight: 0,
            stats: PurgeStats::default(),
        }
    }

    /// Lock the bucket's stripe without waiting, reusing a stripe already held.
    fn try_lock(&mut self, bucket_id: BucketId) -> bool {
        let stripe = self.store.stripe_of(bucket_id);
        if let Some((_, count)) = self.held.get_mut(&stripe) {
            *count += 1;
            return true;
        }
        match self.store.locks.try_write_stripe(stripe) {
            Some(guard) => {
                self.held.insert(stripe, (guard, 1));
                true
            }
            None => false,
        }
    }

    fn unlock(&mut self, bucket_id: BucketId) {
        let stripe = self.store.stripe_of(bucket_id);
        if let Some((_, count)) = self.held.get_mut(&stripe) {
            *count -= 1;
            if *count == 0 {
                self.held.remove(&stripe);
            }
        }
    }

    /// Stream candidates, lock what is free and hand batches to workers.
    fn schedule(
        &mut self,
        now: i64,
        jobs: &Sender<Vec<BucketId>>,
        done: &Receiver<BatchOutcome>,
        interrupt: &InterruptFlag,
    ) -> StoreResult<()> {
        let batch_size = self.store.config.purge_batch_size.max(1);
        let rows = self
            .store
            .medium
            .select_expired_rows(now)
            .map_err(|e| StoreError::medium("select expired rows", e))?;
        let mut batch = Vec::with_capacity(batch_size);

        for row in rows {
            if interrupt.is_interrupted() {
                self.abandon(batch);
                return Err(StoreError::Interrupted);
            }
            let row = match row {
                Ok(row) => row,
                Err(MediumError::CorruptRow { bucket_id, reason }) => {
                    tracing::warn!(
                        bucket_id = %bucket_id,
                        reason = %reason,
                        "skipping undecodable purge candidate"
                    );
                    continue;
                }
                Err(err) => {
                    self.abandon(batch);
                    return Err(StoreError::medium("read expired row", err));
                }
            };
            self.stats.candidates += 1;
            let bucket_id = match Bucket::<K, V>::parse_id(&row.bucket_id) {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable purge candidate");
                    continue;
                }
            };
            if !self.try_lock(bucket_id) {
                tracing::trace!(bucket_id, "bucket busy, not purged this pass");
                self.stats.skipped_busy += 1;
                continue;
            }
            batch.push(bucket_id);
            if batch.len() == batch_size {
                self.submit(jobs, std::mem::replace(&mut batch, Vec::with_capacity(batch_size)));
            }
            // Keep the number of held locks bounded.
            while let Ok(outcome) = done.try_recv() {
                self.complete(outcome);
            }
        }
        if !batch.is_empty() {
            self.submit(jobs, batch);
        }
        Ok(())
    }

    fn submit(&mut self, jobs: &Sender<Vec<BucketId>>, batch: Vec<BucketId>) {
        match jobs.send(batch) {
            Ok(()) => self.in_flight += 1,
            Err(returned) => self.abandon(returned.into_inner()),
        }
    }

    fn abandon(&mut self, batch: Vec<BucketId>) {
        for bucket_id in batch {
            self.unlock(bucket_id);
        }
    }

    fn complete(&mut self, outcome: BatchOutcome) {
        self.in_flight = self.in_flight.saturating_sub(1);
        for &bucket_id in &outcome.release {
            self.unlock(bucket_id);
        }
        self.stats.purged_entries += outcome.purged_entries;
        self.stats.updated_buckets += outcome.updated_buckets;
        if let Some(err) = outcome.error {
            self.stats.failed_batches += 1;
            tracing::error!(error = %err, "purge batch failed");
        }
        self.pending_empty.extend(outcome.empty);
        self.flush_empty(self.store.config.purge_batch_size.max(1));
    }

    /// Wait for every scheduled batch.
    fn drain(&mut self, done: &Receiver<BatchOutcome>) {
        while self.in_flight > 0 {
            match done.recv() {
                Ok(outcome) => self.complete(outcome),
                Err(_) => break,
            }
        }
    }

    /// Delete queued empty rows once more than `threshold` are waiting.
    fn flush_empty(&mut self, threshold: usize) {
        if self.pending_empty.is_empty() || self.pending_empty.len() <= threshold {
            return;
        }
        let empty = std::mem::take(&mut self.pending_empty);
        let ids: Vec<String> = empty.iter().map(|id| id.to_string()).collect();
        match self.store.medium.delete_rows(&ids) {
            Ok(deleted) => self.stats.deleted_buckets += deleted,
            Err(err) => {
                tracing::error!(error = %err, buckets = ids.len(), "failed to delete empty buckets")
            }
        }
        for bucket_id in empty {
            self.unlock(bucket_id);
        }
    }

    fn release_all(&mut self) {
        if !self.held.is_empty() {
            tracing::warn!(stripes = self.held.len(), "releasing purge locks left held");
        }
        self.held.clear();
    }
}

enum ScanOutcome {
    Bucket { visited: usize },
    Corrupt { bucket_id: String, reason: String },
}

fn scan_worker<K: GridKey, V: GridValue>(
    rows: Receiver<Row>,
    done: Sender<ScanOutcome>,
    now: i64,
    filter: KeyFilter<'_, K>,
    visitor: EntryVisitor<'_, K, V>,
    ctx: &ScanContext,
) {
    for row in rows {
        if ctx.is_stopped() {
            continue;
        }
        let outcome = match Bucket::<K, V>::from_row(&row) {
            Ok(bucket) => {
                let mut visited = 0;
                for entry in bucket.live_entries(now) {
                    if ctx.is_stopped() {
                        break;
                    }
                    if filter(&entry.key) {
                        visitor(entry, ctx);
                        visited += 1;
                    }
                }
                ScanOutcome::Bucket { visited }
            }
            Err(err) => ScanOutcome::Corrupt {
                bucket_id: row.bucket_id.clone(),
                reason: err.to_string(),
            },
        };
        if done.send(outcome).is_err() {
            break;
        }
    }
}
