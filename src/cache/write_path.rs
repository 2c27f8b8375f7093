//! Cache write and read paths.
//!
//! A write runs the command against each local key inside the container's
//! atomic compute, then fans the committed changes out: L1 invalidation is
//! dispatched first, the stores are written through second, and the returned
//! future resolves once both the write and the invalidation have finished.
//!
//! Store I/O never runs inside the container compute. A key missing from
//! memory is loaded before the compute and writes through after it returns.
//! A purge holds bucket locks while it works, so no bucket lock may be waited
//! on from inside a compute that a purge listener could also need.

use crate::commands::{
    Command, CommandEnvelope, CommandFlags, CommandKind, CommandOutput, FunctionRegistry,
    InvocationContext, ValueMatcher,
};
use crate::container::{DataContainer, EntryRef, GridKey, GridValue, Metadata};
use crate::core::error::{GridError, GridResult, StoreError, StoreResult};
use crate::core::time::TimeService;
use crate::distribution::{Address, AllKeysLocal, InvalidationFuture, KeyOwnership, L1Manager};
use crate::expiration::{CacheNotifier, ExpirationManager};
use crate::persistence::{PersistenceManager, StoreLookup};
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

/// A committed change to one key.
#[derive(Debug, Clone)]
enum Change<K, V> {
    Written(EntryRef<K, V>),
    Removed(K),
}

impl<K, V> Change<K, V> {
    fn key(&self) -> &K {
        match self {
            Self::Written(entry) => &entry.key,
            Self::Removed(key) => key,
        }
    }
}

type KeyOutcome<K, V, R> = (CommandOutput<K, V, R>, Option<Change<K, V>>);

/// Ties the command engine to the container, the stores, expiration and L1.
pub struct WritePath<K, V> {
    container: Arc<dyn DataContainer<K, V>>,
    persistence: Arc<dyn PersistenceManager<K, V>>,
    expiration: Arc<ExpirationManager<K, V>>,
    notifier: Arc<dyn CacheNotifier<K, V>>,
    time: Arc<dyn TimeService>,
    l1: Option<Arc<L1Manager<K, V>>>,
    ownership: Arc<dyn KeyOwnership<K>>,
    default_metadata: Metadata,
}

impl<K: GridKey, V: GridValue> WritePath<K, V> {
    pub fn new(
        container: Arc<dyn DataContainer<K, V>>,
        persistence: Arc<dyn PersistenceManager<K, V>>,
        expiration: Arc<ExpirationManager<K, V>>,
        notifier: Arc<dyn CacheNotifier<K, V>>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            container,
            persistence,
            expiration,
            notifier,
            time,
            l1: None,
            ownership: Arc::new(AllKeysLocal),
            default_metadata: Metadata::immortal(),
        }
    }

    /// Invalidate remote L1 copies on write.
    pub fn with_l1(mut self, l1: Arc<L1Manager<K, V>>) -> Self {
        self.l1 = Some(l1);
        self
    }

    pub fn with_ownership(mut self, ownership: Arc<dyn KeyOwnership<K>>) -> Self {
        self.ownership = ownership;
        self
    }

    /// Limits applied to writes whose metadata sets none.
    pub fn with_default_metadata(mut self, metadata: Metadata) -> Self {
        self.default_metadata = metadata;
        self
    }

    pub fn container(&self) -> &Arc<dyn DataContainer<K, V>> {
        &self.container
    }

    pub fn expiration(&self) -> &Arc<ExpirationManager<K, V>> {
        &self.expiration
    }

    pub fn l1(&self) -> Option<&Arc<L1Manager<K, V>>> {
        self.l1.as_ref()
    }

    /// Perform `command` on this node.
    ///
    /// `origin` is the member the command came from, if any; it is never
    /// sent an invalidation for its own write. A failing mutation function
    /// stops the command; keys already committed are still invalidated and
    /// written through before the error is returned. A failed write-through
    /// leaves the in-memory state in place and is returned as a store error.
    pub fn execute<R: Debug + 'static>(
        &self,
        command: &mut Command<K, V, R>,
        origin: Option<&Address>,
    ) -> GridResult<InvalidationFuture<CommandOutput<K, V, R>>> {
        let flags = effective_flags(command);

        if command.value_matcher() == Some(ValueMatcher::Never) {
            // Known stale: rejected without touching the container.
            let output = command.perform(&mut InvocationContext::<K, V>::new())?;
            let (future, completion) = InvalidationFuture::skipped(output);
            completion.complete();
            return Ok(future);
        }

        let keys = distinct(command.affected_keys());
        let _leases: Vec<_> = keys
            .iter()
            .map(|key| self.expiration.lease_write(key))
            .collect();
        let load = command.kind() != CommandKind::Invalidate;
        let now = self.time.wall_clock_ms();

        let mut output = CommandOutput::None;
        let mut changes = Vec::new();
        let mut failure: Option<GridError> = None;
        for key in &keys {
            if !self.ownership.is_local(key) {
                tracing::trace!(key = ?key, "key not local, skipped");
                continue;
            }
            match self.apply_to_key(command, key, now, load) {
                Ok((out, change)) => {
                    merge_output(&mut output, out);
                    changes.extend(change);
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let changed_keys: Vec<K> = changes.iter().map(|c| c.key().clone()).collect();
        let (future, completion) = match &self.l1 {
            Some(l1)
                if !flags.contains(CommandFlags::SKIP_L1_INVALIDATION)
                    && !changed_keys.is_empty() =>
            {
                l1.invalidate(&changed_keys, output, origin)
            }
            _ => InvalidationFuture::skipped(output),
        };

        let stored = if flags.contains(CommandFlags::SKIP_CACHE_STORE) {
            Ok(())
        } else {
            self.write_through(&changes)
        };
        completion.complete();

        tracing::trace!(
            invocation = %command.invocation_id(),
            kind = command.kind().as_str(),
            changed = changes.len(),
            "command executed"
        );

        if let Some(err) = failure {
            return Err(err);
        }
        stored?;
        Ok(future)
    }

    /// Rebuild a command sent by `origin` and perform it here.
    pub fn handle_remote<R: Debug + 'static>(
        &self,
        envelope: CommandEnvelope,
        registry: &FunctionRegistry<K, V, R>,
        origin: &Address,
    ) -> GridResult<InvalidationFuture<CommandOutput<K, V, R>>> {
        let mut command = Command::from_envelope(envelope, registry)?;
        command.init(self.notifier.clone());
        self.execute(&mut command, Some(origin))
    }

    /// Live entry for `key`, loading it from the stores when not in memory.
    ///
    /// An entry the stores report as expired is expired on the spot.
    pub fn get(&self, key: &K) -> GridResult<Option<EntryRef<K, V>>> {
        let now = self.time.wall_clock_ms();
        if let Some(entry) = self.container.get(key, now) {
            return Ok(Some(entry));
        }
        if !self.persistence.is_enabled() {
            return Ok(None);
        }
        match self.persistence.load_entry(key)? {
            StoreLookup::Found(entry) => {
                let loaded = Arc::new(entry);
                // A writer that got there first wins.
                let cached = self.container.compute(key, &mut |_, current| match current {
                    Some(current) if !current.is_expired(now) => Some(current),
                    _ => Some(loaded.clone()),
                });
                Ok(cached)
            }
            StoreLookup::Expired(_) => {
                self.expiration.handle_in_store_expiration(key)?;
                Ok(None)
            }
            StoreLookup::Missing => Ok(None),
        }
    }

    /// Serve a read for another member, remembering it as an L1 requestor.
    pub fn get_for_remote(&self, key: &K, requestor: Address) -> GridResult<Option<EntryRef<K, V>>> {
        let entry = self.get(key)?;
        if let (Some(_), Some(l1)) = (&entry, &self.l1) {
            l1.add_requestor(key, requestor);
        }
        Ok(entry)
    }

    fn apply_to_key<R: Debug + 'static>(
        &self,
        command: &mut Command<K, V, R>,
        key: &K,
        now: i64,
        load: bool,
    ) -> GridResult<KeyOutcome<K, V, R>> {
        let preloaded = if load && self.container.peek(key).is_none() {
            self.load_from_store(key)?
        } else {
            None
        };
        let mut outcome: Option<GridResult<KeyOutcome<K, V, R>>> = None;

        self.container.compute(key, &mut |key, current| {
            let visible = match &current {
                Some(entry) if !entry.is_expired(now) => Some(entry.clone()),
                // Expired in memory: hidden here, reported by the reaper.
                Some(_) => None,
                // Absent at the peek: the store copy. Removed since the peek:
                // absent, since the removal may not have reached the stores.
                None => preloaded.clone(),
            };

            let mut ctx = InvocationContext::new();
            ctx.wrap(key.clone(), visible.clone());
            let output = match command.perform(&mut ctx) {
                Ok(output) => output,
                Err(err) => {
                    outcome = Some(Err(err.into()));
                    return current;
                }
            };

            let mut entry = match ctx.take(key) {
                Some(entry) if entry.is_changed() => entry,
                _ => {
                    outcome = Some(Ok((output, None)));
                    // Keeps an entry loaded from the stores resident.
                    return current.or(visible);
                }
            };

            let removed = entry.is_removed();
            if !removed && !entry.metadata().can_expire() && self.default_metadata.can_expire() {
                let metadata = Metadata {
                    lifespan: self.default_metadata.lifespan,
                    max_idle: self.default_metadata.max_idle,
                    ..*entry.metadata()
                };
                entry.set_metadata(metadata);
            }
            let next = entry.commit(now);
            let change = match &next {
                Some(written) => Some(Change::Written(written.clone())),
                None if current.is_none() && visible.is_none() => None,
                None => Some(Change::Removed(key.clone())),
            };
            outcome = Some(Ok((output, change)));
            next
        });

        outcome.unwrap_or(Ok((CommandOutput::None, None)))
    }

    /// Store copy of `key` for a write. An expired copy reads as absent; the
    /// write overwrites it or a later purge reports it.
    fn load_from_store(&self, key: &K) -> StoreResult<Option<EntryRef<K, V>>> {
        if !self.persistence.is_enabled() {
            return Ok(None);
        }
        Ok(match self.persistence.load_entry(key)? {
            StoreLookup::Found(entry) => Some(Arc::new(entry)),
            StoreLookup::Expired(_) | StoreLookup::Missing => None,
        })
    }

    fn write_through(&self, changes: &[Change<K, V>]) -> StoreResult<()> {
        if !self.persistence.is_enabled() {
            return Ok(());
        }
        let mut first_error: Option<StoreError> = None;
        for change in changes {
            let result = match change {
                Change::Written(entry) => self.persistence.write_to_all_stores(entry),
                Change::Removed(key) => self.persistence.delete_from_all_stores(key).map(drop),
            };
            if let Err(err) = result {
                tracing::warn!(key = ?change.key(), error = %err, "write-through failed, in-memory value kept");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Flags the write path acts on. Invalidations only drop near-cache copies
/// and never reach the stores or trigger further invalidation.
fn effective_flags<K, V, R>(command: &Command<K, V, R>) -> CommandFlags
where
    K: GridKey,
    V: GridValue,
    R: Debug + 'static,
{
    match command {
        Command::Invalidate(_) => {
            command.flags() | CommandFlags::SKIP_CACHE_STORE | CommandFlags::SKIP_L1_INVALIDATION
        }
        _ => command.flags(),
    }
}

fn distinct<K: GridKey>(keys: Vec<K>) -> Vec<K> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|key| seen.insert(key.clone())).collect()
}

fn merge_output<K, V, R>(acc: &mut CommandOutput<K, V, R>, next: CommandOutput<K, V, R>) {
    let merged = match (std::mem::replace(acc, CommandOutput::None), next) {
        (CommandOutput::None, next) => next,
        (prev, CommandOutput::None) => prev,
        (CommandOutput::Many(prev), CommandOutput::Many(next)) => {
            CommandOutput::Many(prev.chain(next).collect::<Vec<_>>().into_iter())
        }
        (CommandOutput::Keys(mut prev), CommandOutput::Keys(next)) => {
            prev.extend(next);
            CommandOutput::Keys(prev)
        }
        // Single-key commands produce one output.
        (_, next) => next,
    };
    *acc = merged;
}
