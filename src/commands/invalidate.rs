//! Receiving side of L1 invalidation.

use super::context::EntryLookup;
use super::factory::CommandInvocationId;
use super::flags::CommandFlags;
use crate::expiration::notifier::CacheNotifier;
use std::fmt;
use std::sync::Arc;

/// Removes the given keys from the local container.
///
/// The notifier is not marshalled; the receiving node injects its own with
/// [`InvalidateCommand::init`] before performing.
pub struct InvalidateCommand<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) invocation_id: CommandInvocationId,
    pub(crate) flags: CommandFlags,
    notifier: Option<Arc<dyn CacheNotifier<K, V>>>,
}

impl<K: Clone, V: Clone> InvalidateCommand<K, V> {
    pub fn new(keys: Vec<K>, invocation_id: CommandInvocationId) -> Self {
        Self {
            keys,
            invocation_id,
            flags: CommandFlags::empty(),
            notifier: None,
        }
    }

    pub fn with_flags(mut self, flags: CommandFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Inject node-local collaborators.
    pub fn init(&mut self, notifier: Arc<dyn CacheNotifier<K, V>>) {
        self.notifier = Some(notifier);
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn invocation_id(&self) -> &CommandInvocationId {
        &self.invocation_id
    }

    pub fn flags(&self) -> CommandFlags {
        self.flags
    }

    /// Mark every wrapped key removed, returning the keys that were present.
    pub fn perform<L: EntryLookup<K, V>>(&mut self, ctx: &mut L) -> Vec<K> {
        let notify = !self.flags.contains(CommandFlags::SKIP_LISTENER_NOTIFICATION);
        let mut invalidated = Vec::new();
        for key in &self.keys {
            let Some(entry) = ctx.lookup_entry(key) else {
                continue;
            };
            let value = entry.value().cloned();
            if value.is_none() {
                continue;
            }
            let metadata = *entry.metadata();
            if let (true, Some(notifier)) = (notify, self.notifier.as_ref()) {
                notifier.entry_invalidated(key, value.as_ref(), Some(&metadata), true);
            }
            entry.remove();
            if let (true, Some(notifier)) = (notify, self.notifier.as_ref()) {
                notifier.entry_invalidated(key, value.as_ref(), Some(&metadata), false);
            }
            invalidated.push(key.clone());
        }
        invalidated
    }
}

impl<K: fmt::Debug, V> fmt::Debug for InvalidateCommand<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidateCommand")
            .field("keys", &self.keys)
            .field("invocation_id", &self.invocation_id)
            .field("flags", &self.flags)
            .finish()
    }
}

impl<K, V> PartialEq for InvalidateCommand<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.invocation_id == other.invocation_id
    }
}
