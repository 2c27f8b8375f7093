//! Multi-key commands.
//!
//! Keys that are not wrapped locally are skipped. Each local key is handled
//! eagerly, in key order, during `perform`.

use super::context::EntryLookup;
use super::entry_view::{launder, CommandResult, ReadWriteEntryView, WriteEntryView};
use super::factory::CommandInvocationId;
use super::flags::CommandFlags;
use super::functions::{ReadWriteFn, WriteOnlyFn};
use crate::core::error::CommandError;
use std::fmt::Debug;

/// Per-key results of a batch, consumable exactly once.
pub type ManyResults<K, V, R> = std::vec::IntoIter<(K, CommandResult<K, V, R>)>;

/// Applies a view function to every local key of a batch.
#[derive(Debug, Clone)]
pub struct ReadWriteManyCommand<K, V, R> {
    pub(crate) keys: Vec<K>,
    pub(crate) function: ReadWriteFn<K, V, R>,
    pub(crate) flags: CommandFlags,
    pub(crate) invocation_id: CommandInvocationId,
}

impl<K, V, R> ReadWriteManyCommand<K, V, R>
where
    K: Clone + Debug,
    V: Clone,
{
    pub fn new(
        keys: Vec<K>,
        function: ReadWriteFn<K, V, R>,
        flags: CommandFlags,
        invocation_id: CommandInvocationId,
    ) -> Self {
        Self {
            keys,
            function,
            flags,
            invocation_id,
        }
    }

    pub fn perform<L: EntryLookup<K, V>>(
        &mut self,
        ctx: &mut L,
    ) -> Result<ManyResults<K, V, R>, CommandError> {
        let mut results = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let Some(entry) = ctx.lookup_entry(key) else {
                continue;
            };
            let returned = {
                let value = entry.value().cloned();
                let metadata = *entry.metadata();
                let mut view = ReadWriteEntryView::new(entry, value, metadata);
                self.function.function().apply(&mut view)?
            };
            results.push((key.clone(), launder(entry, returned)));
        }
        Ok(results.into_iter())
    }
}

/// Applies a write-only consumer to every local key of a batch.
#[derive(Debug, Clone)]
pub struct WriteOnlyManyCommand<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) function: WriteOnlyFn<K, V>,
    pub(crate) flags: CommandFlags,
    pub(crate) invocation_id: CommandInvocationId,
}

impl<K, V> WriteOnlyManyCommand<K, V>
where
    K: Clone,
    V: Clone,
{
    pub fn new(
        keys: Vec<K>,
        function: WriteOnlyFn<K, V>,
        flags: CommandFlags,
        invocation_id: CommandInvocationId,
    ) -> Self {
        Self {
            keys,
            function,
            flags,
            invocation_id,
        }
    }

    /// Returns the keys the consumer was applied to.
    pub fn perform<L: EntryLookup<K, V>>(&mut self, ctx: &mut L) -> Result<Vec<K>, CommandError> {
        let mut applied = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let Some(entry) = ctx.lookup_entry(key) else {
                continue;
            };
            self.function
                .function()
                .accept(&mut WriteEntryView::new(entry))?;
            applied.push(key.clone());
        }
        Ok(applied)
    }
}

macro_rules! batch_accessors {
    ($command:ident < $($param:ident),+ >) => {
        impl<$($param),+> $command<$($param),+> {
            pub fn keys(&self) -> &[K] {
                &self.keys
            }

            pub fn flags(&self) -> CommandFlags {
                self.flags
            }

            pub fn invocation_id(&self) -> &CommandInvocationId {
                &self.invocation_id
            }

            pub fn mark_retry(&mut self) {
                self.flags.insert(CommandFlags::COMMAND_RETRY);
            }
        }

        impl<$($param),+> PartialEq for $command<$($param),+> {
            fn eq(&self, other: &Self) -> bool {
                self.invocation_id == other.invocation_id
            }
        }
    };
}

batch_accessors!(ReadWriteManyCommand<K, V, R>);
batch_accessors!(WriteOnlyManyCommand<K, V>);
