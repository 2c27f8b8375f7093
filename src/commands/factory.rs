//! Command construction.

use super::flags::CommandFlags;
use super::functions::{ReadWriteFn, ReadWriteValueFn, WriteOnlyFn};
use super::invalidate::InvalidateCommand;
use super::many::{ReadWriteManyCommand, WriteOnlyManyCommand};
use super::read_write::{ReadWriteKeyCommand, ReadWriteKeyValueCommand};
use super::value_matcher::ValueMatcher;
use crate::distribution::rpc::Address;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one logical operation, stable across redeliveries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandInvocationId {
    pub address: Address,
    pub id: u64,
}

impl fmt::Display for CommandInvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.id)
    }
}

/// Builds the invalidation command sent to L1 holders.
pub trait InvalidationCommandFactory<K, V>: Send + Sync {
    fn build_invalidate_from_l1(&self, keys: Vec<K>) -> InvalidateCommand<K, V>;
}

/// Creates commands stamped with fresh invocation ids for this node.
pub struct CommandsFactory {
    local: Address,
    sequence: AtomicU64,
}

impl CommandsFactory {
    pub fn new(local: Address) -> Self {
        Self {
            local,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn local_address(&self) -> &Address {
        &self.local
    }

    /// Allocate the next invocation id.
    pub fn next_invocation_id(&self) -> CommandInvocationId {
        CommandInvocationId {
            address: self.local.clone(),
            id: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    pub fn build_read_write_key<K, V, R>(
        &self,
        key: K,
        function: ReadWriteFn<K, V, R>,
        flags: CommandFlags,
    ) -> ReadWriteKeyCommand<K, V, R>
    where
        K: Clone + Debug,
        V: Clone + PartialEq,
    {
        ReadWriteKeyCommand::new(
            key,
            function,
            ValueMatcher::Always,
            flags,
            self.next_invocation_id(),
        )
    }

    pub fn build_read_write_key_value<K, V, R>(
        &self,
        key: K,
        value: V,
        function: ReadWriteValueFn<K, V, R>,
        flags: CommandFlags,
    ) -> ReadWriteKeyValueCommand<K, V, R>
    where
        K: Clone + Debug,
        V: Clone + PartialEq,
    {
        ReadWriteKeyValueCommand::new(
            key,
            value,
            function,
            ValueMatcher::Always,
            flags,
            self.next_invocation_id(),
        )
    }

    pub fn build_read_write_many<K, V, R>(
        &self,
        keys: Vec<K>,
        function: ReadWriteFn<K, V, R>,
        flags: CommandFlags,
    ) -> ReadWriteManyCommand<K, V, R>
    where
        K: Clone + Debug,
        V: Clone,
    {
        ReadWriteManyCommand::new(keys, function, flags, self.next_invocation_id())
    }

    pub fn build_write_only_many<K, V>(
        &self,
        keys: Vec<K>,
        function: WriteOnlyFn<K, V>,
        flags: CommandFlags,
    ) -> WriteOnlyManyCommand<K, V>
    where
        K: Clone,
        V: Clone,
    {
        WriteOnlyManyCommand::new(keys, function, flags, self.next_invocation_id())
    }
}

impl<K: Clone, V: Clone> InvalidationCommandFactory<K, V> for CommandsFactory {
    fn build_invalidate_from_l1(&self, keys: Vec<K>) -> InvalidateCommand<K, V> {
        InvalidateCommand::new(keys, self.next_invocation_id())
    }
}
