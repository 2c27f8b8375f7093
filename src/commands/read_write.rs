//! Single-key read-write commands.
//!
//! Both commands follow the same protocol against the working entry:
//!
//! 1. A `Never` matcher fails the command without touching anything.
//! 2. A key that is not wrapped locally yields `None`.
//! 3. On the first non-retry application the previous value and metadata
//!    are pinned. They are never retaken for the same command.
//! 4. If the matcher accepts the live value against the pinned one, or the
//!    entry has been removed since the snapshot, the function runs against
//!    the pinned state; otherwise it runs against the live state.
//! 5. A returned view is replaced by an immutable snapshot.

use super::context::EntryLookup;
use super::entry_view::{launder, CommandResult, ReadWriteEntryView};
use super::factory::CommandInvocationId;
use super::flags::CommandFlags;
use super::functions::{ReadWriteFn, ReadWriteValueFn};
use super::value_matcher::ValueMatcher;
use crate::container::{Metadata, MvccEntry};
use crate::core::error::CommandError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Previous state pinned by a command on its first application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedPrevious<V> {
    pub value: Option<V>,
    pub metadata: Option<Metadata>,
    pub captured: bool,
}

impl<V> Default for PinnedPrevious<V> {
    fn default() -> Self {
        Self {
            value: None,
            metadata: None,
            captured: false,
        }
    }
}

impl<V: Clone + PartialEq> PinnedPrevious<V> {
    fn capture_once<K>(&mut self, entry: &MvccEntry<K, V>, flags: CommandFlags) {
        if self.captured || flags.is_retry() {
            return;
        }
        self.value = entry.value().cloned();
        self.metadata = Some(*entry.metadata());
        self.captured = true;
    }

    /// Value and metadata the function should see.
    fn base<K>(&self, matcher: ValueMatcher, entry: &MvccEntry<K, V>) -> (Option<V>, Metadata) {
        let live = entry.value();
        let value_removed = live.is_none() && self.value.is_some();
        if matcher.matches(live, self.value.as_ref()) || value_removed {
            (
                self.value.clone(),
                self.metadata.unwrap_or(*entry.metadata()),
            )
        } else {
            (live.cloned(), *entry.metadata())
        }
    }

    /// Pin (if needed) and build the view over `entry`.
    fn view<'e, K: Clone + Debug>(
        &mut self,
        matcher: ValueMatcher,
        flags: CommandFlags,
        entry: &'e mut MvccEntry<K, V>,
    ) -> ReadWriteEntryView<'e, K, V> {
        self.capture_once(entry, flags);
        let (value, metadata) = self.base(matcher, entry);
        ReadWriteEntryView::new(entry, value, metadata)
    }
}

/// Applies a function of the entry view to one key.
#[derive(Debug, Clone)]
pub struct ReadWriteKeyCommand<K, V, R> {
    pub(crate) key: K,
    pub(crate) function: ReadWriteFn<K, V, R>,
    pub(crate) value_matcher: ValueMatcher,
    pub(crate) flags: CommandFlags,
    pub(crate) invocation_id: CommandInvocationId,
    pub(crate) previous: PinnedPrevious<V>,
    pub(crate) successful: bool,
}

impl<K, V, R> ReadWriteKeyCommand<K, V, R>
where
    K: Clone + Debug,
    V: Clone + PartialEq,
{
    pub fn new(
        key: K,
        function: ReadWriteFn<K, V, R>,
        value_matcher: ValueMatcher,
        flags: CommandFlags,
        invocation_id: CommandInvocationId,
    ) -> Self {
        Self {
            key,
            function,
            value_matcher,
            flags,
            invocation_id,
            previous: PinnedPrevious::default(),
            successful: true,
        }
    }

    pub fn perform<L: EntryLookup<K, V>>(
        &mut self,
        ctx: &mut L,
    ) -> Result<Option<CommandResult<K, V, R>>, CommandError> {
        if self.value_matcher == ValueMatcher::Never {
            self.successful = false;
            return Ok(None);
        }
        let Some(entry) = ctx.lookup_entry(&self.key) else {
            return Ok(None);
        };
        let returned = {
            let mut view = self.previous.view(self.value_matcher, self.flags, entry);
            self.function.function().apply(&mut view)?
        };
        Ok(Some(launder(entry, returned)))
    }
}

/// Applies a function of a supplied value and the entry view to one key.
#[derive(Debug, Clone)]
pub struct ReadWriteKeyValueCommand<K, V, R> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) function: ReadWriteValueFn<K, V, R>,
    pub(crate) value_matcher: ValueMatcher,
    pub(crate) flags: CommandFlags,
    pub(crate) invocation_id: CommandInvocationId,
    pub(crate) previous: PinnedPrevious<V>,
    pub(crate) successful: bool,
}

impl<K, V, R> ReadWriteKeyValueCommand<K, V, R>
where
    K: Clone + Debug,
    V: Clone + PartialEq,
{
    pub fn new(
        key: K,
        value: V,
        function: ReadWriteValueFn<K, V, R>,
        value_matcher: ValueMatcher,
        flags: CommandFlags,
        invocation_id: CommandInvocationId,
    ) -> Self {
        Self {
            key,
            value,
            function,
            value_matcher,
            flags,
            invocation_id,
            previous: PinnedPrevious::default(),
            successful: true,
        }
    }

    pub fn perform<L: EntryLookup<K, V>>(
        &mut self,
        ctx: &mut L,
    ) -> Result<Option<CommandResult<K, V, R>>, CommandError> {
        if self.value_matcher == ValueMatcher::Never {
            self.successful = false;
            return Ok(None);
        }
        let Some(entry) = ctx.lookup_entry(&self.key) else {
            return Ok(None);
        };
        let returned = {
            let mut view = self.previous.view(self.value_matcher, self.flags, entry);
            self.function.function().apply(&self.value, &mut view)?
        };
        Ok(Some(launder(entry, returned)))
    }

    /// Pinned previous value, once captured.
    pub fn previous_value(&self) -> Option<&V> {
        self.previous.value.as_ref()
    }

    pub fn previous_metadata(&self) -> Option<&Metadata> {
        self.previous.metadata.as_ref()
    }
}

macro_rules! single_key_accessors {
    ($command:ident) => {
        impl<K, V, R> $command<K, V, R> {
            pub fn key(&self) -> &K {
                &self.key
            }

            pub fn value_matcher(&self) -> ValueMatcher {
                self.value_matcher
            }

            pub fn set_value_matcher(&mut self, matcher: ValueMatcher) {
                self.value_matcher = matcher;
            }

            pub fn with_value_matcher(mut self, matcher: ValueMatcher) -> Self {
                self.value_matcher = matcher;
                self
            }

            pub fn flags(&self) -> CommandFlags {
                self.flags
            }

            pub fn invocation_id(&self) -> &CommandInvocationId {
                &self.invocation_id
            }

            /// False once a `Never` matcher has rejected the command.
            pub fn is_successful(&self) -> bool {
                self.successful
            }

            /// Prepare the command for redelivery.
            pub fn mark_retry(&mut self) {
                self.flags.insert(CommandFlags::COMMAND_RETRY);
                self.value_matcher = self.value_matcher.matcher_for_retry();
            }

            pub fn is_previous_captured(&self) -> bool {
                self.previous.captured
            }
        }

        impl<K, V, R> PartialEq for $command<K, V, R> {
            fn eq(&self, other: &Self) -> bool {
                self.invocation_id == other.invocation_id
            }
        }
    };
}

single_key_accessors!(ReadWriteKeyCommand);
single_key_accessors!(ReadWriteKeyValueCommand);
