//! Functional write commands.
//!
//! - [`value_matcher`] - Pinned-versus-live decision policy
//! - [`entry_view`] - Views handed to mutation functions and laundered results
//! - [`functions`] - Mutation function traits and the function registry
//! - [`context`] - Entry lookup for one invocation
//! - [`read_write`] - Single-key read-write commands
//! - [`many`] - Multi-key commands
//! - [`invalidate`] - L1 invalidation, receiving side
//! - [`marshal`] - Versioned wire envelope
//! - [`factory`] - Invocation ids and command construction
//! - [`flags`] - Per-command flags

pub mod context;
pub mod entry_view;
pub mod factory;
pub mod flags;
pub mod functions;
pub mod invalidate;
pub mod many;
pub mod marshal;
pub mod read_write;
pub mod value_matcher;

pub use context::{EntryLookup, InvocationContext};
pub use entry_view::{
    CommandResult, EntryViewSnapshot, ReadWriteEntryView, Returned, WriteEntryView,
};
pub use factory::{CommandInvocationId, CommandsFactory, InvalidationCommandFactory};
pub use flags::CommandFlags;
pub use functions::{FunctionRef, FunctionRegistry, ReadWriteFn, ReadWriteValueFn, WriteOnlyFn};
pub use invalidate::InvalidateCommand;
pub use many::{ManyResults, ReadWriteManyCommand, WriteOnlyManyCommand};
pub use marshal::{CommandEnvelope, CommandKind, PARAMS_VERSION};
pub use read_write::{ReadWriteKeyCommand, ReadWriteKeyValueCommand};
pub use value_matcher::ValueMatcher;

use crate::container::{GridKey, GridValue};
use crate::core::error::CommandError;

/// Every command the core knows how to perform and marshal.
#[derive(Debug)]
pub enum Command<K, V, R> {
    ReadWriteKey(ReadWriteKeyCommand<K, V, R>),
    ReadWriteKeyValue(ReadWriteKeyValueCommand<K, V, R>),
    ReadWriteMany(ReadWriteManyCommand<K, V, R>),
    WriteOnlyMany(WriteOnlyManyCommand<K, V>),
    Invalidate(InvalidateCommand<K, V>),
}

/// Outcome of performing a command locally.
#[derive(Debug)]
pub enum CommandOutput<K, V, R> {
    /// Not applicable on this node, or rejected by its matcher.
    None,
    /// Single-key result.
    Single(CommandResult<K, V, R>),
    /// Per-key results of a read-write batch.
    Many(ManyResults<K, V, R>),
    /// Keys a write-only batch or an invalidation touched.
    Keys(Vec<K>),
}

impl<K, V, R> CommandOutput<K, V, R> {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn into_single(self) -> Option<CommandResult<K, V, R>> {
        match self {
            Self::Single(result) => Some(result),
            _ => None,
        }
    }
}

impl<K, V, R> Command<K, V, R>
where
    K: GridKey,
    V: GridValue,
    R: std::fmt::Debug + 'static,
{
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::ReadWriteKey(_) => CommandKind::ReadWriteKey,
            Self::ReadWriteKeyValue(_) => CommandKind::ReadWriteKeyValue,
            Self::ReadWriteMany(_) => CommandKind::ReadWriteMany,
            Self::WriteOnlyMany(_) => CommandKind::WriteOnlyMany,
            Self::Invalidate(_) => CommandKind::Invalidate,
        }
    }

    pub fn invocation_id(&self) -> &CommandInvocationId {
        match self {
            Self::ReadWriteKey(c) => c.invocation_id(),
            Self::ReadWriteKeyValue(c) => c.invocation_id(),
            Self::ReadWriteMany(c) => c.invocation_id(),
            Self::WriteOnlyMany(c) => c.invocation_id(),
            Self::Invalidate(c) => c.invocation_id(),
        }
    }

    pub fn flags(&self) -> CommandFlags {
        match self {
            Self::ReadWriteKey(c) => c.flags(),
            Self::ReadWriteKeyValue(c) => c.flags(),
            Self::ReadWriteMany(c) => c.flags(),
            Self::WriteOnlyMany(c) => c.flags(),
            Self::Invalidate(c) => c.flags(),
        }
    }

    /// Matcher of a single-key command.
    pub fn value_matcher(&self) -> Option<ValueMatcher> {
        match self {
            Self::ReadWriteKey(c) => Some(c.value_matcher()),
            Self::ReadWriteKeyValue(c) => Some(c.value_matcher()),
            _ => None,
        }
    }

    /// Attach node-local collaborators to a command received from a peer.
    pub fn init(&mut self, notifier: std::sync::Arc<dyn crate::expiration::CacheNotifier<K, V>>) {
        if let Self::Invalidate(c) = self {
            c.init(notifier);
        }
    }

    /// Keys the command may modify.
    pub fn affected_keys(&self) -> Vec<K> {
        match self {
            Self::ReadWriteKey(c) => vec![c.key().clone()],
            Self::ReadWriteKeyValue(c) => vec![c.key().clone()],
            Self::ReadWriteMany(c) => c.keys().to_vec(),
            Self::WriteOnlyMany(c) => c.keys().to_vec(),
            Self::Invalidate(c) => c.keys().to_vec(),
        }
    }

    /// Apply the command to the entries wrapped in `ctx`.
    pub fn perform<L: EntryLookup<K, V>>(
        &mut self,
        ctx: &mut L,
    ) -> Result<CommandOutput<K, V, R>, CommandError> {
        let output = match self {
            Self::ReadWriteKey(c) => c.perform(ctx)?.map(CommandOutput::Single),
            Self::ReadWriteKeyValue(c) => c.perform(ctx)?.map(CommandOutput::Single),
            Self::ReadWriteMany(c) => Some(CommandOutput::Many(c.perform(ctx)?)),
            Self::WriteOnlyMany(c) => Some(CommandOutput::Keys(c.perform(ctx)?)),
            Self::Invalidate(c) => Some(CommandOutput::Keys(c.perform(ctx))),
        };
        Ok(output.unwrap_or(CommandOutput::None))
    }

    /// Prepare for redelivery after a topology change.
    pub fn mark_retry(&mut self) {
        match self {
            Self::ReadWriteKey(c) => c.mark_retry(),
            Self::ReadWriteKeyValue(c) => c.mark_retry(),
            Self::ReadWriteMany(c) => c.mark_retry(),
            Self::WriteOnlyMany(c) => c.mark_retry(),
            Self::Invalidate(_) => {}
        }
    }

    pub fn to_envelope(&self) -> Result<CommandEnvelope, CommandError> {
        match self {
            Self::ReadWriteKey(c) => c.to_envelope(),
            Self::ReadWriteKeyValue(c) => c.to_envelope(),
            Self::ReadWriteMany(c) => c.to_envelope(),
            Self::WriteOnlyMany(c) => c.to_envelope(),
            Self::Invalidate(c) => c.to_envelope(),
        }
    }

    /// Rebuild a command received from another node.
    pub fn from_envelope(
        envelope: CommandEnvelope,
        registry: &FunctionRegistry<K, V, R>,
    ) -> Result<Self, CommandError> {
        Ok(match envelope.kind {
            CommandKind::ReadWriteKey => {
                Self::ReadWriteKey(ReadWriteKeyCommand::from_envelope(envelope, registry)?)
            }
            CommandKind::ReadWriteKeyValue => Self::ReadWriteKeyValue(
                ReadWriteKeyValueCommand::from_envelope(envelope, registry)?,
            ),
            CommandKind::ReadWriteMany => {
                Self::ReadWriteMany(ReadWriteManyCommand::from_envelope(envelope, registry)?)
            }
            CommandKind::WriteOnlyMany => {
                Self::WriteOnlyMany(WriteOnlyManyCommand::from_envelope(envelope, registry)?)
            }
            CommandKind::Invalidate => Self::Invalidate(InvalidateCommand::from_envelope(envelope)?),
        })
    }
}
