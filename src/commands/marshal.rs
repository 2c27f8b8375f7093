//! Command parameter marshalling.
//!
//! Parameters are encoded as named-field JSON inside a versioned envelope so
//! that fields can be added without breaking older readers. Functions travel
//! by registered id only, the previous-value snapshot travels with the
//! command, and local-only flags are stripped.

use super::factory::CommandInvocationId;
use super::flags::CommandFlags;
use super::functions::FunctionRegistry;
use super::invalidate::InvalidateCommand;
use super::many::{ReadWriteManyCommand, WriteOnlyManyCommand};
use super::read_write::{PinnedPrevious, ReadWriteKeyCommand, ReadWriteKeyValueCommand};
use super::value_matcher::ValueMatcher;
use crate::container::{GridKey, GridValue};
use crate::core::error::CommandError;
use serde::{Deserialize, Serialize};

/// Current parameter encoding version.
pub const PARAMS_VERSION: u16 = 1;

/// Command kinds that can cross the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    ReadWriteKey,
    ReadWriteKeyValue,
    ReadWriteMany,
    WriteOnlyMany,
    Invalidate,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadWriteKey => "read_write_key",
            Self::ReadWriteKeyValue => "read_write_key_value",
            Self::ReadWriteMany => "read_write_many",
            Self::WriteOnlyMany => "write_only_many",
            Self::Invalidate => "invalidate",
        }
    }
}

/// Wire form of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub kind: CommandKind,
    pub version: u16,
    pub params: serde_json::Value,
}

impl CommandEnvelope {
    fn encode<P: Serialize>(kind: CommandKind, params: &P) -> Result<Self, CommandError> {
        Ok(Self {
            kind,
            version: PARAMS_VERSION,
            params: serde_json::to_value(params)?,
        })
    }

    fn decode<P: serde::de::DeserializeOwned>(self, expected: CommandKind) -> Result<P, CommandError> {
        if self.kind != expected {
            return Err(CommandError::KindMismatch {
                expected: expected.as_str(),
                found: self.kind.as_str(),
            });
        }
        if self.version != PARAMS_VERSION {
            return Err(CommandError::UnsupportedVersion {
                found: self.version,
                supported: PARAMS_VERSION,
            });
        }
        Ok(serde_json::from_value(self.params)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CommandError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CommandError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Serialize, Deserialize)]
struct ReadWriteKeyParams<K, V> {
    key: K,
    function: String,
    value_matcher: ValueMatcher,
    flags: CommandFlags,
    invocation_id: CommandInvocationId,
    previous: PinnedPrevious<V>,
}

#[derive(Serialize, Deserialize)]
struct ReadWriteKeyValueParams<K, V> {
    key: K,
    value: V,
    function: String,
    value_matcher: ValueMatcher,
    flags: CommandFlags,
    invocation_id: CommandInvocationId,
    previous: PinnedPrevious<V>,
}

#[derive(Serialize, Deserialize)]
struct ManyParams<K> {
    keys: Vec<K>,
    function: String,
    flags: CommandFlags,
    invocation_id: CommandInvocationId,
}

#[derive(Serialize, Deserialize)]
struct InvalidateParams<K> {
    keys: Vec<K>,
    flags: CommandFlags,
    invocation_id: CommandInvocationId,
}

impl<K: GridKey, V: GridValue, R: 'static> ReadWriteKeyCommand<K, V, R> {
    pub fn to_envelope(&self) -> Result<CommandEnvelope, CommandError> {
        CommandEnvelope::encode(
            CommandKind::ReadWriteKey,
            &ReadWriteKeyParams {
                key: self.key.clone(),
                function: self.function.id().to_string(),
                value_matcher: self.value_matcher,
                flags: self.flags.remotable(),
                invocation_id: self.invocation_id.clone(),
                previous: self.previous.clone(),
            },
        )
    }

    pub fn from_envelope(
        envelope: CommandEnvelope,
        registry: &FunctionRegistry<K, V, R>,
    ) -> Result<Self, CommandError> {
        let p: ReadWriteKeyParams<K, V> = envelope.decode(CommandKind::ReadWriteKey)?;
        let mut command = Self::new(
            p.key,
            registry.read_write(&p.function)?,
            p.value_matcher,
            p.flags,
            p.invocation_id,
        );
        command.previous = p.previous;
        Ok(command)
    }
}

impl<K: GridKey, V: GridValue, R: 'static> ReadWriteKeyValueCommand<K, V, R> {
    pub fn to_envelope(&self) -> Result<CommandEnvelope, CommandError> {
        CommandEnvelope::encode(
            CommandKind::ReadWriteKeyValue,
            &ReadWriteKeyValueParams {
                key: self.key.clone(),
                value: self.value.clone(),
                function: self.function.id().to_string(),
                value_matcher: self.value_matcher,
                flags: self.flags.remotable(),
                invocation_id: self.invocation_id.clone(),
                previous: self.previous.clone(),
            },
        )
    }

    pub fn from_envelope(
        envelope: CommandEnvelope,
        registry: &FunctionRegistry<K, V, R>,
    ) -> Result<Self, CommandError> {
        let p: ReadWriteKeyValueParams<K, V> = envelope.decode(CommandKind::ReadWriteKeyValue)?;
        let mut command = Self::new(
            p.key,
            p.value,
            registry.read_write_value(&p.function)?,
            p.value_matcher,
            p.flags,
            p.invocation_id,
        );
        command.previous = p.previous;
        Ok(command)
    }
}

impl<K: GridKey, V: GridValue, R: 'static> ReadWriteManyCommand<K, V, R> {
    pub fn to_envelope(&self) -> Result<CommandEnvelope, CommandError> {
        CommandEnvelope::encode(
            CommandKind::ReadWriteMany,
            &ManyParams {
                keys: self.keys.clone(),
                function: self.function.id().to_string(),
                flags: self.flags.remotable(),
                invocation_id: self.invocation_id.clone(),
            },
        )
    }

    pub fn from_envelope(
        envelope: CommandEnvelope,
        registry: &FunctionRegistry<K, V, R>,
    ) -> Result<Self, CommandError> {
        let p: ManyParams<K> = envelope.decode(CommandKind::ReadWriteMany)?;
        Ok(Self::new(
            p.keys,
            registry.read_write(&p.function)?,
            p.flags,
            p.invocation_id,
        ))
    }
}

impl<K: GridKey, V: GridValue> WriteOnlyManyCommand<K, V> {
    pub fn to_envelope(&self) -> Result<CommandEnvelope, CommandError> {
        CommandEnvelope::encode(
            CommandKind::WriteOnlyMany,
            &ManyParams {
                keys: self.keys.clone(),
                function: self.function.id().to_string(),
                flags: self.flags.remotable(),
                invocation_id: self.invocation_id.clone(),
            },
        )
    }

    pub fn from_envelope<R: 'static>(
        envelope: CommandEnvelope,
        registry: &FunctionRegistry<K, V, R>,
    ) -> Result<Self, CommandError> {
        let p: ManyParams<K> = envelope.decode(CommandKind::WriteOnlyMany)?;
        Ok(Self::new(
            p.keys,
            registry.write_only(&p.function)?,
            p.flags,
            p.invocation_id,
        ))
    }
}

impl<K: GridKey, V: GridValue> InvalidateCommand<K, V> {
    pub fn to_envelope(&self) -> Result<CommandEnvelope, CommandError> {
        CommandEnvelope::encode(
            CommandKind::Invalidate,
            &InvalidateParams {
                keys: self.keys.clone(),
                flags: self.flags.remotable(),
                invocation_id: self.invocation_id.clone(),
            },
        )
    }

    pub fn from_envelope(envelope: CommandEnvelope) -> Result<Self, CommandError> {
        let p: InvalidateParams<K> = envelope.decode(CommandKind::Invalidate)?;
        let mut command = Self::new(p.keys, p.invocation_id);
        command.flags = p.flags;
        Ok(command)
    }
}
