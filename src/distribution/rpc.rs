//! Remote invocation seam.
//!
//! The grid core never talks to a transport directly. Anything that can
//! deliver a [`CommandEnvelope`] to other members implements [`RpcManager`].

use crate::commands::marshal::CommandEnvelope;
use crate::core::error::RpcError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster member address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Members that acknowledged a remote invocation.
pub type Responders = Vec<Address>;

/// Pending remote invocation.
pub type RpcFuture = BoxFuture<'static, Result<Responders, RpcError>>;

/// Delivery of commands to other members.
pub trait RpcManager: Send + Sync {
    /// Address of the local member.
    fn local_address(&self) -> &Address;

    /// Send `command` to exactly `targets`.
    fn invoke_remotely(&self, targets: Vec<Address>, command: CommandEnvelope) -> RpcFuture;

    /// Send `command` to every member.
    fn broadcast(&self, command: CommandEnvelope) -> RpcFuture;

    /// Whether the transport supports a single multicast send.
    fn is_multicast_capable(&self) -> bool;
}
