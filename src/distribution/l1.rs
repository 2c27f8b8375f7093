//! L1 invalidation coordinator.
//!
//! Peers that read a key remotely may keep a near-cache (L1) copy. The owner
//! remembers who asked and, when the key is written, tells those peers to
//! drop their copy. The registry is best-effort: a missing key only means no
//! requestor is known.

use super::dispatch::Dispatcher;
use super::future::{InvalidationFuture, OperationCompletion, RemoteCall};
use super::rpc::{Address, RpcManager};
use crate::commands::factory::InvalidationCommandFactory;
use crate::container::{GridKey, GridValue};
use crate::core::error::RpcError;
use crate::core::striped::StripedMap;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// How an invalidation reaches its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One message per target address.
    Unicast,
    /// One broadcast to the whole cluster.
    Multicast,
}

/// Choose the delivery mode for `requestors` distinct targets.
///
/// `-1` always unicasts, `0` always multicasts, a positive threshold
/// multicasts only above the threshold and only on a multicast transport.
pub fn delivery_mode(threshold: i32, requestors: usize, multicast_capable: bool) -> DeliveryMode {
    match threshold {
        -1 => DeliveryMode::Unicast,
        // Capability is not consulted here; the transport delivers the broadcast.
        0 => DeliveryMode::Multicast,
        t if multicast_capable && requestors > t.max(0) as usize => DeliveryMode::Multicast,
        _ => DeliveryMode::Unicast,
    }
}

/// Per-key record of peers holding an L1 copy.
pub struct RequestorRegistry<K> {
    requestors: StripedMap<K, HashSet<Address>>,
}

impl<K: GridKey> RequestorRegistry<K> {
    pub fn new(segments: usize) -> Self {
        Self {
            requestors: StripedMap::new(segments),
        }
    }

    pub fn add(&self, key: &K, address: Address) {
        self.requestors.with_segment(key, |map| {
            map.entry(key.clone()).or_default().insert(address);
        });
    }

    /// Current requestors of `key`, sorted.
    pub fn requestors_of(&self, key: &K) -> Vec<Address> {
        let mut addresses: Vec<_> = self
            .requestors
            .with_segment(key, |map| map.get(key).map(|s| s.iter().cloned().collect()))
            .unwrap_or_default();
        addresses.sort();
        addresses
    }

    /// Remove `keys` and return the union of their requestors minus `origin`.
    pub fn drain(&self, keys: &[K], origin: Option<&Address>) -> BTreeSet<Address> {
        let mut targets = BTreeSet::new();
        for key in keys {
            if let Some(addresses) = self.requestors.with_segment(key, |map| map.remove(key)) {
                targets.extend(addresses);
            }
        }
        if let Some(origin) = origin {
            targets.remove(origin);
        }
        targets
    }

    /// Number of keys with known requestors.
    pub fn len(&self) -> usize {
        self.requestors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requestors.is_empty()
    }
}

/// Tracks L1 requestors and issues invalidations on write.
pub struct L1Manager<K, V> {
    rpc: Arc<dyn RpcManager>,
    commands: Arc<dyn InvalidationCommandFactory<K, V>>,
    threshold: i32,
    registry: RequestorRegistry<K>,
    dispatcher: Dispatcher,
}

impl<K: GridKey, V: GridValue> L1Manager<K, V> {
    pub fn new(
        rpc: Arc<dyn RpcManager>,
        commands: Arc<dyn InvalidationCommandFactory<K, V>>,
        threshold: i32,
        segments: usize,
    ) -> Self {
        Self {
            rpc,
            commands,
            threshold,
            registry: RequestorRegistry::new(segments),
            dispatcher: Dispatcher::default(),
        }
    }

    /// Record that `address` now holds an L1 copy of `key`.
    pub fn add_requestor(&self, key: &K, address: Address) {
        tracing::trace!(key = ?key, requestor = %address, "registered L1 requestor");
        self.registry.add(key, address);
    }

    pub fn registry(&self) -> &RequestorRegistry<K> {
        &self.registry
    }

    /// Invalidate remote L1 copies of `keys`.
    ///
    /// Registry entries are cleared before anything is sent, whether or not
    /// the remote call later succeeds. The remote call is spawned before this
    /// returns, so it is sent even if the returned future is dropped. That
    /// future resolves to `retval` once both the call and the paired
    /// [`OperationCompletion`] have completed.
    pub fn invalidate<R>(
        &self,
        keys: &[K],
        retval: R,
        origin: Option<&Address>,
    ) -> (InvalidationFuture<R>, OperationCompletion) {
        let targets = self.registry.drain(keys, origin);
        if targets.is_empty() {
            tracing::trace!(keys = keys.len(), "no L1 requestors to invalidate");
            return InvalidationFuture::skipped(retval);
        }

        let mode = delivery_mode(self.threshold, targets.len(), self.rpc.is_multicast_capable());
        let envelope = match self
            .commands
            .build_invalidate_from_l1(keys.to_vec())
            .to_envelope()
        {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(error = %err, "failed to build L1 invalidation");
                return InvalidationFuture::new(retval, RemoteCall::Failed(err.into()));
            }
        };

        tracing::debug!(
            keys = keys.len(),
            targets = targets.len(),
            mode = ?mode,
            "invalidating L1 copies"
        );
        let call = match mode {
            DeliveryMode::Multicast => self.rpc.broadcast(envelope),
            DeliveryMode::Unicast => self.rpc.invoke_remotely(targets.into_iter().collect(), envelope),
        };
        let remote = match self.dispatcher.spawn(call) {
            Ok(handle) => RemoteCall::Spawned(handle),
            Err(err) => {
                tracing::warn!(error = %err, "failed to dispatch L1 invalidation");
                RemoteCall::Failed(
                    RpcError::Transport {
                        message: format!("no runtime to send invalidation: {err}"),
                    }
                    .into(),
                )
            }
        };
        InvalidationFuture::new(retval, remote)
    }
}
