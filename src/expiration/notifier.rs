//! Entry event notifications.

use crate::container::Metadata;
use std::fmt::Debug;

/// Receiver of entry lifecycle events.
///
/// Implementations must be cheap and must not call back into the container
/// for the same key; they may run under a container segment lock.
pub trait CacheNotifier<K, V>: Send + Sync {
    /// An entry expired and was removed.
    fn entry_expired(&self, key: &K, value: Option<&V>, metadata: Option<&Metadata>);

    /// An entry is being (`pre`) or has been invalidated.
    fn entry_invalidated(
        &self,
        key: &K,
        value: Option<&V>,
        metadata: Option<&Metadata>,
        pre: bool,
    );
}

/// Notifier that records events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl<K: Debug, V: Debug> CacheNotifier<K, V> for LoggingNotifier {
    fn entry_expired(&self, key: &K, value: Option<&V>, _metadata: Option<&Metadata>) {
        tracing::debug!(key = ?key, value = ?value, "entry expired");
    }

    fn entry_invalidated(
        &self,
        key: &K,
        _value: Option<&V>,
        _metadata: Option<&Metadata>,
        pre: bool,
    ) {
        if !pre {
            tracing::debug!(key = ?key, "entry invalidated");
        }
    }
}
