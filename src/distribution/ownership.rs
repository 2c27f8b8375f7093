//! Key ownership.
//!
//! Commands skip keys this node does not own. Placement is decided outside
//! the core; the write path only asks whether a key is local.

/// Decides which keys this node owns.
pub trait KeyOwnership<K>: Send + Sync {
    fn is_local(&self, key: &K) -> bool;
}

/// Every key is local: a single node or a fully replicated cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllKeysLocal;

impl<K> KeyOwnership<K> for AllKeysLocal {
    fn is_local(&self, _key: &K) -> bool {
        true
    }
}

impl<K, F> KeyOwnership<K> for F
where
    F: Fn(&K) -> bool + Send + Sync,
{
    fn is_local(&self, key: &K) -> bool {
        self(key)
    }
}
