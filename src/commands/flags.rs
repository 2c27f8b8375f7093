//! Per-command flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Flags carried as an explicit field of every write command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CommandFlags: u32 {
        /// The command is being redelivered; its pinned snapshot must not be retaken.
        const COMMAND_RETRY = 1 << 0;
        /// Do not write the outcome through to the persistent stores.
        const SKIP_CACHE_STORE = 1 << 1;
        /// Do not fire listener notifications.
        const SKIP_LISTENER_NOTIFICATION = 1 << 2;
        /// Do not invalidate remote L1 copies for this write.
        const SKIP_L1_INVALIDATION = 1 << 3;
    }
}

impl CommandFlags {
    /// Flags that only mean something on the originating node.
    pub const LOCAL_ONLY: Self = Self::SKIP_L1_INVALIDATION;

    /// Flags that travel with a marshalled command.
    pub fn remotable(self) -> Self {
        self.difference(Self::LOCAL_ONLY)
    }

    pub fn is_retry(self) -> bool {
        self.contains(Self::COMMAND_RETRY)
    }
}
