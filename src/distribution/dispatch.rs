//! Where remote invalidations run.

use super::rpc::{Responders, RpcFuture};
use crate::core::error::RpcError;
use parking_lot::Mutex;
use std::io;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Spawns remote calls so they are sent whether or not the caller awaits them.
///
/// Calls go to the caller's tokio runtime when there is one. Callers outside a
/// runtime share a single-worker runtime owned by the dispatcher, built on
/// first use.
#[derive(Default)]
pub(crate) struct Dispatcher {
    fallback: Mutex<Option<Runtime>>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        &self,
        call: RpcFuture,
    ) -> io::Result<JoinHandle<Result<Responders, RpcError>>> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(handle.spawn(call));
        }

        let mut fallback = self.fallback.lock();
        let runtime = match fallback.take() {
            Some(runtime) => runtime,
            None => {
                tracing::debug!("starting background runtime for L1 invalidations");
                Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("l1-invalidation")
                    .enable_all()
                    .build()?
            }
        };
        let handle = runtime.spawn(call);
        *fallback = Some(runtime);
        Ok(handle)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside an async context.
        if let Some(runtime) = self.fallback.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}
