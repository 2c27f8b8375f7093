//! Aggregated completion of a write and its L1 invalidation.

use super::rpc::Responders;
use crate::core::error::{InvalidationError, RpcError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Signals that the originating operation finished.
///
/// Dropping it without calling [`complete`](Self::complete) makes the paired
/// future resolve to [`InvalidationError::OperationAbandoned`].
#[derive(Debug)]
pub struct OperationCompletion {
    tx: oneshot::Sender<()>,
}

impl OperationCompletion {
    pub fn complete(self) {
        let _ = self.tx.send(());
    }
}

pub(crate) enum RemoteCall {
    /// Nothing had to be sent.
    Skipped,
    /// Running on a tokio runtime.
    Spawned(JoinHandle<Result<Responders, RpcError>>),
    /// Dispatch itself failed.
    Failed(InvalidationError),
}

/// Resolves to the operation's return value once both the operation and the
/// remote invalidation have completed.
///
/// Dropping it does not cancel the remote call; only the outcome is lost.
#[must_use = "an invalidation future reports whether remote copies were dropped"]
pub struct InvalidationFuture<R> {
    retval: R,
    remote: RemoteCall,
    operation: oneshot::Receiver<()>,
}

impl<R> InvalidationFuture<R> {
    pub(crate) fn new(retval: R, remote: RemoteCall) -> (Self, OperationCompletion) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                retval,
                remote,
                operation: rx,
            },
            OperationCompletion { tx },
        )
    }

    /// A future with nothing to invalidate.
    pub(crate) fn skipped(retval: R) -> (Self, OperationCompletion) {
        Self::new(retval, RemoteCall::Skipped)
    }

    /// Whether a remote call was dispatched at all.
    pub fn dispatched(&self) -> bool {
        !matches!(self.remote, RemoteCall::Skipped)
    }

    /// Wait for both sources.
    ///
    /// A failed invalidation is reported here; it never rolls back the write.
    pub async fn wait(self) -> Result<R, InvalidationError> {
        let Self {
            retval,
            remote,
            operation,
        } = self;

        let remote = async move {
            match remote {
                RemoteCall::Skipped => Ok(()),
                RemoteCall::Spawned(handle) => match handle.await {
                    Ok(result) => result.map(drop).map_err(InvalidationError::from),
                    Err(_) => Err(InvalidationError::Remote(RpcError::Aborted)),
                },
                RemoteCall::Failed(err) => Err(err),
            }
        };
        let operation = async move {
            operation
                .await
                .map_err(|_| InvalidationError::OperationAbandoned)
        };

        let (remote, operation) = futures::join!(remote, operation);
        remote?;
        operation?;
        Ok(retval)
    }
}
