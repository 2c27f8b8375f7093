//! Error types for the grid core.
//!
//! Each subsystem owns an error enum that follows the same taxonomy:
//! - not-applicable-locally is never an error (commands return `None`)
//! - user mutation failures propagate unchanged as [`CommandError::Function`]
//! - backing medium failures are wrapped into a single [`StoreError`] kind
//! - integrity violations (unexpected affected-row counts) are hard failures
//! - interruption aborts only the current unit of work
//!
//! [`GridError`] wraps all of them for callers that drive several subsystems.

use thiserror::Error;

/// Failure raised by a user-supplied mutation function.
///
/// The engine never inspects or swallows these; they reach the caller as-is.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct FunctionError(#[from] Box<dyn std::error::Error + Send + Sync>);

impl FunctionError {
    /// Create a function error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

/// Errors raised while performing or marshalling commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The user mutation function failed.
    #[error("mutation function failed: {0}")]
    Function(#[from] FunctionError),

    /// A marshalled command references a function that is not registered on this node.
    #[error("mutation function '{id}' is not registered")]
    UnknownFunction { id: String },

    /// The parameter encoding version is not understood by this node.
    #[error("unsupported command parameter version {found} (supported: {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    /// The envelope carries a different command kind than the one being decoded.
    #[error("command kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Parameters could not be encoded or decoded.
    #[error("command parameter codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Errors reported by a backing medium.
#[derive(Debug, Error)]
pub enum MediumError {
    /// I/O failure talking to the medium.
    #[error("I/O failure: {0}")]
    Io(std::io::Error),

    /// The blocking call was interrupted.
    #[error("operation interrupted")]
    Interrupted,

    /// The medium is not reachable.
    #[error("medium unavailable: {message}")]
    Unavailable { message: String },

    /// One stored row could not be decoded. Other rows are unaffected.
    #[error("undecodable row for bucket {bucket_id}: {reason}")]
    CorruptRow { bucket_id: String, reason: String },
}

impl From<std::io::Error> for MediumError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::Interrupted {
            Self::Interrupted
        } else {
            Self::Io(err)
        }
    }
}

/// Store-level errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A backing medium operation failed.
    #[error("{operation} failed on backing medium: {source}")]
    Medium {
        operation: &'static str,
        #[source]
        source: MediumError,
    },

    /// An insert/update touched an unexpected number of rows.
    #[error(
        "unexpected {operation} result for bucket {bucket_id}: {actual} rows affected, expected {expected}"
    )]
    Integrity {
        operation: &'static str,
        bucket_id: String,
        expected: usize,
        actual: usize,
    },

    /// The current unit of work was interrupted.
    #[error("store operation interrupted")]
    Interrupted,

    /// A bucket payload could not be encoded or decoded.
    #[error("bucket {bucket_id} codec failure: {source}")]
    Codec {
        bucket_id: String,
        #[source]
        source: bincode::Error,
    },

    /// A stored row is malformed.
    #[error("corrupt row for bucket {bucket_id}: {reason}")]
    CorruptRow { bucket_id: String, reason: String },

    /// A parallel store task failed.
    #[error("parallel store task failed: {message}")]
    Task { message: String },

    /// A scan finished but some buckets could not be read.
    #[error("scan failed on {} bucket(s): {}", .failures.len(), .failures.join("; "))]
    Scan { failures: Vec<String> },
}

impl StoreError {
    /// Wrap a medium error, surfacing interruption as its own kind.
    pub fn medium(operation: &'static str, source: MediumError) -> Self {
        match source {
            MediumError::Interrupted => Self::Interrupted,
            MediumError::CorruptRow { bucket_id, reason } => {
                Self::CorruptRow { bucket_id, reason }
            }
            source => Self::Medium { operation, source },
        }
    }

    /// Check if the caller may retry the operation.
    ///
    /// The store itself never retries.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Interrupted
                | Self::Medium {
                    source: MediumError::Io(_) | MediumError::Unavailable { .. },
                    ..
                }
        )
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Remote invocation errors.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// A target node replied with a failure.
    #[error("remote invocation on {target} failed: {message}")]
    Remote { target: String, message: String },

    /// Replies did not arrive in time.
    #[error("remote invocation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The transport could not send the command.
    #[error("transport unavailable: {message}")]
    Transport { message: String },

    /// The task driving the invocation was cancelled.
    #[error("remote invocation aborted")]
    Aborted,
}

/// L1 invalidation errors, reported through the aggregated future.
#[derive(Debug, Error)]
pub enum InvalidationError {
    /// The remote invalidation call failed.
    #[error("L1 invalidation failed: {0}")]
    Remote(#[from] RpcError),

    /// The invalidation command could not be marshalled.
    #[error("failed to marshal invalidation command: {0}")]
    Marshal(#[from] CommandError),

    /// The originating operation never signalled completion.
    #[error("originating operation was dropped before completing")]
    OperationAbandoned,
}

/// Umbrella error for the grid core.
#[derive(Debug, Error)]
pub enum GridError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Invalidation(#[from] InvalidationError),
}

impl From<FunctionError> for GridError {
    fn from(err: FunctionError) -> Self {
        Self::Command(CommandError::Function(err))
    }
}

/// Result type using GridError.
pub type GridResult<T> = Result<T, GridError>;
