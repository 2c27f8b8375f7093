//! Cluster distribution: remote invocation seam and L1 invalidation.
//!
//! - [`rpc`] - Addresses and the remote invoke capability
//! - [`l1`] - Requestor registry and invalidation coordinator
//! - [`future`] - Aggregated write-plus-invalidation future
//! - [`ownership`] - Which keys this node owns

mod dispatch;
pub mod future;
pub mod l1;
pub mod ownership;
pub mod rpc;

pub use future::{InvalidationFuture, OperationCompletion};
pub use l1::{delivery_mode, DeliveryMode, L1Manager, RequestorRegistry};
pub use ownership::{AllKeysLocal, KeyOwnership};
pub use rpc::{Address, Responders, RpcFuture, RpcManager};
