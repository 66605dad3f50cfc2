//! Host-Side Components
//!
//! The client that issues calls to a worker and pairs each response with
//! its waiting caller.

pub mod client;
pub mod error;
pub mod pending;

pub use client::{ClientConfig, RpcClient};
pub use error::RpcError;
pub use pending::{PendingCall, PendingCalls};
