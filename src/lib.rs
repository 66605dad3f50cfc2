//! Bridge RPC - out-of-process method calls over a duplex pipe
//!
//! A host process calls methods on objects living in a worker process it
//! spawned, over the worker's stdin/stdout or any other connected byte
//! stream. Calls are framed, correlated by id and may complete out of order.
//!
//! - [`host`]: the calling side ([`RpcClient`])
//! - [`bridge_protocol`]: wire types and the frame codec shared by both ends
//! - the `bridge-worker` crate: the serving side

pub mod host;

pub use bridge_protocol;
pub use bridge_protocol::{CallId, Failure, FailureKind, IntoArgs, Reply, StdioPair, TargetHandle, Transport};
pub use host::{ClientConfig, RpcClient, RpcError};
pub use tokio_util::sync::CancellationToken;
