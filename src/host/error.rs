//! Host RPC errors.

use bridge_protocol::{CodecError, Failure, FailureKind};

/// Errors surfaced to callers of [`RpcClient`](super::RpcClient).
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The remote method ran and failed.
    #[error("remote invocation failed: {message}")]
    RemoteInvocation { message: String },

    /// The worker could not bind the call's arguments.
    #[error("remote rejected arguments: {message}")]
    InvalidArguments { message: String },

    /// The peer broke the protocol. Fatal to the connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport ended before the call was answered.
    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    /// The caller's token was cancelled before the request was written.
    #[error("call cancelled before it was sent")]
    Cancelled,

    #[error("failed to encode arguments: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode reply: {0}")]
    Decode(#[source] serde_json::Error),

    /// A typed call expected a value and got `null` or no value.
    #[error("remote method returned {0} where a value was expected")]
    MissingValue(&'static str),

    /// Writing the request failed.
    #[error("transport error: {0}")]
    Transport(#[from] CodecError),
}

impl RpcError {
    /// Whether the error ends the connection rather than a single call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Protocol(_) | RpcError::ConnectionClosed { .. } | RpcError::Transport(_)
        )
    }
}

impl From<Failure> for RpcError {
    fn from(failure: Failure) -> Self {
        match failure.kind {
            FailureKind::Application => RpcError::RemoteInvocation {
                message: failure.message,
            },
            FailureKind::InvalidArguments => RpcError::InvalidArguments {
                message: failure.message,
            },
            FailureKind::UnknownTarget | FailureKind::UnresolvedMethod => {
                RpcError::Protocol(failure.to_string())
            }
        }
    }
}
