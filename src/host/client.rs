//! Host RPC Client
//!
//! Issues calls to a worker over a connected duplex stream. Any number of
//! calls may be outstanding at once; responses are paired with their
//! callers by call id, in whatever order the worker finishes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bridge_protocol::{
    CallId, CodecError, FrameCodec, IntoArgs, Message, Outcome, Reply, Request, Response, TargetHandle,
    Transport, DEFAULT_MAX_FRAME_LEN,
};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::RpcError;
use super::pending::PendingCalls;

/// RPC client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Largest frame accepted or produced, in bytes.
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

type BoxedWriter = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, FrameCodec>;

/// Host-side RPC client.
pub struct RpcClient {
    pending: Arc<PendingCalls>,
    writer: Mutex<BoxedWriter>,
    next_id: AtomicU64,
    /// Cancelled when the client closes; stops the read loop.
    closing: CancellationToken,
}

impl RpcClient {
    /// Start a client over `stream` with the default configuration.
    ///
    /// Must be called from within a tokio runtime: the read loop is spawned
    /// immediately.
    pub fn new<S: Transport>(stream: S) -> Self {
        Self::with_config(stream, ClientConfig::default())
    }

    pub fn with_config<S: Transport>(stream: S, config: ClientConfig) -> Self {
        let codec = FrameCodec::with_max_frame_len(config.max_frame_len);
        let (read_half, write_half) = tokio::io::split(stream);
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write_half);

        let pending = Arc::new(PendingCalls::new());
        let closing = CancellationToken::new();
        tokio::spawn(read_loop(
            FramedRead::new(read_half, codec),
            Arc::clone(&pending),
            closing.clone(),
        ));

        Self {
            pending,
            writer: Mutex::new(FramedWrite::new(writer, codec)),
            next_id: AtomicU64::new(1),
            closing,
        }
    }

    /// Call a method whose result is ignored. Accepts void and value replies.
    pub async fn invoke<A: IntoArgs>(
        &self,
        target: TargetHandle,
        method: &str,
        args: A,
        cancel: &CancellationToken,
    ) -> Result<(), RpcError> {
        self.invoke_raw(target, method, args, cancel).await.map(drop)
    }

    /// Call a method that must return a non-null value.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        target: TargetHandle,
        method: &str,
        args: impl IntoArgs,
        cancel: &CancellationToken,
    ) -> Result<T, RpcError> {
        match self.invoke_raw(target, method, args, cancel).await? {
            Reply::Void => Err(RpcError::MissingValue("void")),
            Reply::Value(Value::Null) => Err(RpcError::MissingValue("null")),
            Reply::Value(value) => serde_json::from_value(value).map_err(RpcError::Decode),
        }
    }

    /// Call a method that may return null.
    pub async fn invoke_nullable<T: DeserializeOwned>(
        &self,
        target: TargetHandle,
        method: &str,
        args: impl IntoArgs,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, RpcError> {
        match self.invoke_raw(target, method, args, cancel).await? {
            Reply::Void => Err(RpcError::MissingValue("void")),
            Reply::Value(Value::Null) => Ok(None),
            Reply::Value(value) => serde_json::from_value(value).map(Some).map_err(RpcError::Decode),
        }
    }

    /// Call a method and return its reply as sent.
    ///
    /// `cancel` is only honored until the request is written. Once sent, the
    /// call runs to completion on the worker and this waits for its response.
    pub async fn invoke_raw<A: IntoArgs>(
        &self,
        target: TargetHandle,
        method: &str,
        args: A,
        cancel: &CancellationToken,
    ) -> Result<Reply, RpcError> {
        if cancel.is_cancelled() {
            return Err(RpcError::Cancelled);
        }

        let args = args.into_args().map_err(RpcError::Encode)?;
        let id = CallId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let call = self.pending.register(id)?;

        {
            let mut writer = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.pending.cancel(id);
                    return call.wait().await;
                }
                writer = self.writer.lock() => writer,
            };

            debug!(call_id = %id, target = %target, method, "sending call");
            let sent = writer
                .send(Message::Request(Request::new(id, target, method, args)))
                .await;
            match sent {
                Ok(()) => {}
                Err(err @ CodecError::FrameTooLarge { .. }) => return Err(err.into()),
                Err(err) => {
                    // Transport loss fails every pending call, this one included.
                    warn!(call_id = %id, error = %err, "failed to write request");
                    self.pending.drain(&format!("failed to write request: {}", err));
                }
            }
        }

        call.wait().await
    }

    /// Number of calls sent or being sent and not yet answered.
    pub fn outstanding_requests(&self) -> usize {
        self.pending.len()
    }

    /// Whether the connection has ended. Calls fail immediately once closed.
    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    /// Close the connection. Pending calls fail with `ConnectionClosed`.
    pub async fn close(&self) -> Result<(), RpcError> {
        let drained = self.pending.drain("client closed");
        self.closing.cancel();
        info!(drained, "closing client");
        self.writer.lock().await.close().await?;
        Ok(())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.closing.cancel();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

async fn read_loop<R>(
    mut reader: FramedRead<R, FrameCodec>,
    pending: Arc<PendingCalls>,
    closing: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        let frame = tokio::select! {
            _ = closing.cancelled() => break "client closed".to_string(),
            frame = reader.next() => frame,
        };

        match frame {
            None => break "peer closed the connection".to_string(),
            Some(Err(err)) => {
                warn!(error = %err, "failed to read frame");
                break format!("failed to read frame: {}", err);
            }
            Some(Ok(Message::Request(request))) => {
                warn!(call_id = %request.id, "unexpected request frame from worker");
                break format!("worker sent a request frame (call {})", request.id);
            }
            Some(Ok(Message::Response(Response { id, outcome }))) => {
                debug!(call_id = %id, success = outcome.is_success(), "received response");
                let result = match outcome {
                    Outcome::Success(reply) => Ok(reply),
                    Outcome::Failure(failure) => Err(RpcError::from(failure)),
                };
                pending.complete(id, result);
            }
        }
    };

    let drained = pending.drain(&reason);
    info!(reason = %reason, drained, "read loop stopped");
    closing.cancel();
}
