//! Worker RPC Server
//!
//! Reads request frames from the transport, dispatches each call on its own
//! task and writes responses as they complete, in completion order.
//!
//! The server runs until the peer closes its end, a shutdown is requested
//! through a [`ShutdownHandle`], or the stream turns out to be corrupt. On
//! the way out it stops reading, gives in-flight calls up to
//! [`ServerConfig::shutdown_grace`] to finish, aborts the rest and closes
//! the transport exactly once.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use bridge_protocol::{
    CallId, CodecError, Failure, FrameCodec, Message, Request, Response, TargetHandle, Transport,
};
use futures::{SinkExt, StreamExt};
use tokio::io::WriteHalf;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::target::Target;

/// Lifecycle of a server. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    NotStarted,
    Running,
    ShuttingDown,
    Stopped,
}

/// Why a server stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested through a [`ShutdownHandle`].
    Requested,
    /// The peer closed the stream.
    PeerClosed,
}

/// Fatal server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Codec(#[from] CodecError),

    #[error("peer sent a response frame for call {0}")]
    UnexpectedResponse(CallId),

    #[error("unresolvable call: {0}")]
    Unresolved(Failure),
}

struct Control {
    state: watch::Sender<ServerState>,
    shutdown: CancellationToken,
    fatal: StdMutex<Option<ServerError>>,
}

impl Control {
    fn new() -> Self {
        let (state, _) = watch::channel(ServerState::NotStarted);
        Self {
            state,
            shutdown: CancellationToken::new(),
            fatal: StdMutex::new(None),
        }
    }

    fn set_state(&self, next: ServerState) {
        let previous = self.state.send_replace(next);
        debug!(from = ?previous, to = ?next, "server state changed");
    }

    fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Record a fatal error and begin shutdown. The first error wins.
    fn fail(&self, err: ServerError) {
        let mut slot = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
        drop(slot);
        self.shutdown.cancel();
    }

    fn take_fatal(&self) -> Option<ServerError> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Cloneable handle for requesting shutdown and observing server state.
#[derive(Clone)]
pub struct ShutdownHandle {
    control: Arc<Control>,
}

impl ShutdownHandle {
    /// Request a graceful shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.control.shutdown.is_cancelled() {
            info!("shutdown requested");
        }
        self.control.shutdown.cancel();
    }

    pub fn state(&self) -> ServerState {
        self.control.state()
    }

    /// Wait until the server has reached `state` or moved past it.
    pub async fn wait_for_state(&self, state: ServerState) {
        let mut rx = self.control.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|current| *current >= state).await;
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("state", &self.state())
            .finish()
    }
}

type SharedWriter<S> = Arc<Mutex<FramedWrite<WriteHalf<S>, FrameCodec>>>;

/// Worker-side RPC server.
pub struct RpcServer {
    registry: Registry,
    config: ServerConfig,
    control: Arc<Control>,
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            registry: Registry::new(),
            config,
            control: Arc::new(Control::new()),
        }
    }

    /// Register a target. Handles are assigned sequentially from 0.
    pub fn add_target(&mut self, target: Target) -> TargetHandle {
        self.registry.add(target)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn state(&self) -> ServerState {
        self.control.state()
    }

    /// Serve calls over `stream` until the connection ends.
    pub async fn run<S: Transport>(self, stream: S) -> Result<StopReason, ServerError> {
        let RpcServer {
            registry,
            config,
            control,
        } = self;

        let codec = FrameCodec::with_max_frame_len(config.max_frame_len);
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, codec);
        let writer: SharedWriter<S> = Arc::new(Mutex::new(FramedWrite::new(write_half, codec)));
        let registry = Arc::new(registry);
        let mut tasks = JoinSet::new();

        control.set_state(ServerState::Running);
        info!(targets = registry.len(), "server running");

        let result = loop {
            tokio::select! {
                biased;

                _ = control.shutdown.cancelled() => {
                    break match control.take_fatal() {
                        Some(err) => Err(err),
                        None => Ok(StopReason::Requested),
                    };
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                }

                frame = reader.next() => match frame {
                    None => {
                        info!("peer closed the stream");
                        break Ok(StopReason::PeerClosed);
                    }
                    Some(Err(err)) => {
                        error!(error = %err, "failed to read frame");
                        break Err(ServerError::Codec(err));
                    }
                    Some(Ok(Message::Response(response))) => {
                        error!(call_id = %response.id, "unexpected response frame");
                        break Err(ServerError::UnexpectedResponse(response.id));
                    }
                    Some(Ok(Message::Request(request))) => {
                        debug!(call_id = %request.id, target = %request.target, method = %request.method, "received call");
                        tasks.spawn(dispatch_one(
                            Arc::clone(&registry),
                            Arc::clone(&writer),
                            Arc::clone(&control),
                            request,
                            config.close_on_protocol_error,
                        ));
                    }
                },
            }
        };

        control.set_state(ServerState::ShuttingDown);
        control.shutdown.cancel();
        drop(reader);

        let drained = tokio::time::timeout(config.shutdown_grace, async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                in_flight = tasks.len(),
                grace_ms = config.shutdown_grace.as_millis() as u64,
                "aborting calls still running after shutdown grace"
            );
            tasks.shutdown().await;
        }

        if let Err(err) = writer.lock().await.close().await {
            debug!(error = %err, "error closing transport");
        }

        control.set_state(ServerState::Stopped);
        match &result {
            Ok(reason) => info!(reason = ?reason, "server stopped"),
            Err(err) => error!(error = %err, "server stopped with error"),
        }
        result
    }
}

async fn dispatch_one<S: Transport>(
    registry: Arc<Registry>,
    writer: SharedWriter<S>,
    control: Arc<Control>,
    request: Request,
    close_on_protocol_error: bool,
) {
    let id = request.id;
    let outcome = registry.dispatch(request).await;
    let fatal = outcome
        .protocol_failure()
        .filter(|_| close_on_protocol_error)
        .cloned();

    {
        let mut sink = writer.lock().await;
        match sink.send(Message::Response(Response { id, outcome })).await {
            Ok(()) => debug!(call_id = %id, "response written"),
            Err(CodecError::FrameTooLarge { len, max }) => {
                warn!(call_id = %id, len, max, "response exceeds frame limit");
                let failure = Failure::application(format!(
                    "response of {} bytes exceeds the {} byte frame limit",
                    len, max
                ));
                if let Err(err) = sink.send(Message::Response(Response::failure(id, failure))).await {
                    warn!(call_id = %id, error = %err, "failed to write response");
                }
            }
            Err(err) => warn!(call_id = %id, error = %err, "failed to write response"),
        }
    }

    if let Some(failure) = fatal {
        control.fail(ServerError::Unresolved(failure));
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            error!(error = %err, "call task panicked");
        } else {
            debug!(error = %err, "call task aborted");
        }
    }
}
