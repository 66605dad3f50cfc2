//! Shared fixtures for client/server integration tests.
//!
//! Provides:
//! - a sample target covering every reply shape and failure mode
//! - a harness running a real client and server over an in-memory duplex
//! - a raw framed peer for checking exactly what the client writes

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_protocol::{FrameCodec, Message, Request};
use bridge_rpc::{CancellationToken, RpcClient, TargetHandle};
use bridge_worker::{
    CallContext, RpcServer, ServerConfig, ServerError, ShutdownHandle, StopReason, Target,
};
use futures::StreamExt;
use tokio::io::DuplexStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

pub const SAMPLE: TargetHandle = TargetHandle(0);

const PIPE_CAPACITY: usize = 64 * 1024;

/// Named release points for methods that must finish in a chosen order.
#[derive(Default)]
pub struct Gates {
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl Gates {
    fn gate(&self, name: &str) -> Arc<Notify> {
        let mut gates = self.gates.lock().unwrap();
        Arc::clone(gates.entry(name.to_string()).or_default())
    }

    /// Let the call waiting on `name` (or the next one to arrive) finish.
    pub fn open(&self, name: &str) {
        self.gate(name).notify_one();
    }

    /// Wait until a `WaitFor(name)` call is running on the worker.
    pub async fn entered(&self, name: &str) {
        self.gate(&format!("entered:{}", name)).notified().await;
    }
}

/// The sample target registered at handle 0.
pub fn sample_target(gates: Arc<Gates>, shutdown: ShutdownHandle) -> Target {
    Target::new("sample")
        .sync_method("Add", |(a, b): (i32, i32)| Ok::<_, String>(a + b))
        .sync_method("Echo", |(s,): (String,)| Ok::<_, String>(s))
        .sync_method("TryHello", |(name,): (Option<String>,)| {
            Ok::<_, String>(name.map(|n| format!("Hello {}", n)))
        })
        .sync_method("Nothing", |(): ()| Ok::<_, String>(()))
        .sync_method("Null", |(): ()| Ok::<_, String>(None::<String>))
        .method("Fail", |(): ()| async move { Err::<(), _>("boom") })
        .sync_method("Panic", |(): ()| -> Result<(), String> { panic!("worker method panicked") })
        .method("WaitFor", move |(name,): (String,)| {
            let gate = gates.gate(&name);
            gates.gate(&format!("entered:{}", name)).notify_one();
            async move {
                gate.notified().await;
                Ok::<_, String>(name)
            }
        })
        .method("Hang", |(): ()| async move {
            std::future::pending::<()>().await;
            Ok::<_, String>(())
        })
        .method_with_context("IsCancelled", |(): (), ctx: CallContext| async move {
            Ok::<_, String>(ctx.cancellation().is_cancelled())
        })
        .sync_method("Shutdown", move |(): ()| {
            shutdown.shutdown();
            Ok::<_, String>(())
        })
}

/// A connected client and server.
pub struct Harness {
    pub client: RpcClient,
    pub shutdown: ShutdownHandle,
    pub gates: Arc<Gates>,
    pub server: JoinHandle<Result<StopReason, ServerError>>,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(ServerConfig::default())
    }

    pub fn start_with(config: ServerConfig) -> Self {
        let (host_end, worker_end) = tokio::io::duplex(PIPE_CAPACITY);

        let mut server = RpcServer::with_config(config);
        let shutdown = server.shutdown_handle();
        let gates = Arc::new(Gates::default());
        let handle = server.add_target(sample_target(Arc::clone(&gates), shutdown.clone()));
        assert_eq!(handle, SAMPLE);

        Self {
            client: RpcClient::new(host_end),
            shutdown,
            gates,
            server: tokio::spawn(server.run(worker_end)),
        }
    }

    /// Wait for the server task to finish.
    pub async fn stopped(self) -> Result<StopReason, ServerError> {
        tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// Short grace period so forced shutdown tests stay fast.
pub fn short_grace() -> ServerConfig {
    ServerConfig {
        shutdown_grace: Duration::from_millis(50),
        ..ServerConfig::default()
    }
}

pub type RawPeer = Framed<DuplexStream, FrameCodec>;

/// A client whose other end is a bare framed stream driven by the test.
pub fn raw_pair() -> (RpcClient, RawPeer) {
    raw_pair_with_capacity(PIPE_CAPACITY)
}

/// Like [`raw_pair`], with a pipe that fills after `capacity` unread bytes.
pub fn raw_pair_with_capacity(capacity: usize) -> (RpcClient, RawPeer) {
    let (host_end, peer_end) = tokio::io::duplex(capacity);
    (RpcClient::new(host_end), Framed::new(peer_end, FrameCodec::new()))
}

/// Read the next request the client wrote.
pub async fn next_request(peer: &mut RawPeer) -> Request {
    match tokio::time::timeout(Duration::from_secs(5), peer.next()).await {
        Ok(Some(Ok(Message::Request(request)))) => request,
        other => panic!("expected a request frame, got {:?}", other),
    }
}

/// A token that is never cancelled.
pub fn no_cancel() -> CancellationToken {
    CancellationToken::new()
}

/// Poll until `check` holds, failing after a second.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
