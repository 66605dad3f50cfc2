//! Integration Tests: Failures
//!
//! - remote method errors and panics are per call
//! - unresolvable calls are answered, then end the connection
//! - protocol violations from the worker drain every pending call

mod fixtures;

use std::sync::Arc;

use bridge_protocol::{CallId, Message, Response};
use bridge_rpc::{FailureKind, Reply, RpcError, TargetHandle};
use bridge_worker::{ServerConfig, ServerError};
use fixtures::{eventually, next_request, no_cancel, raw_pair, Harness, SAMPLE};
use futures::SinkExt;
use serde_json::json;
use tokio::io::AsyncWriteExt;

// ============================================================================
// Per-call failures
// ============================================================================

#[tokio::test]
async fn test_remote_error_carries_message() {
    let h = Harness::start();
    let err = h.client.invoke(SAMPLE, "Fail", (), &no_cancel()).await.unwrap_err();

    assert!(matches!(err, RpcError::RemoteInvocation { .. }), "got {:?}", err);
    assert!(err.to_string().contains("boom"), "message lost: {}", err);
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_panicking_method_does_not_kill_the_server() {
    let h = Harness::start();

    let err = h.client.invoke(SAMPLE, "Panic", (), &no_cancel()).await.unwrap_err();
    match err {
        RpcError::RemoteInvocation { message } => {
            assert_eq!(message, "worker method panicked")
        }
        other => panic!("expected remote invocation error, got {:?}", other),
    }

    let sum: i32 = h.client.invoke_as(SAMPLE, "Add", (1, 1), &no_cancel()).await.unwrap();
    assert_eq!(sum, 2);
}

// ============================================================================
// Unresolvable calls
// ============================================================================

#[tokio::test]
async fn test_unknown_method_is_protocol_error_and_closes() {
    let h = Harness::start();

    let err = h.client.invoke(SAMPLE, "NoSuchMethod", (), &no_cancel()).await.unwrap_err();
    assert!(matches!(err, RpcError::Protocol(_)), "got {:?}", err);
    assert!(err.to_string().contains(FailureKind::UnresolvedMethod.as_str()));

    eventually(|| h.client.is_closed()).await;
    let after = h.client.invoke(SAMPLE, "Add", (1, 1), &no_cancel()).await.unwrap_err();
    assert!(matches!(after, RpcError::ConnectionClosed { .. }), "got {:?}", after);

    let result = h.stopped().await;
    assert!(matches!(result, Err(ServerError::Unresolved(_))), "got {:?}", result);
}

#[tokio::test]
async fn test_wrong_arity_is_unresolved() {
    let config = ServerConfig {
        close_on_protocol_error: false,
        ..ServerConfig::default()
    };
    let h = Harness::start_with(config);

    let err = h.client.invoke(SAMPLE, "Add", (1,), &no_cancel()).await.unwrap_err();
    assert!(err.to_string().contains("no method 'Add' taking 1 argument(s)"), "got {}", err);

    let sum: i32 = h.client.invoke_as(SAMPLE, "Add", (1, 1), &no_cancel()).await.unwrap();
    assert_eq!(sum, 2, "connection stays open when configured to");
}

#[tokio::test]
async fn test_unknown_target_is_protocol_error() {
    let h = Harness::start();
    let err = h
        .client
        .invoke(TargetHandle(42), "Add", (1, 1), &no_cancel())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("UNKNOWN_TARGET"), "got {}", err);
}

// ============================================================================
// Connection loss
// ============================================================================

#[tokio::test]
async fn test_call_to_dead_worker_is_connection_closed() {
    let (client, peer) = raw_pair();
    drop(peer);

    let err = client.invoke(SAMPLE, "Add", (1, 1), &no_cancel()).await.unwrap_err();
    assert!(
        matches!(err, RpcError::ConnectionClosed { .. }),
        "write to a closed pipe should close the connection, got {:?}",
        err
    );
    assert!(client.is_closed(), "client should be closed after a failed write");
    assert_eq!(client.outstanding_requests(), 0);

    let again = client.invoke(SAMPLE, "Add", (1, 1), &no_cancel()).await.unwrap_err();
    assert!(matches!(again, RpcError::ConnectionClosed { .. }), "got {:?}", again);
}

#[tokio::test]
async fn test_peer_close_fails_pending_calls() {
    let (client, mut peer) = raw_pair();
    let client = Arc::new(client);

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.invoke(SAMPLE, "Hang", (), &no_cancel()).await })
    };
    next_request(&mut peer).await;
    drop(peer);

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed { .. }), "got {:?}", err);
    assert!(err.to_string().starts_with("connection closed: "));
    assert_eq!(client.outstanding_requests(), 0);
    assert!(client.is_closed());
}

#[tokio::test]
async fn test_request_frame_from_worker_is_fatal() {
    let (client, mut peer) = raw_pair();
    let client = Arc::new(client);

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.invoke(SAMPLE, "Hang", (), &no_cancel()).await })
    };
    let request = next_request(&mut peer).await;
    peer.send(Message::Request(request)).await.unwrap();

    let err = call.await.unwrap().unwrap_err();
    match err {
        RpcError::ConnectionClosed { reason } => assert!(reason.contains("request frame")),
        other => panic!("expected connection closed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_frame_is_fatal() {
    let (client, peer) = raw_pair();
    let client = Arc::new(client);

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.invoke(SAMPLE, "Hang", (), &no_cancel()).await })
    };
    let mut peer = peer;
    next_request(&mut peer).await;

    // Valid length prefix, unknown tag.
    let mut raw = peer.into_inner();
    raw.write_all(&[0, 0, 0, 3, 0x7f, b'{', b'}']).await.unwrap();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_response_for_unknown_id_is_ignored() {
    let (client, mut peer) = raw_pair();
    let client = Arc::new(client);

    let call = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .invoke_as::<String>(SAMPLE, "Echo", ("x",), &no_cancel())
                .await
        })
    };
    let request = next_request(&mut peer).await;

    peer.send(Message::Response(Response::success(CallId(9_999), Reply::Void)))
        .await
        .unwrap();
    peer.send(Message::Response(Response::success(request.id, Reply::Value(json!("x")))))
        .await
        .unwrap();

    assert_eq!(call.await.unwrap().unwrap(), "x");
    assert!(!client.is_closed());
}
