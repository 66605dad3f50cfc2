//! Built-in `diagnostics` target.
//!
//! Served by the worker binary at handle 0 so a host can check liveness and
//! ask the worker to stop without any application targets registered.

use std::convert::Infallible;

use crate::server::ShutdownHandle;
use crate::target::Target;

/// Name the diagnostics target is registered under.
pub const DIAGNOSTICS_TARGET: &str = "diagnostics";

/// Build the diagnostics target. `Shutdown` requests a graceful stop
/// through `shutdown`; its own response is still written.
pub fn target(shutdown: ShutdownHandle) -> Target {
    Target::new(DIAGNOSTICS_TARGET)
        .sync_method("Ping", |(): ()| Ok::<_, Infallible>("pong"))
        .sync_method("Echo", |(message,): (String,)| Ok::<_, Infallible>(message))
        .sync_method("ProcessId", |(): ()| Ok::<_, Infallible>(std::process::id()))
        .sync_method("GetEnvironmentVariable", |(name,): (String,)| {
            Ok::<_, Infallible>(std::env::var(name).ok())
        })
        .sync_method("Shutdown", move |(): ()| {
            shutdown.shutdown();
            Ok::<_, Infallible>(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{RpcServer, ServerState};
    use bridge_protocol::Reply;
    use serde_json::json;

    fn method<'a>(target: &'a Target, name: &str) -> &'a crate::target::Method {
        target
            .methods()
            .iter()
            .find(|m| m.name() == name)
            .expect("method registered")
    }

    #[tokio::test]
    async fn test_ping_and_echo() {
        let server = RpcServer::new();
        let target = target(server.shutdown_handle());

        let pong = method(&target, "Ping").invoke(vec![]).await.unwrap();
        assert_eq!(pong, Reply::Value(json!("pong")));

        let echo = method(&target, "Echo")
            .invoke(vec![json!("a\0b\r\nü")])
            .await
            .unwrap();
        assert_eq!(echo, Reply::Value(json!("a\0b\r\nü")));
    }

    #[tokio::test]
    async fn test_missing_environment_variable_is_null() {
        let server = RpcServer::new();
        let target = target(server.shutdown_handle());

        let reply = method(&target, "GetEnvironmentVariable")
            .invoke(vec![json!("BRIDGE_WORKER_TEST_UNSET_VARIABLE")])
            .await
            .unwrap();
        assert_eq!(reply, Reply::Value(serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_process_id_matches() {
        let server = RpcServer::new();
        let target = target(server.shutdown_handle());

        let reply = method(&target, "ProcessId").invoke(vec![]).await.unwrap();
        assert_eq!(reply, Reply::Value(json!(std::process::id())));
    }

    #[tokio::test]
    async fn test_shutdown_is_void_and_requests_stop() {
        let server = RpcServer::new();
        let handle = server.shutdown_handle();
        let target = target(handle.clone());

        let reply = method(&target, "Shutdown").invoke(vec![]).await.unwrap();
        assert_eq!(reply, Reply::Void);

        let (_near, far) = tokio::io::duplex(1024);
        server.run(far).await.expect("requested stop");
        assert_eq!(handle.state(), ServerState::Stopped);
    }
}
