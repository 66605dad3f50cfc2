//! Bridge Worker
//!
//! Worker side of the bridge: a registry of targets built from closures and
//! an RPC server that dispatches framed calls from a host concurrently.
//!
//! This crate can be used in two modes:
//! - **Standalone binary**: spawned by a host, serving the diagnostics target
//!   over its own stdin/stdout
//! - **In-process library**: register application targets and run the server
//!   over any duplex stream

pub mod config;
pub mod diagnostics;
pub mod logging;
pub mod registry;
pub mod server;
pub mod target;

pub use config::{ConfigError, ServerConfig};
pub use registry::Registry;
pub use server::{RpcServer, ServerError, ServerState, ShutdownHandle, StopReason};
pub use target::{CallContext, IntoReply, Json, Method, Signature, Target};
