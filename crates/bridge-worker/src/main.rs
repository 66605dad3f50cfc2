//! Bridge Worker Entrypoint
//!
//! Usage: bridge-worker [--config <toml>] [--log-level <filter>] [--log-file <path>]
//!
//! Serves the diagnostics target over stdin/stdout until the host closes
//! the pipe or asks the worker to shut down.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_protocol::StdioPair;
use bridge_worker::{diagnostics, logging, RpcServer, ServerConfig, StopReason};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "bridge-worker")]
#[command(about = "Out-of-process RPC worker serving calls over stdio")]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `bridge_worker=trace` (defaults to RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Override the shutdown grace period in milliseconds
    #[arg(long)]
    shutdown_grace_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(args.log_level.as_deref(), args.log_file.as_deref()) {
        eprintln!("failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(reason) => {
            info!(reason = ?reason, "worker exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("worker failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<StopReason> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(ms) = args.shutdown_grace_ms {
        config.shutdown_grace = Duration::from_millis(ms);
    }

    let mut server = RpcServer::with_config(config);
    let shutdown = server.shutdown_handle();
    server.add_target(diagnostics::target(shutdown.clone()));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            shutdown.shutdown();
        }
    });

    info!(pid = std::process::id(), "worker started");
    Ok(server.run(StdioPair::stdio()).await?)
}
