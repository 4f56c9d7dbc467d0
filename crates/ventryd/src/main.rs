//! # ventryd
//!
//! Ventry gateway server binary — parses flags, initializes logging, and
//! serves the realtime gateway until interrupted.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use ventry_gateway::config::GatewayConfig;
use ventry_gateway::server::GatewayServer;

/// Ventry realtime gateway.
#[derive(Parser, Debug)]
#[command(name = "ventryd", about = "Ventry realtime gateway server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8765")]
    port: u16,

    /// Heartbeat probe interval in seconds.
    #[arg(long, default_value = "30")]
    heartbeat_interval_secs: u64,

    /// Maximum inbound frame size in bytes.
    #[arg(long, default_value = "104857600")]
    max_frame_bytes: usize,
}

impl Cli {
    fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            host: self.host,
            port: self.port,
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            max_frame_bytes: self.max_frame_bytes,
            ..GatewayConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let server = GatewayServer::new(args.into_config());
    let (addr, handle) = server.listen().await.context("failed to start gateway")?;

    tracing::info!("ventryd listening on http://{addr} (WebSocket endpoint at /ws)");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server.shutdown().drain(vec![handle], None).await;
    tracing::info!("shutdown complete");
    Ok(())
}
