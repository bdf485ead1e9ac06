//! ZENO telemetry sidecar.
//!
//! Streams host CPU/RAM/GPU metrics as JSON text frames over a WebSocket
//! at `/metrics`, one frame per sampling interval.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use zeno_common::init_tracing;
use zeno_sidecar::config::{EnvOverrides, SidecarConfig};
use zeno_sidecar::gpu::GpuResolver;
use zeno_sidecar::http::HttpServer;

/// How long to wait for in-flight work after the stop signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Local telemetry sidecar.
#[derive(Parser, Debug)]
#[command(name = "zeno-sidecar")]
#[command(about = "Stream host CPU/RAM/GPU metrics as JSON over WebSocket")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides ZENO_SIDECAR_HOST and the config file).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides ZENO_SIDECAR_PORT and the config file).
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SidecarConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SidecarConfig::default(),
    };
    let config = config.resolve(
        EnvOverrides::from_process_env(),
        args.host,
        args.port,
        args.log_level,
    )?;

    init_tracing(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ZENO sidecar");

    let resolver = Arc::new(GpuResolver::new(Duration::from_millis(
        config.sampling.gpu_tool_timeout_ms,
    )));

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let interval = Duration::from_millis(config.sampling.interval_ms);
    let server = HttpServer::new(resolver, interval);
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(listener, shutdown_rx).await {
            error!(error = %e, "HTTP server error");
        }
    });

    // Wait for a stop signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).unwrap();
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down");
        }
    }

    // Signal shutdown; streams and the accept loop both observe it.
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(SHUTDOWN_GRACE, server_task)
        .await
        .is_err()
    {
        warn!("Timed out waiting for the server to stop");
    }

    info!("Sidecar stopped");
    Ok(())
}
