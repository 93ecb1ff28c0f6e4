use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ur_lut::env_config;
use ur_lut::server::create_router;
use ur_lut::storage::read_lut;

#[derive(Parser)]
#[command(name = "server")]
#[command(version, about = "Serve a solved Royal Game of Ur table over HTTP", long_about = None)]
struct Args {
    /// Table to serve
    table: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_config::init_logging()?;
    let args = Args::parse();
    env_config::init_base_path()?;
    let port = env_config::server_port();
    log::info!("Starting ur-lut API server...");

    let lut = read_lut(&args.table).with_context(|| format!("failed to load {}", args.table.display()))?;
    let app = create_router(Arc::new(lut));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    log::info!("Server is running on port {}. Press Ctrl+C to stop.", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Stopping server...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to install CTRL+C signal handler: {e}");
    }
}
