//! Pneumonia Inference Server
//!
//! Loads a model bundle once at startup and serves predictions over HTTP.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pneumonia_cnn::backend::{backend_name, default_device, DefaultBackend};
use pneumonia_cnn::Predictor;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "pneumonia-server")]
#[command(about = "HTTP inference server for the pneumonia classifier")]
struct Cli {
    /// Model bundle produced by training
    #[arg(short, long, env = "PNEUMONIA_MODEL", default_value = "output/pneumonia_model.tar.gz")]
    model: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "PNEUMONIA_PORT", default_value = "5000")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "PNEUMONIA_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "info,pneumonia_server=debug,tower_http=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Loading model from {:?} ({} backend)", cli.model, backend_name());
    let predictor = Predictor::<DefaultBackend>::from_bundle(&cli.model, default_device())
        .with_context(|| format!("failed to load model bundle {:?}", cli.model))?;
    info!("Model ready, input size {}px", predictor.image_size());

    let state = Arc::new(AppState::new(cli.model.clone(), predictor));
    let app = routes::router(state.clone());

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cli.host, cli.port))?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        "Server stopped after {}s, releasing model",
        state.uptime_seconds()
    );
    drop(state);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
