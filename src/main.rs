//! HTTP server entrypoint.
use anyhow::{Context, Result};
use clap::Parser;
use pdfqa::{api, config::Config, logging, processing::DocumentService};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "pdfqa", about = "Answer questions about uploaded PDF documents")]
struct Cli {
    /// Interface to bind (overrides `HOST`).
    #[arg(long)]
    host: Option<String>,
    /// Port to bind (overrides `PORT`).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let _log_guard = logging::init_tracing(&config.log_dir);

    let service = DocumentService::new(&config).context("failed to build document service")?;
    service
        .initialize()
        .await
        .context("failed to prepare storage directories")?;
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    let address = listener.local_addr().context("failed to read bound address")?;
    tracing::info!(%address, "Listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
