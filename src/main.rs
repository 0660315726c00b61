use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use questlab::admission::AdmissionController;
use questlab::catalog::StaticCatalog;
use questlab::config::{GatewayConfig, RunnerConfig};
use questlab::gateway;
use questlab::orchestrator::KubectlOrchestrator;
use questlab::registry::MemoryRegistry;
use questlab::runner;
use questlab::sync::FsObjectStore;

#[derive(Parser)]
#[command(name = "questlab")]
#[command(version, about = "Ephemeral per-user coding sandboxes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve one sandbox pod: editor WebSocket plus reconciliation triggers
    Runner {
        /// Listen port (overrides QUESTLAB_RUNNER_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Serve the admission API that starts, ends, and deletes labs
    Gateway {
        /// Listen port (overrides QUESTLAB_GATEWAY_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Runner { port } => {
            let mut config = RunnerConfig::from_env();
            if let Some(port) = port {
                config.port = port;
            }
            let state = runner::build_state(&config).await?;
            serve(runner::router(state), config.port).await
        }
        Commands::Gateway { port } => {
            let mut config = GatewayConfig::from_env();
            if let Some(port) = port {
                config.port = port;
            }
            let controller = AdmissionController::new(
                Arc::new(MemoryRegistry::new()),
                Arc::new(KubectlOrchestrator),
                Arc::new(StaticCatalog::default()),
                Arc::new(FsObjectStore::new(&config.storage_root)),
                config.max_concurrent_labs,
                config.namespace.clone(),
            );
            let state = Arc::new(gateway::AppState::new(controller, &config));
            serve(gateway::router(state), config.port).await
        }
    }
}

async fn serve(app: axum::Router, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}
