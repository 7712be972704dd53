//! Modelgate binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modelgate::chat::ChatOrchestrator;
use modelgate::config::Config;
use modelgate::llm::{CredentialContext, ProviderFilter, merge_catalog};
use modelgate::server::{AppState, build_app};
use modelgate::{build_registry, env_snapshot};

/// Streaming chat gateway in front of interchangeable LLM backends
#[derive(Debug, Parser)]
#[command(name = "modelgate", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Path to the YAML config file
        #[arg(short, long, default_value = "modelgate.yaml")]
        config: PathBuf,

        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the static model catalog
    Models {
        /// Path to the YAML config file
        #[arg(short, long, default_value = "modelgate.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("modelgate=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Serve { config, host, port } => serve(config, host, port).await,
        Command::Models { config } => models(config).await,
    }
}

async fn serve(config_path: PathBuf, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let client = reqwest::Client::new();
    let registry = build_registry(&config.providers, &client);
    let server_env = env_snapshot();

    // Warm the catalog with server-side credentials. Fetch failures only log.
    let startup = CredentialContext::new(Arc::new(server_env.clone()));
    let catalog = registry
        .rebuild_catalog(&startup, &ProviderFilter::All)
        .await;
    info!(
        providers = registry.len(),
        models = catalog.len(),
        "Provider registry ready"
    );

    let orchestrator = ChatOrchestrator::new(registry, config.chat.clone());
    let state = AppState::new(orchestrator, server_env);
    let app = build_app(state, config.server.request_timeout_seconds);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn models(config_path: PathBuf) -> Result<()> {
    let config = Config::load(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;
    let registry = build_registry(&config.providers, &reqwest::Client::new());

    let statics = registry.static_models();
    for model in merge_catalog(Vec::new(), &statics) {
        println!(
            "{:<12} {:<32} {:>8}  {}",
            model.provider, model.name, model.max_token_allowed, model.label
        );
    }
    Ok(())
}

/// Wait for ctrl-c for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
