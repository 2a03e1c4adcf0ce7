mod config;
mod error;
mod routes;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use config::Cli;
use docchat_core::{ChatCoordinator, FileStore};
use routes::{router, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let options = cli.rag_options();

    tokio::fs::create_dir_all(&cli.store_dir)
        .await
        .with_context(|| format!("creating store directory {}", cli.store_dir.display()))?;
    let store = Arc::new(FileStore::new(&cli.store_dir, options.max_upload_bytes));
    if let Some(document) = store.current().await? {
        info!(
            document_id = %document.document_id,
            file_name = %document.file_name,
            "adopted document left from a previous run"
        );
    }

    let providers = cli.providers()?;
    let coordinator = ChatCoordinator::new(store, providers, options)
        .context("invalid retrieval options")?;
    let app = router(AppState {
        coordinator: Arc::new(coordinator),
    });

    let listener = TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    info!(
        addr = %listener.local_addr()?,
        store_dir = %cli.store_dir.display(),
        chat_model = %cli.chat_model,
        embedder = ?cli.embedder,
        started_at = %Utc::now().to_rfc3339(),
        "docchat listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
