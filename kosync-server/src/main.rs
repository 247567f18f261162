//! KOSync Server - KOReader progress synchronization
//!
//! Serves the sync protocol under `/sync`:
//! - GET /sync/users/auth - Check credentials
//! - PUT /sync/syncs/progress - Store progress
//! - GET /sync/syncs/progress/{document} - Fetch progress
//! - GET /sync/healthcheck - Liveness

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use kosync_server::{create_router_with_config, AppState, Config, Database, FilesystemLibrary};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("KOSync server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    let db = Database::from_config(&config)
        .await
        .context("failed to initialize storage")?;

    if !config.library_root.is_dir() {
        tracing::warn!(
            root = %config.library_root.display(),
            "Library root does not exist, resolution will find no documents"
        );
    }
    let library = Arc::new(FilesystemLibrary::new(
        config.library_root.clone(),
        db.documents.clone(),
    ));

    let state = AppState::new(&db, library);
    let app = create_router_with_config(state, &config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, persistent = db.is_persistent(), "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
