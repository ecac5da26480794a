use crate::config::Config;
use crate::engine::spawn_engine;
use crate::routes::{self, AppState};
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use facesift_net::{FolderLister, HttpFetcher};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(routes::index))
        .route("/status", get(routes::status))
        .route("/process", post(routes::process))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load models, start the engine thread and serve until SIGTERM or Ctrl+C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let matcher = config.load_matcher()?;
    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs), &config.user_agent)?;
    let engine = spawn_engine(matcher, fetcher)?;
    let lister = FolderLister::new(Duration::from_secs(config.listing_timeout_secs), config.listing_limit)?;

    tracing::info!(
        backend = %engine.backend(),
        fetch_timeout_secs = config.fetch_timeout_secs,
        listing_limit = config.listing_limit,
        max_upload_bytes = config.max_upload_bytes,
        "engine ready"
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState { config: Arc::new(config), engine, lister: Arc::new(lister) };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "facesiftd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facesiftd shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
