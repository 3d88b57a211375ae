//! Read-only HTTP query API
//!
//! Serves the materialized view to frontends. It never writes; every handler
//! reads through [`Store`], so a response reflects either the state before or
//! after a processed version, never a partial one.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ApiConfig;
use crate::db::Store;
use crate::error::AppError;
use crate::{features, middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Checkpoint row reported by `/status`.
    pub indexer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub indexer_name: String,
    /// `None` until the first transaction has been processed.
    pub next_version: Option<i64>,
}

/// Create the application router with all routes and middleware
pub fn router(state: AppState, config: &ApiConfig) -> Router {
    let feature_routes = features::router(state.store.clone());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .with_state(state)
        .merge(feature_routes)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(config))
}

/// Bind `config.host:port` and serve until `shutdown` is cancelled.
pub async fn serve(
    state: AppState,
    config: &ApiConfig,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);

    axum::serve(listener, router(state, config))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API shut down gracefully");
    Ok(())
}

async fn root() -> &'static str {
    "Healthy!"
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Result<Response, StatusCode> {
    match state.store.health_check().await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let next_version = state.store.next_version(&state.indexer_name).await?;
    Ok(Json(StatusResponse {
        indexer_name: state.indexer_name,
        next_version,
    }))
}
