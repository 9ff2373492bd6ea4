//! HTTP server for the reflection service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | /health | Health check |
//! | POST | /reflections/upload | Ingest a recording |
//! | POST | /reflections/analyze | Analyze a reflection (idempotent) |
//! | GET | /reflections/list | Timeline page |
//! | POST | /reflections/query | Similarity search |
//! | POST | /voice/clone | Create or replace the voice clone |
//! | POST | /voice/synthesize | Speak a reflection or text |
//! | POST | /query/audio | Spoken question → spoken answer |
//! | GET | /storage/:bucket/*path | Stored audio |
//!
//! Everything except `/health` and `/storage` requires a bearer token.

mod auth;
mod handlers;
pub mod types;

pub use auth::AuthUser;
pub use handlers::AppState;
pub use types::{ApiError, ErrorResponse, HealthResponse};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Bind and serve until the process exits.
///
/// The analysis worker runs alongside the server for its whole lifetime.
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let worker = state.orchestrator.worker().spawn();

    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app).await;
    worker.abort();
    served?;
    Ok(())
}

/// Create the router with all routes configured.
///
/// Separated from `start_server` so tests can drive it in-process.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.orchestrator.limits().max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/reflections/upload", post(handlers::upload_reflection))
        .route("/reflections/analyze", post(handlers::analyze_reflection))
        .route("/reflections/list", get(handlers::list_reflections))
        .route("/reflections/query", post(handlers::query_reflections))
        .route("/voice/clone", post(handlers::clone_voice))
        .route("/voice/synthesize", post(handlers::synthesize))
        .route("/query/audio", post(handlers::audio_query))
        .route("/storage/:bucket/*path", get(handlers::serve_object))
        // Multipart overhead plus up to five clone samples
        .layer(DefaultBodyLimit::max(body_limit.saturating_mul(5).saturating_add(64 * 1024)))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
