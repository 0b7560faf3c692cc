//! HTTP Endpoints
//!
//! Router wiring for the WebSocket endpoint and service health checks.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket::ChatHandler;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // WebSocket chat
        .route("/ws", get(ws_handler))

        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))

        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// WebSocket handler wrapper
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, axum::http::StatusCode> {
    ChatHandler::handle(ws, State(state)).await
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "connections": state.connections.count(),
    }))
}
