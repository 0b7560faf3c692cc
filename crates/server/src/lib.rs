//! SpeakStream Server
//!
//! Provides the WebSocket and HTTP endpoints for the streaming chat
//! pipeline.

pub mod http;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use rate_limit::{RateLimitError, RateLimiter};
pub use session::{Connection, ConnectionRegistry};
pub use state::AppState;
pub use websocket::ChatHandler;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Connection(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::WebSocket(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::RateLimit => axum::http::StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
