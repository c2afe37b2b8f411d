//! HTTP API: chat turn endpoints and SSE stream attachment.

pub mod chat;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::TokenValidator;
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::message_repo::MessageRepo;
use crate::relay::orchestrator::StreamOrchestrator;
use crate::relay::registry::StreamSessionRegistry;
use crate::upstream::CompletionBackend;
use crate::{AppError, GlobalConfig, Result};

/// Shared application state handed to every handler.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Live streaming sessions.
    pub registry: Arc<StreamSessionRegistry>,
    /// Session coordinator.
    pub orchestrator: Arc<StreamOrchestrator>,
    /// AI completion backend.
    pub backend: Arc<dyn CompletionBackend>,
    /// Conversation repository.
    pub conversations: ConversationRepo,
    /// Message repository.
    pub messages: MessageRepo,
    /// Bearer-token validator.
    pub validator: Arc<TokenValidator>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) | Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Auth(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::UpstreamUnavailable(_) | Self::UpstreamTimeout(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the API router over shared state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat::send_message))
        .route("/api/chat/stream", post(chat::start_stream))
        .route(
            "/api/chat/stream/{id}",
            get(chat::attach_stream).delete(chat::stop_stream),
        )
        .route("/health", get(chat::health))
        .with_state(state)
}

/// Serve the HTTP API on `config.http_port` until the token is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind or the server
/// fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], state.config.http_port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP API on {bind}: {err}")))?;

    info!(%bind, "starting chat relay HTTP API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Config(format!("HTTP server error: {err}")))?;

    info!("HTTP API shut down");
    Ok(())
}
