//! Chat turn handlers: blocking turn, stream start, SSE attach, stop.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::models::message::MessageRole;
use crate::relay::channel::{ClientChannel, CloseReason, Frame};
use crate::relay::event::StreamEvent;
use crate::relay::registry::{SessionContext, StreamMode, StreamSessionRegistry};
use crate::{AppError, Result};

use super::AppState;

/// One chat turn request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatRequest {
    /// Conversation the turn belongs to.
    pub conversation_id: i64,
    /// User message text.
    pub message: String,
    /// Message this turn replies to, if branching.
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Request a true upstream stream instead of the paced replay.
    #[serde(default)]
    pub upstream: bool,
}

/// Completed blocking turn.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatResponse {
    /// Id of the persisted assistant message.
    pub message_id: i64,
    /// Conversation the turn belongs to.
    pub conversation_id: i64,
    /// Always `assistant`.
    pub role: &'static str,
    /// Full reply text.
    pub content: String,
    /// Persistence timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Freshly started streaming turn.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StartStreamResponse {
    /// Session id for the subsequent SSE attach.
    pub stream_id: String,
}

/// Optional credentials on an SSE attach.
#[derive(Debug, Deserialize)]
pub struct AttachQuery {
    /// Bearer token issued by the auth service.
    pub token: Option<String>,
}

/// Liveness report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthStatus {
    /// Always `ok` when the server answers.
    pub status: &'static str,
    /// `healthy` or `unreachable`.
    pub upstream: &'static str,
    /// Number of live streaming sessions.
    pub live_sessions: usize,
}

/// Resolve the authenticated user from the `Authorization` header.
fn current_user(state: &AppState, headers: &HeaderMap) -> Result<i64> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("malformed authorization header".into()))?;
    state.validator.validate(token)
}

/// `POST /api/chat` — blocking turn: one completion call, reply in the body.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` without valid credentials,
/// `AppError::NotFound` for a foreign conversation, `AppError` variants from
/// persistence or the upstream call.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let user_id = current_user(&state, &headers)?;
    let conversation = state
        .conversations
        .get_owned(request.conversation_id, user_id)
        .await?;

    let user_message = state
        .messages
        .insert(
            conversation.id,
            request.parent_id,
            MessageRole::User,
            &request.message,
        )
        .await?;

    let history = state
        .messages
        .recent_for_conversation(conversation.id, state.config.relay.history_limit)
        .await?;

    info!(user_id, conversation_id = conversation.id, "blocking chat turn");
    let reply = state
        .backend
        .complete(
            &request.message,
            &history,
            &state.config.upstream.system_prompt,
        )
        .await?;

    let assistant = state
        .messages
        .insert(
            conversation.id,
            Some(user_message.id),
            MessageRole::Assistant,
            &reply,
        )
        .await?;
    state.conversations.touch(conversation.id).await?;

    Ok(Json(ChatResponse {
        message_id: assistant.id,
        conversation_id: conversation.id,
        role: MessageRole::Assistant.as_str(),
        content: assistant.content,
        timestamp: assistant.created_at,
    }))
}

/// `POST /api/chat/stream` — start a streaming turn.
///
/// Persists the USER message and registers the session; the reply stream is
/// produced once the client attaches by id.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` without valid credentials,
/// `AppError::NotFound` for a foreign conversation, `AppError::Db` on
/// persistence failure.
pub async fn start_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<StartStreamResponse>> {
    let user_id = current_user(&state, &headers)?;
    let conversation = state
        .conversations
        .get_owned(request.conversation_id, user_id)
        .await?;

    let user_message = state
        .messages
        .insert(
            conversation.id,
            request.parent_id,
            MessageRole::User,
            &request.message,
        )
        .await?;

    let mode = if request.upstream {
        StreamMode::Upstream
    } else {
        StreamMode::Paced
    };
    let context = SessionContext::new(
        user_id,
        conversation.id,
        user_message.id,
        request.message,
        mode,
    );
    let stream_id = state.registry.create(context).await;

    info!(user_id, conversation_id = conversation.id, %stream_id, ?mode, "stream turn started");
    Ok(Json(StartStreamResponse { stream_id }))
}

/// Adapt the channel's frame queue into SSE events, stopping at the close
/// sentinel.
fn sse_frames(
    frames: ReceiverStream<Frame>,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    frames
        .take_while(|frame| *frame != Frame::Close)
        .map(|frame| {
            let event = match frame {
                Frame::Connect(data) => Event::default().event("connect").data(data),
                Frame::Chunk(data) => Event::default().event("chunk").data(data),
                Frame::Close => Event::default(),
            };
            Ok(event)
        })
}

/// `GET /api/chat/stream/{id}` — attach the client's push channel.
///
/// Always returns an SSE stream. An invalid token or unknown session id
/// yields a short stream carrying a single ERROR event; attaching before the
/// session exists (or after it was cleaned up) is an expected race, not a
/// server fault.
pub async fn attach_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AttachQuery>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let relay = &state.config.relay;
    let (channel, frames) = ClientChannel::new(
        id.clone(),
        relay.channel_capacity,
        relay.idle_timeout(),
    );

    if let Some(token) = query.token.as_deref() {
        if let Err(err) = state.validator.validate(token) {
            warn!(session_id = %id, %err, "attach with invalid token");
            let _ = channel
                .send(&StreamEvent::Error("authentication required".into()))
                .await;
            channel.close(CloseReason::Error);
            return Sse::new(sse_frames(frames));
        }
    }

    if let Err(err) = channel.send_connect().await {
        warn!(session_id = %id, %err, "connect handshake failed");
    }

    match state.registry.attach(&id, channel.clone()).await {
        Ok((context, cancel)) => {
            install_cleanup_hooks(&channel, &state.registry, &id);

            let orchestrator = Arc::clone(&state.orchestrator);
            let session_id = id.clone();
            tokio::spawn(async move {
                orchestrator
                    .run(&session_id, context, channel, cancel)
                    .await;
            });
        }
        Err(err) => {
            // Normal race: the turn was never started or already finished.
            info!(session_id = %id, "attach to unknown session");
            let _ = channel.send(&StreamEvent::Error(err.to_string())).await;
            channel.close(CloseReason::Error);
        }
    }

    Sse::new(sse_frames(frames))
}

/// Wire the channel's close callbacks to registry cleanup.
fn install_cleanup_hooks(
    channel: &ClientChannel,
    registry: &Arc<StreamSessionRegistry>,
    id: &str,
) {
    let remove = |registry: Arc<StreamSessionRegistry>, id: String| {
        move || {
            tokio::spawn(async move {
                registry.remove(&id).await;
            });
        }
    };
    channel.on_completion({
        let hook = remove(Arc::clone(registry), id.to_owned());
        let id = id.to_owned();
        move || {
            info!(session_id = %id, "stream completed");
            hook();
        }
    });
    channel.on_timeout({
        let hook = remove(Arc::clone(registry), id.to_owned());
        let id = id.to_owned();
        move || {
            warn!(session_id = %id, "stream timed out");
            hook();
        }
    });
    channel.on_error({
        let hook = remove(Arc::clone(registry), id.to_owned());
        let id = id.to_owned();
        move || {
            warn!(session_id = %id, "stream errored");
            hook();
        }
    });
}

/// `DELETE /api/chat/stream/{id}` — explicit cancellation.
pub async fn stop_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let stopped = state.registry.stop(&id).await;
    info!(session_id = %id, stopped, "stream stop requested");
    Json(serde_json::json!({ "message": "stream stopped" }))
}

/// `GET /health` — liveness probe, including upstream reachability.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let upstream = if state.backend.health().await {
        "healthy"
    } else {
        "unreachable"
    };
    Json(HealthStatus {
        status: "ok",
        upstream,
        live_sessions: state.registry.live_count().await,
    })
}
