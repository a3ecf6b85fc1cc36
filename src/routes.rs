// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Streaming chat over SSE (GET text-only, POST with images)
// - Non-streaming chat returning parsed sections and the raw response
// - Session bookkeeping routes backed by the injected SessionStore
// - CORS, body limit and request tracing layers
// - Map internal errors to opaque client messages

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::delivery::{DeliveryEvent, DeliveryPolicy, StreamCoordinator, PUBLIC_ERROR_MESSAGE};
use crate::images::{sanitize_images, ImageAttachment};
use crate::prompt::PromptLibrary;
use crate::provider::{CompletionProvider, CompletionRequest, ProviderError};
use crate::sections::{extract, ExtractedSection, SectionCatalog};
use crate::store::{ChatRecord, Role, SessionRecord, SessionStore, StoreError, Transcript};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, public_message) = match &self {
            RelayError::BadRequest(reason) => (StatusCode::BAD_REQUEST, *reason),
            RelayError::Provider(_) => (StatusCode::BAD_GATEWAY, PUBLIC_ERROR_MESSAGE),
            RelayError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "session store request failed"),
        };
        (status, Json(json!({ "error": public_message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn CompletionProvider>,
    pub prompts: Arc<PromptLibrary>,
    pub store: Arc<dyn SessionStore>,
    pub catalog: Arc<SectionCatalog>,
    pub delivery: DeliveryPolicy,
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub session_id: Option<String>,
    pub message: Option<String>,
    pub mode: Option<String>,
    pub count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
    /// Left untyped so malformed entries are dropped rather than rejected.
    pub images: Option<serde_json::Value>,
    pub mode: Option<String>,
    /// A number or a numeric string.
    pub count: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub sections: Vec<ExtractedSection>,
    #[serde(rename = "rawResponse")]
    pub raw_response: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartBody {
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveBody {
    pub session_id: String,
    pub role: Role,
    pub message: String,
}

/// A validated chat request, common to every chat route.
struct ChatInput {
    session_id: Option<String>,
    message: String,
    mode: String,
    count: Option<u32>,
    images: Vec<ImageAttachment>,
}

const INVALID_BODY: &str = "invalid request body";
const INVALID_COUNT: &str = "count must be a non-negative integer";

/// Parse the optional prompt variant count from a query string value.
fn count_from_str(raw: Option<&str>) -> Result<Option<u32>, &'static str> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text.parse().map(Some).map_err(|_| INVALID_COUNT),
    }
}

/// Parse the optional prompt variant count from a JSON body value.
fn count_from_json(raw: Option<&serde_json::Value>) -> Result<Option<u32>, &'static str> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or(INVALID_COUNT),
        Some(serde_json::Value::String(s)) => count_from_str(Some(s.as_str())),
        Some(_) => Err(INVALID_COUNT),
    }
}

impl ChatInput {
    /// Validate the fields common to every chat route. The error is the
    /// client-facing reason.
    fn new(
        session_id: Option<String>,
        message: String,
        mode: Option<String>,
        count: Option<u32>,
        images: Vec<ImageAttachment>,
    ) -> Result<Self, &'static str> {
        let mode = mode
            .filter(|m| !m.trim().is_empty())
            .ok_or("mode is required")?;
        Ok(Self {
            session_id: session_id.filter(|s| !s.trim().is_empty()),
            message,
            mode,
            count,
            images,
        })
    }

    fn from_query(query: StreamQuery) -> Result<Self, &'static str> {
        let message = query.message.ok_or("message is required")?;
        let count = count_from_str(query.count.as_deref())?;
        Self::new(query.session_id, message, query.mode, count, Vec::new())
    }

    fn from_body(body: ChatBody, with_images: bool) -> Result<Self, &'static str> {
        let count = count_from_json(body.count.as_ref())?;
        let images = if with_images {
            sanitize_images(body.images.as_ref())
        } else {
            Vec::new()
        };
        Self::new(body.session_id, body.message, body.mode, count, images)
    }

    fn completion_request(&self, prompts: &PromptLibrary, stream: bool) -> CompletionRequest {
        if !prompts.has_mode(&self.mode) {
            tracing::debug!(
                mode = %self.mode,
                fallback = prompts.fallback_mode(),
                "unknown mode, using fallback prompt"
            );
        }
        CompletionRequest {
            system_prompt: prompts.system_prompt(&self.mode, self.count).to_string(),
            message: self.message.clone(),
            images: self.images.clone(),
            stream,
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming handlers
// ---------------------------------------------------------------------------

/// GET /chat/stream -> text-only SSE stream
pub async fn stream_get(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Response {
    let input = query
        .map_err(|e| {
            tracing::debug!(error = %e, "unreadable stream query");
            INVALID_BODY
        })
        .and_then(|Query(q)| ChatInput::from_query(q));
    match input {
        Ok(input) => start_stream(&state, input),
        Err(reason) => input_error_stream(reason),
    }
}

/// POST /chat/stream -> SSE stream, images allowed
pub async fn stream_post(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let input = body
        .map_err(|e| {
            tracing::debug!(error = %e, "unreadable stream body");
            INVALID_BODY
        })
        .and_then(|Json(b)| ChatInput::from_body(b, true));
    match input {
        Ok(input) => start_stream(&state, input),
        Err(reason) => input_error_stream(reason),
    }
}

fn start_stream(state: &AppState, input: ChatInput) -> Response {
    tracing::debug!(
        mode = %input.mode,
        count = ?input.count,
        images = input.images.len(),
        session_id = ?input.session_id,
        "chat stream requested"
    );
    let request = input.completion_request(&state.prompts, true);
    let transcript = input
        .session_id
        .map(|id| Transcript::new(state.store.clone(), id));
    let coordinator = StreamCoordinator::new(state.catalog.clone(), state.delivery);
    event_stream(coordinator.spawn(state.provider.clone(), request, transcript))
}

/// A stream holding only an error event; no provider call, no heartbeat.
fn input_error_stream(reason: &'static str) -> Response {
    tracing::warn!(reason, "rejected chat stream request");
    let event = DeliveryEvent::Error {
        error: reason.to_string(),
    };
    event_stream(stream::once(async move { event }))
}

fn event_stream<S>(events: S) -> Response
where
    S: Stream<Item = DeliveryEvent> + Send + 'static,
{
    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(event.to_frame())));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

// ---------------------------------------------------------------------------
// Non-streaming handlers
// ---------------------------------------------------------------------------

/// POST /chat -> text-only completion
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<CompletionResponse>, RelayError> {
    let input = ChatInput::from_body(body, false).map_err(RelayError::BadRequest)?;
    complete(&state, input).await
}

/// POST /chat/complete -> completion with images
pub async fn chat_complete(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<CompletionResponse>, RelayError> {
    let input = ChatInput::from_body(body, true).map_err(RelayError::BadRequest)?;
    complete(&state, input).await
}

async fn complete(state: &AppState, input: ChatInput) -> Result<Json<CompletionResponse>, RelayError> {
    let request = input.completion_request(&state.prompts, false);
    let raw_response = match state.provider.complete(request).await {
        Ok(completion) => completion.into_text().await,
        Err(e) => Err(e),
    }
    .map_err(|e| {
        tracing::error!(error = %e, mode = %input.mode, "completion failed");
        RelayError::Provider(e)
    })?;

    let sections = extract(&state.catalog, &raw_response);
    tracing::info!(
        mode = %input.mode,
        sections = sections.len(),
        response_bytes = raw_response.len(),
        "completion delivered"
    );

    if let Some(session_id) = input.session_id {
        let transcript = Transcript::new(state.store.clone(), session_id);
        let message = input.message;
        let reply = raw_response.clone();
        tokio::spawn(async move {
            if let Err(e) = transcript.save_exchange(&message, &reply).await {
                tracing::warn!(
                    session_id = transcript.session_id(),
                    error = %e,
                    "failed to save transcript"
                );
            }
        });
    }

    Ok(Json(CompletionResponse {
        sections,
        raw_response,
    }))
}

// ---------------------------------------------------------------------------
// Session handlers
// ---------------------------------------------------------------------------

/// POST /chat/start -> new session id
///
/// The body is optional; an absent or unreadable one starts a session in
/// the fallback mode.
pub async fn start_session(State(state): State<AppState>, body: Bytes) -> Json<serde_json::Value> {
    let mode = serde_json::from_slice::<StartBody>(&body)
        .ok()
        .and_then(|b| b.mode)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.prompts.fallback_mode().to_string());
    let session = SessionRecord {
        id: Uuid::new_v4().to_string(),
        mode,
        created_at: Utc::now(),
    };
    let id = session.id.clone();

    if let Err(e) = state.store.create_session(session).await {
        tracing::warn!(session_id = %id, error = %e, "failed to record session");
    }
    Json(json!({ "id": id }))
}

/// POST /chat/save -> persist one message
pub async fn save_message(
    State(state): State<AppState>,
    Json(body): Json<SaveBody>,
) -> Result<StatusCode, RelayError> {
    if body.session_id.trim().is_empty() {
        return Err(RelayError::BadRequest("session_id is required"));
    }
    let record = ChatRecord::now(body.session_id, body.role, body.message);
    state.store.save_message(record).await.map_err(|e| {
        tracing::warn!(error = %e, "failed to save message");
        RelayError::Store(e)
    })?;
    Ok(StatusCode::CREATED)
}

/// GET /chat/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionRecord>>, RelayError> {
    let sessions = state.store.sessions().await.map_err(|e| {
        tracing::warn!(error = %e, "failed to list sessions");
        RelayError::Store(e)
    })?;
    Ok(Json(sessions))
}

/// GET /chat/{session_id}
pub async fn session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ChatRecord>>, RelayError> {
    let messages = state.store.messages(&session_id).await.map_err(|e| {
        tracing::warn!(session_id = %session_id, error = %e, "failed to load messages");
        RelayError::Store(e)
    })?;
    Ok(Json(messages))
}

/// GET /chat/store-health
pub async fn store_health(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "session store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "ok": false }))).into_response()
        }
    }
}

/// GET /health -> 200 OK
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Build the relay router. All collaborators arrive through `state`.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat/complete", post(chat_complete))
        .route("/chat/stream", get(stream_get).post(stream_post))
        .route("/chat/start", post(start_session))
        .route("/chat/save", post(save_message))
        .route("/chat/sessions", get(list_sessions))
        .route("/chat/store-health", get(store_health))
        .route("/chat/{session_id}", get(session_messages))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
