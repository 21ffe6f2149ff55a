// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Relay gateway
//
// Responsibilities:
// - POST /api/chat: validate, forward once via the injected UpstreamClient
// - Streaming: re-emit upstream chunks as they arrive, unbuffered
// - Non-streaming: pass upstream status and body through
// - Idle timeout on the streaming header wait and between streamed chunks
// - Caller disconnect drops the upstream stream, releasing the connection
// - GET /api/health, JSON 404 for everything else

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::config::Config;
use crate::message::{ChatRequest, RequestLimits};

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

pub type UpstreamStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

/// Body returned by the upstream client.
pub enum UpstreamBody {
    Full(Bytes),
    Stream(UpstreamStream),
}

/// Response received from the generation backend.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: UpstreamBody,
}

/// Errors that can occur while relaying a chat request.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("upstream returned status {0}")]
    UpstreamStatus(StatusCode),

    #[error("upstream stream idle for {0:?}")]
    IdleTimeout(Duration),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("failed to read request body: {0}")]
    UnreadableBody(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, public_message) = match &self {
            RelayError::UpstreamFailure(_)
            | RelayError::UpstreamStatus(_)
            | RelayError::IdleTimeout(_) => {
                (StatusCode::BAD_GATEWAY, "upstream request failed".to_string())
            }
            RelayError::UpstreamTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "upstream request timed out".to_string(),
            ),
            RelayError::MalformedJson(_) => (
                StatusCode::BAD_REQUEST,
                "request body is not valid JSON".to_string(),
            ),
            RelayError::EmptyBody => (StatusCode::BAD_REQUEST, "request body is empty".to_string()),
            RelayError::UnreadableBody(_) => (
                StatusCode::BAD_REQUEST,
                "request body could not be read".to_string(),
            ),
            RelayError::InvalidRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
        };
        (status, Json(serde_json::json!({ "error": public_message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the client that forwards chat requests to the backend.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(&self, request: &ChatRequest) -> Result<UpstreamResponse, RelayError>;
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Gateway-side limits and timings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub max_body_bytes: usize,
    pub limits: RequestLimits,
    pub idle_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_body_bytes: config.relay.max_body_bytes,
            limits: config.relay.limits.clone(),
            idle_timeout: config.backend.idle_timeout,
        }
    }
}

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub settings: Arc<RelaySettings>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Health endpoint: GET /api/health -> 200 `{"status":"ok"}`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
        .into_response()
}

/// Chat handler: POST /api/chat.
pub async fn chat_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = Uuid::new_v4();
    match relay_chat(&state, request, request_id).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(%request_id, error = %e, "chat request failed");
            e.into_response()
        }
    }
}

async fn relay_chat(
    state: &AppState,
    request: Request<Body>,
    request_id: Uuid,
) -> Result<Response, RelayError> {
    let body = axum::body::to_bytes(request.into_body(), state.settings.max_body_bytes)
        .await
        .map_err(|e| RelayError::UnreadableBody(e.to_string()))?;
    if body.is_empty() {
        return Err(RelayError::EmptyBody);
    }
    let chat: ChatRequest =
        serde_json::from_slice(&body).map_err(|e| RelayError::MalformedJson(e.to_string()))?;
    chat.validate(&state.settings.limits)
        .map_err(RelayError::InvalidRequest)?;

    tracing::info!(
        %request_id,
        stream = chat.stream,
        history_turns = chat.messages.len(),
        message_chars = chat.message.chars().count(),
        "relaying chat request"
    );

    let upstream = if chat.stream {
        // The per-request client timeout does not cover streams, so the wait
        // for response headers is bounded by the idle timeout instead.
        let idle_timeout = state.settings.idle_timeout;
        tokio::time::timeout(idle_timeout, state.upstream.forward(&chat))
            .await
            .map_err(|_| {
                RelayError::UpstreamTimeout(format!("no response headers within {idle_timeout:?}"))
            })??
    } else {
        state.upstream.forward(&chat).await?
    };

    if chat.stream {
        stream_response(upstream, state.settings.idle_timeout, request_id)
    } else {
        full_response(upstream, request_id).await
    }
}

fn stream_response(
    upstream: UpstreamResponse,
    idle_timeout: Duration,
    request_id: Uuid,
) -> Result<Response, RelayError> {
    // Headers are committed with the first byte, so a bad status has to be
    // reported before any of the body is relayed.
    if !upstream.status.is_success() {
        return Err(RelayError::UpstreamStatus(upstream.status));
    }

    let inner: UpstreamStream = match upstream.body {
        UpstreamBody::Stream(s) => s,
        UpstreamBody::Full(bytes) => Box::pin(stream::once(async move { Ok::<_, RelayError>(bytes) })),
    };
    let relay = RelayStream::new(inner, idle_timeout, request_id);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(relay),
    )
        .into_response())
}

async fn full_response(upstream: UpstreamResponse, request_id: Uuid) -> Result<Response, RelayError> {
    let body = match upstream.body {
        UpstreamBody::Full(bytes) => bytes,
        UpstreamBody::Stream(s) => {
            let chunks: Vec<Bytes> = s.try_collect().await?;
            Bytes::from(chunks.concat())
        }
    };
    tracing::info!(
        %request_id,
        status = upstream.status.as_u16(),
        bytes = body.len(),
        "relayed non-streaming response"
    );
    Ok((
        upstream.status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// RelayStream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayEnd {
    Open,
    Completed,
    Failed,
}

/// Streamed response body.
///
/// Passes chunks through unchanged and fails the body if the upstream goes
/// quiet for longer than the idle timeout. Dropping it (the caller went away,
/// or the body finished) drops the upstream stream with it.
pub struct RelayStream {
    inner: UpstreamStream,
    idle_timeout: Duration,
    idle: Pin<Box<tokio::time::Sleep>>,
    request_id: Uuid,
    started: Instant,
    chunks: u64,
    bytes: u64,
    end: RelayEnd,
}

impl RelayStream {
    pub fn new(inner: UpstreamStream, idle_timeout: Duration, request_id: Uuid) -> Self {
        Self {
            inner,
            idle_timeout,
            idle: Box::pin(tokio::time::sleep(idle_timeout)),
            request_id,
            started: Instant::now(),
            chunks: 0,
            bytes: 0,
            end: RelayEnd::Open,
        }
    }

    /// Drop the upstream stream now rather than when the body is dropped.
    fn release(&mut self) {
        self.inner = Box::pin(stream::empty::<Result<Bytes, RelayError>>());
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.end != RelayEnd::Open {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.chunks += 1;
                this.bytes += chunk.len() as u64;
                let deadline = tokio::time::Instant::now() + this.idle_timeout;
                this.idle.as_mut().reset(deadline);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.release();
                this.end = RelayEnd::Failed;
                tracing::warn!(request_id = %this.request_id, error = %e, "upstream stream failed");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.end = RelayEnd::Completed;
                Poll::Ready(None)
            }
            Poll::Pending => match this.idle.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.release();
                    this.end = RelayEnd::Failed;
                    tracing::warn!(
                        request_id = %this.request_id,
                        idle_timeout_ms = this.idle_timeout.as_millis() as u64,
                        "upstream stream went idle"
                    );
                    Poll::Ready(Some(Err(RelayError::IdleTimeout(this.idle_timeout))))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match self.end {
            RelayEnd::Open => tracing::info!(
                request_id = %self.request_id,
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "caller disconnected, upstream released"
            ),
            RelayEnd::Completed => tracing::info!(
                request_id = %self.request_id,
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "relay stream completed"
            ),
            RelayEnd::Failed => tracing::info!(
                request_id = %self.request_id,
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "relay stream aborted"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with the chat and health endpoints.
///
/// The upstream client is injected; nothing here opens a socket.
pub fn build_router(upstream: Arc<dyn UpstreamClient>, settings: RelaySettings) -> Router {
    let state = AppState {
        upstream,
        settings: Arc::new(settings),
    };

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/health", get(health))
        .fallback(not_found)
        .with_state(state)
}

/// Default listen address. Localhost unless overridden on the command line.
pub const BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
