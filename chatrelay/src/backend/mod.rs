// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Backend client
//
// The upstream half of the relay:
// - Encode the validated chat request and POST it to `{backend}/api/chat`
// - One attempt per request, no retry
// - Streaming calls hand back the body as a byte stream; nothing is buffered
// - Transport failures are classified as failure vs timeout
//
// The HTTP transport is injected through `HttpSender` so the relay can be
// tested without sockets.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::TryStreamExt;

use crate::config::BackendConfig;
use crate::message::ChatRequest;
use crate::relay::{RelayError, UpstreamBody, UpstreamClient, UpstreamResponse};

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Whole-request deadline. Left unset for streaming calls, whose length
    /// is unbounded; those are policed by the relay's idle timeout instead.
    pub timeout: Option<Duration>,
    pub stream: bool,
}

pub type HttpByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

pub enum HttpBody {
    Full(Bytes),
    Stream(HttpByteStream),
}

pub struct HttpResponse {
    pub status: StatusCode,
    pub body: HttpBody,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend request timed out: {0}")]
    Timeout(String),
}

impl From<HttpError> for RelayError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Transport(msg) => RelayError::UpstreamFailure(msg),
            HttpError::Timeout(msg) => RelayError::UpstreamTimeout(msg),
        }
    }
}

/// Sends HTTP requests to the generation backend.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// ---------------------------------------------------------------------------
// BackendClient
// ---------------------------------------------------------------------------

/// Forwards chat requests to the configured backend.
pub struct BackendClient {
    http: Arc<dyn HttpSender>,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(http: Arc<dyn HttpSender>, config: BackendConfig) -> Self {
        Self { http, config }
    }

    fn build_request(&self, request: &ChatRequest) -> Result<HttpRequest, RelayError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| RelayError::UpstreamFailure(format!("failed to encode request: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(if request.stream {
                "text/event-stream"
            } else {
                "application/json"
            }),
        );

        Ok(HttpRequest {
            method: Method::POST,
            url: self.config.chat_url(),
            headers,
            body: Bytes::from(body),
            timeout: (!request.stream).then_some(self.config.timeout),
            stream: request.stream,
        })
    }
}

#[async_trait]
impl UpstreamClient for BackendClient {
    async fn forward(&self, request: &ChatRequest) -> Result<UpstreamResponse, RelayError> {
        let http_req = self.build_request(request)?;
        tracing::debug!(url = %http_req.url, stream = http_req.stream, "calling backend");

        let resp = self.http.send(http_req).await?;
        tracing::debug!(status = resp.status.as_u16(), "backend responded");

        let body = match resp.body {
            HttpBody::Full(bytes) => UpstreamBody::Full(bytes),
            HttpBody::Stream(s) => UpstreamBody::Stream(Box::pin(s.map_err(RelayError::from))),
        };
        Ok(UpstreamResponse {
            status: resp.status,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Reqwest HTTP sender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client whose connection attempts give up after `connect_timeout`.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self::new(client))
    }
}

fn classify(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout(err.to_string())
    } else {
        HttpError::Transport(err.to_string())
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await.map_err(classify)?;
        let status = resp.status();

        let body = if request.stream {
            HttpBody::Stream(Box::pin(resp.bytes_stream().map_err(classify)))
        } else {
            HttpBody::Full(resp.bytes().await.map_err(classify)?)
        };

        Ok(HttpResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Public factory
// ---------------------------------------------------------------------------

/// Backend client over a real reqwest transport.
pub fn build_backend_client(config: &BackendConfig) -> Result<BackendClient, HttpError> {
    let http = ReqwestHttpSender::with_connect_timeout(config.timeout)?;
    Ok(BackendClient::new(Arc::new(http), config.clone()))
}
