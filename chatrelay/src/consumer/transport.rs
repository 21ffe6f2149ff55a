// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

use std::pin::Pin;

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::TryStreamExt;

use crate::message::ChatRequest;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Why a response could not be obtained or read to the end.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("could not reach chat endpoint: {0}")]
    Connect(String),
    #[error("chat endpoint returned status {0}")]
    Status(StatusCode),
    #[error("response stream broke: {0}")]
    Read(String),
}

/// Opens a streamed chat response.
///
/// The returned stream yields the raw response body in arrival order.
/// Dropping it must abort the underlying request.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}

/// `ChatTransport` over reqwest, posting to `{base_url}/api/chat`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let resp = self
            .client
            .post(&self.url)
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        Ok(Box::pin(
            resp.bytes_stream()
                .map_err(|e| TransportError::Read(e.to_string())),
        ))
    }
}
