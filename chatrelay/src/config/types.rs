use std::time::Duration;

use crate::message::RequestLimits;

/// Backend URL used when neither the config file nor `BACKEND_URL` set one.
pub const DEFAULT_BACKEND_URL: &str = "http://backend:8000";

/// Environment variable consulted when `backend.url` is absent.
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

pub const DEFAULT_GREETING: &str =
    "Neural interface established. Welcome, visitor. How can I assist your inquiry today?";

pub const DEFAULT_FAILURE_MESSAGE: &str = "Neural connection interrupted. Please retry.";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Parsed and validated chatrelay config.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    /// Where and how to reach the generation backend.
    pub backend: BackendConfig,
    /// Gateway-side request limits.
    pub relay: RelayConfig,
    /// Texts used by the stream consumer.
    pub client: ClientConfig,
    /// Environment label (e.g. "production"), logged at startup.
    pub environment: String,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Base URL; `/api/chat` is appended per request.
    pub url: String,
    /// Connect timeout, and whole-request timeout for non-streaming calls.
    pub timeout: Duration,
    /// Longest allowed gap between two streamed chunks.
    pub idle_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl BackendConfig {
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub max_body_bytes: usize,
    pub limits: RequestLimits,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            limits: RequestLimits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Assistant turn a new transcript starts with, if any.
    pub greeting: Option<String>,
    /// Assistant text shown when a response cannot be obtained.
    pub failure_message: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            greeting: Some(DEFAULT_GREETING.to_string()),
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}
