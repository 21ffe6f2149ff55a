// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Wire types for the chat endpoint.
//
// These are shared by the gateway (which validates and re-serializes the
// request before forwarding it) and the stream consumer (which builds the
// request from its transcript).

use serde::{Deserialize, Deserializer, Serialize};

/// The role of a conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`.
///
/// `messages` is prior conversation context only; the backend does not treat
/// it as authoritative; absent or `null` means no history. `stream` defaults
/// to `true` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub messages: Vec<Turn>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Turn>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<Turn>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl ChatRequest {
    /// Build a streaming request carrying `history` as context.
    pub fn streaming(message: impl Into<String>, history: Vec<Turn>) -> Self {
        Self {
            message: message.into(),
            messages: history,
            stream: true,
        }
    }

    /// Check the request against the relay's limits.
    ///
    /// Returns a human-readable reason on failure, suitable for a 400 body.
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message must not be empty".to_string());
        }
        let chars = self.message.chars().count();
        if chars > limits.max_message_chars {
            return Err(format!(
                "message is {chars} characters, limit is {}",
                limits.max_message_chars
            ));
        }
        if self.messages.len() > limits.max_history_turns {
            return Err(format!(
                "history has {} turns, limit is {}",
                self.messages.len(),
                limits.max_history_turns
            ));
        }
        Ok(())
    }
}

/// Limits applied to inbound chat requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_message_chars: usize,
    pub max_history_turns: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_message_chars: 2000,
            max_history_turns: 20,
        }
    }
}

/// Non-streaming response shape of the reference backend.
///
/// The gateway forwards non-streaming bodies verbatim and never parses them;
/// this type is for clients that want to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
}
