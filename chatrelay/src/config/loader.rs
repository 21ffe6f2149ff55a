// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::message::RequestLimits;

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::{ConfigSource, StringSource};
use super::types::*;

/// Load and validate a chatrelay config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Parse into raw deserialization types
/// 3. Check the version key
/// 4. Resolve `${VAR}` interpolation in string fields
/// 5. Apply defaults and range checks, build the typed `Config`
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.chatrelay != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.chatrelay
        )));
    }

    let backend = build_backend_config(raw.backend)?;
    let relay = build_relay_config(raw.relay)?;
    let client = build_client_config(raw.client)?;
    let environment = raw
        .environment
        .map(|e| resolve_variables(&e))
        .transpose()?
        .unwrap_or_default();

    Ok(Config {
        backend,
        relay,
        client,
        environment,
    })
}

/// Config used when no file is given: every default, backend URL from the
/// environment.
pub fn default_config() -> Result<Config, ConfigError> {
    load_config(&StringSource {
        content: "chatrelay: v1\n".to_string(),
    })
}

fn build_backend_config(raw: Option<raw::RawBackendConfig>) -> Result<BackendConfig, ConfigError> {
    let defaults = BackendConfig::default();
    let raw = raw.unwrap_or(raw::RawBackendConfig {
        url: None,
        timeout_ms: None,
        idle_timeout_ms: None,
    });

    let url = match raw.url {
        Some(url) => resolve_variables(&url)?,
        None => std::env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.url),
    };
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "backend.url \"{url}\" must start with http:// or https://"
        )));
    }

    Ok(BackendConfig {
        url,
        timeout: positive_millis("backend.timeout_ms", raw.timeout_ms)?
            .unwrap_or(defaults.timeout),
        idle_timeout: positive_millis("backend.idle_timeout_ms", raw.idle_timeout_ms)?
            .unwrap_or(defaults.idle_timeout),
    })
}

fn build_relay_config(raw: Option<raw::RawRelayConfig>) -> Result<RelayConfig, ConfigError> {
    let defaults = RelayConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    Ok(RelayConfig {
        max_body_bytes: positive("relay.max_body_bytes", raw.max_body_bytes)?
            .unwrap_or(defaults.max_body_bytes),
        limits: RequestLimits {
            max_message_chars: positive("relay.max_message_chars", raw.max_message_chars)?
                .unwrap_or(defaults.limits.max_message_chars),
            // Zero history is a legitimate "no context" setting.
            max_history_turns: raw
                .max_history_turns
                .unwrap_or(defaults.limits.max_history_turns),
        },
    })
}

fn build_client_config(raw: Option<raw::RawClientConfig>) -> Result<ClientConfig, ConfigError> {
    let defaults = ClientConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let greeting = match raw.greeting {
        Some(g) => Some(resolve_variables(&g)?).filter(|g| !g.is_empty()),
        None => defaults.greeting,
    };

    let failure_message = match raw.failure_message {
        Some(m) => resolve_variables(&m)?,
        None => defaults.failure_message,
    };
    if failure_message.trim().is_empty() {
        return Err(ConfigError::Validation(
            "client.failure_message must not be empty".to_string(),
        ));
    }

    Ok(ClientConfig {
        greeting,
        failure_message,
    })
}

fn positive(field: &str, value: Option<usize>) -> Result<Option<usize>, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Validation(format!("{field} must be greater than 0"))),
        other => Ok(other),
    }
}

fn positive_millis(field: &str, value: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Validation(format!("{field} must be greater than 0"))),
        other => Ok(other.map(Duration::from_millis)),
    }
}
