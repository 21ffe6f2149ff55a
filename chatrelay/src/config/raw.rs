// Raw YAML deserialization types (internal)
//
// Kept apart from the typed config because interpolation, defaulting and
// range checks happen between the two.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub chatrelay: String,
    pub backend: Option<RawBackendConfig>,
    pub relay: Option<RawRelayConfig>,
    pub client: Option<RawClientConfig>,
    pub environment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBackendConfig {
    pub url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRelayConfig {
    pub max_body_bytes: Option<usize>,
    pub max_message_chars: Option<usize>,
    pub max_history_turns: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawClientConfig {
    pub greeting: Option<String>,
    pub failure_message: Option<String>,
}
