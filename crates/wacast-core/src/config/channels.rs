use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::*;

/// Backoff between bridge send attempts. One attempt per entry.
pub const BRIDGE_RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

/// WhatsApp bridge config.
///
/// The bridge is a sidecar that owns the WhatsApp Web session and exposes it
/// over HTTP: long-poll `GET /updates`, `POST /send/*`, `POST /check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Bearer token for the bridge. Empty = no auth header.
    #[serde(default)]
    pub bridge_token: String,
    /// Allowed phone numbers (e.g. `["254712345678"]`). Empty = allow all.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Per-request timeout for bridge calls.
    #[serde(default = "default_bridge_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl WhatsAppConfig {
    /// Worst-case time to deliver one message: a presence call plus every
    /// send attempt timing out, with the backoff in between.
    pub fn send_budget(&self) -> Duration {
        let request = Duration::from_secs(self.request_timeout_secs);
        let attempts = BRIDGE_RETRY_DELAYS_MS.len() as u32;
        // No sleep after the last attempt.
        let backoff: u64 = BRIDGE_RETRY_DELAYS_MS[..BRIDGE_RETRY_DELAYS_MS.len() - 1]
            .iter()
            .sum();
        request * (attempts + 1) + Duration::from_millis(backoff)
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bridge_url: default_bridge_url(),
            bridge_token: String::new(),
            allowed_users: Vec::new(),
            request_timeout_secs: default_bridge_request_timeout_secs(),
        }
    }
}
