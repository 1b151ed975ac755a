//! WhatsApp channel backed by an HTTP bridge.
//!
//! The bridge owns the WhatsApp Web session (pairing, encryption, the
//! socket). This client long-polls it for inbound messages and calls it to
//! send text, documents, presence, and registration checks.

mod polling;
mod send;
pub(crate) mod types;


pub use send::split_message;

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use wacast_core::{config::WhatsAppConfig, error::WacastError};

use types::BridgeResponse;

/// WhatsApp's practical per-message text limit.
pub const MAX_TEXT_LEN: usize = 4096;

/// WhatsApp channel talking to a bridge sidecar.
pub struct WhatsAppBridge {
    config: WhatsAppConfig,
    client: reqwest::Client,
    base_url: String,
    /// Tracks the last update_id to avoid reprocessing.
    last_update_id: Arc<Mutex<Option<i64>>>,
}

impl WhatsAppBridge {
    /// Create a new bridge client from config.
    pub fn new(config: WhatsAppConfig) -> Self {
        let base_url = config.bridge_url.trim_end_matches('/').to_string();
        Self {
            config,
            client: reqwest::Client::new(),
            base_url,
            last_update_id: Arc::new(Mutex::new(None)),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.bridge_token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.config.bridge_token)
        }
    }

    /// POST `body` to `{bridge}{path}` and unwrap the bridge envelope.
    async fn call<B, T>(&self, path: &str, body: &B) -> Result<T, WacastError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .authorize(self.client.post(&url))
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .json(body)
            .send()
            .await
            .map_err(|e| WacastError::Channel(format!("bridge {path} failed: {e}")))?;

        let status = resp.status();
        let envelope: BridgeResponse<T> = resp.json().await.map_err(|e| {
            WacastError::Channel(format!("bridge {path} returned {status}, unreadable body: {e}"))
        })?;
        envelope.into_result(path)
    }
}
