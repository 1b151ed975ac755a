//! Outbound calls: text, documents, presence, registration checks.

use super::types::{CheckRequest, CheckResult, Presence, SendDocument, SendText};
use super::{WhatsAppBridge, MAX_TEXT_LEN};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::future::Future;
use tracing::{error, warn};
use wacast_core::{
    config::BRIDGE_RETRY_DELAYS_MS,
    error::WacastError,
    message::Document,
    traits::{Existence, Messenger},
};

/// Retry delays for exponential backoff: 500ms, 1s, 2s.
pub(super) const RETRY_DELAYS_MS: [u64; 3] = BRIDGE_RETRY_DELAYS_MS;

/// Run `attempt` up to three times with 500ms / 1s / 2s pauses in between.
pub(super) async fn retry<T, F, Fut>(what: &str, mut attempt: F) -> Result<T, WacastError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WacastError>>,
{
    let mut last_err = None;

    for (i, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let attempt_num = i + 1;
                if attempt_num < RETRY_DELAYS_MS.len() {
                    warn!(
                        "whatsapp {what} attempt {attempt_num}/{} failed: {e}, retrying in {delay_ms}ms",
                        RETRY_DELAYS_MS.len()
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
                } else {
                    error!(
                        "whatsapp {what} attempt {attempt_num}/{} failed: {e}, giving up",
                        RETRY_DELAYS_MS.len()
                    );
                }
                last_err = Some(e);
            }
        }
    }

    Err(WacastError::Channel(format!(
        "whatsapp {what} failed after {} attempts: {}",
        RETRY_DELAYS_MS.len(),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Split text into chunks of at most `max_len` bytes, preferring line breaks.
pub fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.len() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let break_at = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .map(|i| start + i + 1)
                .unwrap_or(end)
        } else {
            end
        };
        chunks.push(&text[start..break_at]);
        start = break_at;
    }

    chunks
}

#[async_trait]
impl Messenger for WhatsAppBridge {
    async fn check_exists(&self, jid: &str) -> Result<Existence, WacastError> {
        let body = CheckRequest { jid };
        let result: CheckResult = retry("check", || self.call("/check", &body)).await?;
        Ok(Existence {
            exists: result.exists,
            jid: result.jid.unwrap_or_else(|| jid.to_string()),
        })
    }

    async fn send_text(&self, jid: &str, text: &str) -> Result<(), WacastError> {
        for chunk in split_message(text, MAX_TEXT_LEN) {
            let body = SendText { jid, text: chunk };
            retry("send", || self.call::<_, ()>("/send/text", &body)).await?;
        }
        Ok(())
    }

    async fn send_document(&self, jid: &str, document: Document) -> Result<(), WacastError> {
        let body = SendDocument {
            jid,
            file_name: &document.filename,
            mimetype: &document.mimetype,
            caption: &document.caption,
            data: STANDARD.encode(&document.data),
        };
        retry("document", || self.call::<_, ()>("/send/document", &body)).await
    }

    async fn send_typing(&self, jid: &str) -> Result<(), WacastError> {
        // Presence is cosmetic: one attempt, no retries.
        self.call::<_, ()>(
            "/presence",
            &Presence {
                jid,
                state: "composing",
            },
        )
        .await
    }
}
