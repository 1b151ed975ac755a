//! Long-polling update loop and Channel trait implementation.

use super::types::{BridgeDocument, BridgeMessage, BridgeResponse, BridgeUpdate};
use super::WhatsAppBridge;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wacast_core::{
    error::WacastError,
    message::{Attachment, AttachmentType, ContactCard, IncomingMessage, OutgoingMessage},
    phone,
    traits::{Channel, Messenger},
};

#[async_trait]
impl Channel for WhatsAppBridge {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, WacastError> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let token = self.config.bridge_token.clone();
        let allowed_users = self.config.allowed_users.clone();
        let last_update_id = self.last_update_id.clone();

        info!("WhatsApp bridge channel polling {base_url}...");

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;

            loop {
                let offset = last_update_id.lock().await.map(|id| id + 1).unwrap_or(0);
                let url = format!("{base_url}/updates?offset={offset}&timeout=30");

                let mut req = client.get(&url).timeout(Duration::from_secs(35));
                if !token.is_empty() {
                    req = req.bearer_auth(&token);
                }

                let resp = match req.send().await {
                    Ok(r) => r,
                    Err(e) => {
                        error!("whatsapp poll error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                let body: BridgeResponse<Vec<BridgeUpdate>> = match resp.json().await {
                    Ok(b) => b,
                    Err(e) => {
                        error!("whatsapp parse error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                if !body.ok {
                    error!(
                        "whatsapp bridge error (retry in {backoff_secs}s): {}",
                        body.error.unwrap_or_default()
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(60);
                    continue;
                }

                // Successful poll -- reset backoff.
                backoff_secs = 1;

                let updates = body.result.unwrap_or_default();
                if let Some(last) = updates.last() {
                    *last_update_id.lock().await = Some(last.update_id);
                }

                for update in updates {
                    let Some(msg) = update.message else { continue };
                    let Some(incoming) = to_incoming(msg, &allowed_users) else {
                        continue;
                    };
                    if tx.send(incoming).await.is_err() {
                        info!("whatsapp channel receiver dropped, stopping poll");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send_typing(&self, target: &str) -> Result<(), WacastError> {
        Messenger::send_typing(self, target).await
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), WacastError> {
        let target = message
            .reply_target
            .as_deref()
            .ok_or_else(|| WacastError::Channel("no reply_target on outgoing message".into()))?;

        match message.document {
            Some(mut doc) => {
                if doc.caption.is_empty() {
                    doc.caption = message.text;
                }
                self.send_document(target, doc).await
            }
            None => self.send_text(target, &message.text).await,
        }
    }

    async fn stop(&self) -> Result<(), WacastError> {
        info!("WhatsApp bridge channel stopped");
        Ok(())
    }
}

fn decode_document(doc: BridgeDocument, file_type: AttachmentType) -> Attachment {
    let data = doc.data.as_deref().and_then(|b64| match STANDARD.decode(b64) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("whatsapp: undecodable document payload: {e}");
            None
        }
    });
    Attachment {
        file_type,
        mimetype: doc.mimetype,
        data,
        filename: doc.file_name,
    }
}

/// Convert a bridge message into an [`IncomingMessage`], or drop it.
///
/// Group chats are ignored. Other senders must be in `allowed_users` unless
/// the list is empty; the bot's own messages (self-chat) always pass.
pub(super) fn to_incoming(msg: BridgeMessage, allowed_users: &[String]) -> Option<IncomingMessage> {
    if msg.chat.ends_with("@g.us") {
        debug!("whatsapp: ignoring group message from {}", msg.chat);
        return None;
    }

    let sender = phone::key_from_jid(&msg.sender).to_string();
    if !msg.from_me && !allowed_users.is_empty() && !allowed_users.contains(&sender) {
        warn!("ignoring message from unauthorized user {sender}");
        return None;
    }

    let caption = msg.document.as_ref().and_then(|d| d.caption.clone());
    let text = msg.text.or(caption).unwrap_or_default();

    let attachments = msg
        .document
        .map(|d| vec![decode_document(d, AttachmentType::Document)])
        .unwrap_or_default();
    let quoted = msg
        .quoted_document
        .map(|d| decode_document(d, AttachmentType::Document));
    let contact = msg.contact.map(|c| ContactCard {
        display_name: c.display_name,
        vcard: c.vcard,
    });

    if text.is_empty() && attachments.is_empty() && contact.is_none() {
        return None;
    }

    Some(IncomingMessage {
        id: Uuid::new_v4(),
        channel: "whatsapp".to_string(),
        sender_id: sender,
        sender_name: msg.push_name,
        text,
        timestamp: chrono::Utc::now(),
        attachments,
        quoted,
        contact,
        reply_target: Some(msg.chat),
        is_group: false,
        from_me: msg.from_me,
    })
}
