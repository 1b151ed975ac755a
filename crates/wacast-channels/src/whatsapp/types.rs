//! Bridge wire types.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use wacast_core::error::WacastError;

/// Envelope around every bridge reply.
#[derive(Debug, Deserialize)]
pub(crate) struct BridgeResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T: DeserializeOwned> BridgeResponse<T> {
    pub fn into_result(self, path: &str) -> Result<T, WacastError> {
        if !self.ok {
            return Err(WacastError::Channel(format!(
                "bridge {path}: {}",
                self.error.unwrap_or_else(|| "unknown error".into())
            )));
        }
        match self.result {
            Some(r) => Ok(r),
            // Endpoints without a payload answer `"result": null`.
            None => serde_json::from_value(serde_json::Value::Null).map_err(|_| {
                WacastError::Channel(format!("bridge {path}: missing result"))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BridgeUpdate {
    pub update_id: i64,
    pub message: Option<BridgeMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BridgeMessage {
    /// Chat JID (`…@s.whatsapp.net` or `…@g.us`).
    pub chat: String,
    /// Sender JID. Equals `chat` in direct chats.
    pub sender: String,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document: Option<BridgeDocument>,
    #[serde(default)]
    pub contact: Option<BridgeContact>,
    /// Document carried by the message being replied to.
    #[serde(default)]
    pub quoted_document: Option<BridgeDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BridgeDocument {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Base64-encoded file contents.
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BridgeContact {
    #[serde(default)]
    pub display_name: Option<String>,
    pub vcard: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendText<'a> {
    pub jid: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendDocument<'a> {
    pub jid: &'a str,
    pub file_name: &'a str,
    pub mimetype: &'a str,
    pub caption: &'a str,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct Presence<'a> {
    pub jid: &'a str,
    pub state: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CheckRequest<'a> {
    pub jid: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckResult {
    pub exists: bool,
    #[serde(default)]
    pub jid: Option<String>,
}
