use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming message from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel name (e.g. "whatsapp").
    pub channel: String,
    /// Platform-specific user ID (the sender's phone number on WhatsApp).
    pub sender_id: String,
    /// Human-readable sender name.
    pub sender_name: Option<String>,
    /// Message text content (or the document caption).
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Files sent with this message.
    pub attachments: Vec<Attachment>,
    /// Document carried by the message this one replies to, if any.
    #[serde(default)]
    pub quoted: Option<Attachment>,
    /// Contact card shared in this message, if any.
    #[serde(default)]
    pub contact: Option<ContactCard>,
    /// Platform-specific target for routing the response (chat JID).
    #[serde(default)]
    pub reply_target: Option<String>,
    /// Whether this message comes from a group chat.
    #[serde(default)]
    pub is_group: bool,
    /// Whether the bot account itself sent this message (self-chat).
    #[serde(default)]
    pub from_me: bool,
}

impl IncomingMessage {
    /// The first document attachment, if any.
    pub fn document(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| matches!(a.file_type, AttachmentType::Document))
    }
}

/// An outgoing message to send back through a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    /// Optional document sent alongside (the text becomes its caption).
    #[serde(default)]
    pub document: Option<Document>,
    /// Platform-specific target for routing.
    #[serde(default)]
    pub reply_target: Option<String>,
}

/// A document to deliver to a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub mimetype: String,
    pub caption: String,
    pub data: Vec<u8>,
}

impl Document {
    /// A CSV document.
    pub fn csv(filename: &str, caption: &str, data: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            mimetype: "text/csv".to_string(),
            caption: caption.to_string(),
            data,
        }
    }
}

/// A file attachment on a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_type: AttachmentType,
    #[serde(default)]
    pub mimetype: Option<String>,
    pub data: Option<Vec<u8>>,
    pub filename: Option<String>,
}

impl Attachment {
    /// Whether this attachment looks like a CSV file (by MIME type or extension).
    pub fn is_csv(&self) -> bool {
        let by_mime = self
            .mimetype
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("text/csv"));
        let by_name = self
            .filename
            .as_deref()
            .is_some_and(|n| n.to_ascii_lowercase().ends_with(".csv"));
        by_mime || by_name
    }
}

/// Supported attachment types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttachmentType {
    Image,
    Document,
    Audio,
    Video,
    Other,
}

/// A shared contact card (vCard).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactCard {
    pub display_name: Option<String>,
    pub vcard: String,
}

impl ContactCard {
    /// The `FN:` value, falling back to the card's display name.
    pub fn name(&self) -> Option<String> {
        self.vcard
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.eq_ignore_ascii_case("FN").then(|| value.trim().to_string())
            })
            .filter(|n| !n.is_empty())
            .or_else(|| self.display_name.clone())
    }

    /// Digits of the first `TEL` entry, or of a number inside the display name.
    pub fn phone_digits(&self) -> Option<String> {
        let from_tel = self.vcard.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.to_ascii_uppercase();
            if key == "TEL" || key.starts_with("TEL;") {
                // waid=... carries the canonical number; the visible value may be formatted.
                let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
                Some(digits)
            } else {
                None
            }
        });
        from_tel.filter(|d| !d.is_empty()).or_else(|| {
            let name = self.display_name.as_deref()?;
            let digits: String = name
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            (!digits.is_empty()).then_some(digits)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(vcard: &str, display: Option<&str>) -> ContactCard {
        ContactCard {
            display_name: display.map(str::to_string),
            vcard: vcard.to_string(),
        }
    }

    #[test]
    fn test_contact_card_parses_vcard() {
        let c = card(
            "BEGIN:VCARD\nVERSION:3.0\nFN:Jane Doe\nTEL;type=CELL;waid=254712345678:+254 712 345 678\nEND:VCARD",
            None,
        );
        assert_eq!(c.name().as_deref(), Some("Jane Doe"));
        assert_eq!(c.phone_digits().as_deref(), Some("254712345678"));
    }

    #[test]
    fn test_contact_card_falls_back_to_display_name() {
        let c = card("BEGIN:VCARD\nEND:VCARD", Some("Shop 0712345678"));
        assert_eq!(c.name().as_deref(), Some("Shop 0712345678"));
        assert_eq!(c.phone_digits().as_deref(), Some("0712345678"));
    }

    #[test]
    fn test_contact_card_without_number() {
        let c = card("BEGIN:VCARD\nFN:Nobody\nEND:VCARD", Some("Nobody"));
        assert!(c.phone_digits().is_none());
    }

    #[test]
    fn test_attachment_is_csv() {
        let by_name = Attachment {
            file_type: AttachmentType::Document,
            mimetype: Some("application/octet-stream".into()),
            data: None,
            filename: Some("Contacts.CSV".into()),
        };
        assert!(by_name.is_csv());

        let by_mime = Attachment {
            file_type: AttachmentType::Document,
            mimetype: Some("text/csv".into()),
            data: None,
            filename: None,
        };
        assert!(by_mime.is_csv());

        let pdf = Attachment {
            file_type: AttachmentType::Document,
            mimetype: Some("application/pdf".into()),
            data: None,
            filename: Some("a.pdf".into()),
        };
        assert!(!pdf.is_csv());
    }
}
