use crate::{
    error::WacastError,
    message::{Document, IncomingMessage, OutgoingMessage},
};
use async_trait::async_trait;

/// Messaging channel: inbound and outbound chat traffic.
///
/// The gateway reads commands from [`Channel::start`] and answers through
/// [`Channel::send`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, WacastError>;

    /// Send a response back through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), WacastError>;

    /// Send a typing indicator to show the bot is processing.
    async fn send_typing(&self, _target: &str) -> Result<(), WacastError> {
        Ok(())
    }

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), WacastError>;
}

/// Result of a registration lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Existence {
    pub exists: bool,
    /// JID as reported by WhatsApp (may differ from the one asked about).
    pub jid: String,
}

/// WhatsApp operations used by batch jobs.
///
/// All targets are full JIDs (`{key}@s.whatsapp.net`).
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Ask WhatsApp whether `jid` belongs to a registered account.
    async fn check_exists(&self, jid: &str) -> Result<Existence, WacastError>;

    async fn send_text(&self, jid: &str, text: &str) -> Result<(), WacastError>;

    async fn send_document(&self, jid: &str, document: Document) -> Result<(), WacastError>;

    /// Show "typing…" in the target chat. Best effort.
    async fn send_typing(&self, _jid: &str) -> Result<(), WacastError> {
        Ok(())
    }
}
