//! Upload waiter: lets a command pause until the user sends a CSV file.
//!
//! A command subscribes for its chat, the gateway offers every inbound
//! document to the waiter before command dispatch, and the subscription is
//! released when it is dropped, whatever path the command took.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use wacast_core::{
    error::WacastError,
    message::{Attachment, IncomingMessage},
};

/// Where a subscription is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    AwaitingUpload,
    Processing,
    Done,
    TimedOut,
}

/// What [`UploadWaiter::offer`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Nobody in this chat is waiting, or the message has no document.
    NotWaiting,
    /// The document was handed to the waiting command.
    Delivered,
    /// A document arrived but it is not a CSV; the waiter keeps waiting.
    NotCsv,
}

type Waiting = Arc<Mutex<HashMap<String, mpsc::Sender<Attachment>>>>;

/// Per-chat registry of commands waiting for an upload.
#[derive(Default)]
pub struct UploadWaiter {
    waiting: Waiting,
}

/// Chat key used for routing: the reply target, falling back to the sender.
pub fn chat_of(message: &IncomingMessage) -> &str {
    message
        .reply_target
        .as_deref()
        .unwrap_or(&message.sender_id)
}

impl UploadWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a file in `chat`. Only one wait per chat.
    pub fn subscribe(&self, chat: &str) -> Result<UploadSubscription, WacastError> {
        let mut waiting = self.waiting.lock().unwrap_or_else(|e| e.into_inner());
        if waiting.contains_key(chat) {
            return Err(WacastError::InputInvalid(
                "already waiting for a file in this chat".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(1);
        waiting.insert(chat.to_string(), tx);
        debug!("upload waiter: subscribed {chat}");
        Ok(UploadSubscription {
            chat: chat.to_string(),
            rx,
            state: UploadState::AwaitingUpload,
            waiting: self.waiting.clone(),
        })
    }

    pub fn is_waiting(&self, chat: &str) -> bool {
        self.waiting
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(chat)
    }

    /// Route a document message to the command waiting in its chat.
    pub fn offer(&self, message: &IncomingMessage) -> Offer {
        let Some(doc) = message.document() else {
            return Offer::NotWaiting;
        };
        let chat = chat_of(message);
        let waiting = self.waiting.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = waiting.get(chat) else {
            return Offer::NotWaiting;
        };
        if !doc.is_csv() {
            return Offer::NotCsv;
        }
        match tx.try_send(doc.clone()) {
            Ok(()) => {
                info!("upload waiter: file received in {chat}");
                Offer::Delivered
            }
            // A file is already queued for this wait; the second one is ignored.
            Err(_) => Offer::NotWaiting,
        }
    }
}

/// A pending wait. Dropping it unsubscribes the chat.
pub struct UploadSubscription {
    chat: String,
    rx: mpsc::Receiver<Attachment>,
    state: UploadState,
    waiting: Waiting,
}

impl UploadSubscription {
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Wait up to `timeout` for a CSV upload.
    ///
    /// Moves to `Processing` on delivery, `TimedOut` otherwise.
    pub async fn wait(&mut self, timeout: Duration) -> Option<Attachment> {
        if self.state != UploadState::AwaitingUpload {
            return None;
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(file)) => {
                self.state = UploadState::Processing;
                Some(file)
            }
            _ => {
                info!("upload waiter: {} timed out", self.chat);
                self.state = UploadState::TimedOut;
                None
            }
        }
    }

    /// Mark the delivered file as handled.
    pub fn finish(&mut self) {
        if self.state == UploadState::Processing {
            self.state = UploadState::Done;
        }
    }
}

impl Drop for UploadSubscription {
    fn drop(&mut self) {
        self.waiting
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.chat);
        debug!("upload waiter: released {}", self.chat);
    }
}
