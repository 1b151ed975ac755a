//! The two job kinds: registration checks and templated broadcasts.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use wacast_core::{error::WacastError, phone, traits::Messenger};

use crate::{
    cast::CastBook,
    checkpoint::{JobKind, WorkItem},
    ledger::Ledger,
    runner::{ItemOperation, Outcome, Progress},
};

/// Replace `{name}` in `template` with `name`.
pub fn render_template(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

fn progress_line(label: &str, p: &Progress) -> String {
    format!(
        "⏳ {label}: {}/{} ({} ok, {} rejected, {} errors, {} skipped)",
        p.position,
        p.total,
        p.summary.succeeded,
        p.summary.rejected,
        p.summary.errored,
        p.summary.skipped_already_handled
    )
}

/// Checks each number for WhatsApp registration.
pub struct VerifyNumbers {
    messenger: Arc<dyn Messenger>,
    progress: Option<mpsc::UnboundedSender<String>>,
}

impl VerifyNumbers {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self {
            messenger,
            progress: None,
        }
    }

    /// Send progress lines to `tx` (usually forwarded to the requesting chat).
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.progress = Some(tx);
        self
    }
}

#[async_trait]
impl ItemOperation for VerifyNumbers {
    fn kind(&self) -> JobKind {
        JobKind::VerifyNumbers
    }

    fn is_handled(&self, ledger: &Ledger, item: &WorkItem) -> bool {
        ledger.is_verified(&item.normalized_key) || ledger.is_rejected(&item.normalized_key)
    }

    async fn apply(&self, item: &WorkItem) -> Result<Outcome, WacastError> {
        let existence = self
            .messenger
            .check_exists(&phone::jid(&item.normalized_key))
            .await?;
        debug!(
            "verify: {} exists={}",
            item.normalized_key, existence.exists
        );
        Ok(if existence.exists {
            Outcome::Succeeded
        } else {
            Outcome::Rejected
        })
    }

    fn record(&self, ledger: &mut Ledger, item: &WorkItem, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded => ledger.mark_verified(&item.normalized_key, &item.display_name),
            Outcome::Rejected => ledger.mark_rejected(&item.normalized_key, &item.display_name),
        }
    }

    async fn on_progress(&self, progress: &Progress) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(progress_line("Checking numbers", progress));
        }
    }
}

/// Sends a templated message to each contact once.
pub struct BroadcastMessage {
    messenger: Arc<dyn Messenger>,
    template: String,
    cast_book: Option<Arc<CastBook>>,
    progress: Option<mpsc::UnboundedSender<String>>,
}

impl BroadcastMessage {
    pub fn new(messenger: Arc<dyn Messenger>, template: impl Into<String>) -> Self {
        Self {
            messenger,
            template: template.into(),
            cast_book: None,
            progress: None,
        }
    }

    /// Also flag delivered contacts as greeted in the cast book.
    pub fn with_cast_book(mut self, book: Arc<CastBook>) -> Self {
        self.cast_book = Some(book);
        self
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

#[async_trait]
impl ItemOperation for BroadcastMessage {
    fn kind(&self) -> JobKind {
        JobKind::BroadcastMessage
    }

    fn is_handled(&self, ledger: &Ledger, item: &WorkItem) -> bool {
        ledger.is_notified(&item.normalized_key)
    }

    async fn apply(&self, item: &WorkItem) -> Result<Outcome, WacastError> {
        let jid = phone::jid(&item.normalized_key);
        let text = render_template(&self.template, &item.display_name);
        if let Err(e) = self.messenger.send_typing(&jid).await {
            debug!("broadcast: typing indicator failed for {jid}: {e}");
        }
        self.messenger.send_text(&jid, &text).await?;
        if let Some(book) = &self.cast_book {
            if let Err(e) = book.mark_sent(&item.normalized_key) {
                tracing::warn!("broadcast: cast book update failed: {e}");
            }
        }
        Ok(Outcome::Succeeded)
    }

    fn record(&self, ledger: &mut Ledger, item: &WorkItem, _outcome: Outcome) {
        ledger.mark_notified(&item.normalized_key);
    }

    async fn on_progress(&self, progress: &Progress) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(progress_line("Broadcasting", progress));
        }
    }
}
