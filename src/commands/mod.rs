//! Chat commands. Each handler returns the reply text; an empty reply means
//! the handler already answered (documents, multi-part replies).

mod broadcast;
mod cast;
mod check;
mod contacts;
mod status;


use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;
use wacast_core::{
    config::Config,
    error::WacastError,
    message::{Document, IncomingMessage, OutgoingMessage},
    phone::PhoneNormalizer,
    traits::{Channel, Messenger},
};
use wacast_jobs::{
    cast::CastBook, BatchRunner, Checkpoint, ItemOperation, JobKind, JobLease, Summary,
};

use crate::gateway::{keepalive::KeepaliveStats, uploads::UploadWaiter};

/// Everything a command handler may touch, borrowed from the gateway.
pub struct CommandContext<'a> {
    pub config: &'a Config,
    pub channel: &'a Arc<dyn Channel>,
    pub messenger: &'a Arc<dyn Messenger>,
    pub runner: &'a Arc<BatchRunner>,
    pub cast_book: &'a Arc<CastBook>,
    pub normalizer: &'a PhoneNormalizer,
    pub uploads: &'a UploadWaiter,
    pub keepalive: &'a KeepaliveStats,
    pub http: &'a reqwest::Client,
    pub data_dir: &'a Path,
    pub uptime: &'a Instant,
    pub message: &'a IncomingMessage,
}

/// Known bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    WaCheck,
    WaCheckUrl,
    WaResume,
    WaBroadcast,
    WaBroadcastResume,
    WaStop,
    WaBroadcastInfo,
    WaList,
    WaValidCsv,
    TheCsv,
    CsvFile,
    CastedCsv,
    CastBroadcast,
    CastClear,
    CastExport,
    KeepAlive,
    KeepAliveUrl,
    WebUrl,
    CmdList,
    WaCmds,
    Help,
}

impl Command {
    /// Parse a command from message text. Returns `None` when the text does
    /// not start with `prefix` or names no known command.
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let body = text.trim_start().strip_prefix(prefix)?;
        let word = body.split_whitespace().next()?.to_ascii_lowercase();
        match word.as_str() {
            "wacheck" => Some(Self::WaCheck),
            "wacheckurl" => Some(Self::WaCheckUrl),
            "waresume" => Some(Self::WaResume),
            "wabroadcast" => Some(Self::WaBroadcast),
            "wabroadcastresume" => Some(Self::WaBroadcastResume),
            "wastop" => Some(Self::WaStop),
            "wabroadcastinfo" => Some(Self::WaBroadcastInfo),
            "walist" => Some(Self::WaList),
            "wavalidcsv" => Some(Self::WaValidCsv),
            "thecsv" => Some(Self::TheCsv),
            "csvfile" => Some(Self::CsvFile),
            "castedcsv" => Some(Self::CastedCsv),
            "castbroadcast" => Some(Self::CastBroadcast),
            "castclear" => Some(Self::CastClear),
            "castexport" => Some(Self::CastExport),
            "keepalive" => Some(Self::KeepAlive),
            "keepaliveurl" => Some(Self::KeepAliveUrl),
            "weburl" => Some(Self::WebUrl),
            "cmdlist" => Some(Self::CmdList),
            "wacmds" => Some(Self::WaCmds),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Whether only the owner (or the bot's own chat) may run this.
    pub fn owner_only(self) -> bool {
        matches!(
            self,
            Self::WaBroadcast
                | Self::WaBroadcastResume
                | Self::CastBroadcast
                | Self::CastClear
                | Self::CastExport
        )
    }
}

/// Text after the command word, trimmed. Keeps line breaks for bulk input.
fn command_args<'t>(text: &'t str, prefix: &str) -> &'t str {
    let body = text.trim_start();
    let body = body.strip_prefix(prefix).unwrap_or(body);
    let word_end = body.find(char::is_whitespace).unwrap_or(body.len());
    body[word_end..].trim()
}

/// Deliver `text` to `target`, logging failures.
async fn deliver(channel: &dyn Channel, target: Option<String>, text: String) {
    let msg = OutgoingMessage {
        text,
        document: None,
        reply_target: target,
    };
    if let Err(e) = channel.send(msg).await {
        warn!("failed to send reply: {e}");
    }
}

impl CommandContext<'_> {
    pub fn args(&self) -> &str {
        command_args(&self.message.text, &self.config.wacast.prefix)
    }

    pub fn prefix(&self) -> &str {
        &self.config.wacast.prefix
    }

    /// The owner's chat, or a sender matching `owner_number`.
    pub fn is_owner(&self) -> bool {
        if self.message.from_me {
            return true;
        }
        let owner = &self.config.wacast.owner_number;
        !owner.is_empty()
            && self.normalizer.normalize(owner).as_deref() == Some(self.message.sender_id.as_str())
    }

    /// Send an extra text message to the requesting chat.
    pub async fn say(&self, text: impl Into<String>) {
        deliver(
            self.channel.as_ref(),
            self.message.reply_target.clone(),
            text.into(),
        )
        .await;
    }

    /// Send a document to the requesting chat.
    pub async fn send_document(&self, document: Document) -> Result<(), WacastError> {
        self.channel
            .send(OutgoingMessage {
                text: String::new(),
                document: Some(document),
                reply_target: self.message.reply_target.clone(),
            })
            .await
    }

    /// A sender whose lines are forwarded to this chat until it is dropped.
    pub fn progress_sink(&self) -> mpsc::UnboundedSender<String> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let channel = self.channel.clone();
        let target = self.message.reply_target.clone();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                deliver(channel.as_ref(), target.clone(), line).await;
            }
        });
        tx
    }

    /// Run a prepared job in the background and report its summary here.
    pub fn spawn_job(
        &self,
        lease: JobLease,
        checkpoint: Checkpoint,
        op: Box<dyn ItemOperation>,
    ) -> tokio::task::JoinHandle<Summary> {
        let runner = self.runner.clone();
        let channel = self.channel.clone();
        let target = self.message.reply_target.clone();
        let prefix = self.prefix().to_string();
        let kind = lease.kind();
        tokio::spawn(async move {
            let summary = runner.execute(lease, checkpoint, op.as_ref()).await;
            deliver(
                channel.as_ref(),
                target,
                format_summary(kind, &summary, &prefix),
            )
            .await;
            summary
        })
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.config.uploads.timeout_secs)
    }

    pub fn item_timeout(&self) -> Duration {
        self.runner.config().item_timeout
    }
}

/// Handle a command and return the response text.
pub async fn handle(cmd: Command, ctx: &CommandContext<'_>) -> String {
    if cmd.owner_only() && !ctx.is_owner() {
        return "❌ Only the bot owner can use this command.".to_string();
    }
    match cmd {
        Command::WaCheck => check::handle_wacheck(ctx).await,
        Command::WaCheckUrl => check::handle_wacheckurl(ctx).await,
        Command::WaResume => check::handle_waresume(ctx),
        Command::WaBroadcast => broadcast::handle_wabroadcast(ctx),
        Command::WaBroadcastResume => broadcast::handle_wabroadcastresume(ctx),
        Command::WaStop => broadcast::handle_wastop(ctx),
        Command::WaBroadcastInfo => broadcast::handle_wabroadcastinfo(ctx),
        Command::WaList => contacts::handle_walist(ctx).await,
        Command::WaValidCsv => contacts::handle_wavalidcsv(ctx).await,
        Command::TheCsv => contacts::handle_thecsv(ctx).await,
        Command::CsvFile => contacts::handle_csvfile(ctx).await,
        Command::CastedCsv => cast::handle_castedcsv(ctx).await,
        Command::CastBroadcast => cast::handle_castbroadcast(ctx),
        Command::CastClear => cast::handle_castclear(ctx),
        Command::CastExport => cast::handle_castexport(ctx).await,
        Command::KeepAlive => status::handle_keepalive(ctx),
        Command::KeepAliveUrl => status::handle_keepaliveurl(ctx),
        Command::WebUrl => status::handle_weburl(ctx),
        Command::CmdList => status::handle_cmdlist(ctx.args(), ctx.prefix()),
        Command::WaCmds => status::handle_wacmds(ctx.prefix()),
        Command::Help => status::handle_help(ctx.args(), ctx.prefix()),
    }
}

/// User-facing text for an error.
fn describe_error(e: &WacastError, prefix: &str) -> String {
    match e {
        WacastError::AlreadyRunning(label) => {
            format!("⚠️ A {label} is already running. Use *{prefix}wastop* to stop it.")
        }
        WacastError::NoSavedJob(label) => format!("ℹ️ There is no saved {label} to resume."),
        WacastError::InputInvalid(msg) => format!("❌ {msg}"),
        other => format!("❌ {other}"),
    }
}

/// Final report for a finished or stopped job.
fn format_summary(kind: JobKind, s: &Summary, prefix: &str) -> String {
    let (ok_label, rejected_label, resume) = match kind {
        JobKind::VerifyNumbers => ("Registered", "Not registered", "waresume"),
        JobKind::BroadcastMessage => ("Sent", "Rejected", "wabroadcastresume"),
    };
    let header = if s.stopped_early {
        format!("⏸️ *{} stopped*", capitalize(kind.label()))
    } else {
        format!("✅ *{} complete*", capitalize(kind.label()))
    };
    let mut out = format!(
        "{header}\n\n\
         • Processed: *{}*\n\
         • {ok_label}: *{}*\n",
        s.processed, s.succeeded
    );
    if kind == JobKind::VerifyNumbers {
        out.push_str(&format!("• {rejected_label}: *{}*\n", s.rejected));
    }
    out.push_str(&format!(
        "• Errors: *{}*\n\
         • Already done: *{}*",
        s.errored, s.skipped_already_handled
    ));
    if s.stopped_early {
        out.push_str(&format!(
            "\n\nProgress is saved. Use *{prefix}{resume}* to continue."
        ));
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human-friendly rough duration: `2h 5m`, `3m 20s`, `45s`.
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Fetch `url` with a 30s timeout, refusing bodies over `max_bytes`.
async fn download(
    http: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<Vec<u8>, WacastError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(WacastError::InputInvalid(format!(
            "not an http(s) URL: {url}"
        )));
    }
    let mut resp = http
        .get(url)
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .map_err(|e| WacastError::Http(format!("download failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(WacastError::Http(format!(
            "download failed: server answered {}",
            resp.status()
        )));
    }
    let too_large = || WacastError::Http(format!("file is larger than {} KB", max_bytes / 1024));
    if resp.content_length().is_some_and(|len| len > max_bytes as u64) {
        return Err(too_large());
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| WacastError::Http(format!("download interrupted: {e}")))?
    {
        body.extend_from_slice(&chunk);
        if body.len() > max_bytes {
            return Err(too_large());
        }
    }
    Ok(body)
}
