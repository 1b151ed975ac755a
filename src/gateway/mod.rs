//! Gateway: the event loop connecting the WhatsApp channel to the command
//! handlers, the dashboard, and the keepalive loop.

pub mod keepalive;
pub mod uploads;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use wacast_core::{
    config::Config,
    message::{IncomingMessage, OutgoingMessage},
    phone::PhoneNormalizer,
    traits::{Channel, Messenger},
};
use wacast_jobs::{
    cast::CastBook, BatchRunner, CheckpointStore, JobRegistry, LedgerStore, RunnerConfig,
};

use crate::api::{self, ApiState};
use crate::commands::{self, Command, CommandContext};
use keepalive::KeepaliveStats;
use uploads::{Offer, UploadWaiter};

/// Build the batch runner over `{data_dir}/jobs`.
pub fn build_runner(config: &Config, data_dir: &Path) -> BatchRunner {
    let jobs_dir = data_dir.join("jobs");
    BatchRunner::new(
        CheckpointStore::new(&jobs_dir),
        Arc::new(LedgerStore::new(jobs_dir.join("ledger.json"))),
        Arc::new(JobRegistry::new()),
        RunnerConfig::from(&config.jobs),
    )
}

/// Path of the cast book CSV.
pub fn cast_book_path(data_dir: &Path) -> PathBuf {
    data_dir.join("casted_contacts.csv")
}

/// The gateway: owns the channel and every shared service.
pub struct Gateway {
    config: Config,
    channel: Arc<dyn Channel>,
    messenger: Arc<dyn Messenger>,
    runner: Arc<BatchRunner>,
    cast_book: Arc<CastBook>,
    normalizer: PhoneNormalizer,
    uploads: UploadWaiter,
    keepalive: Arc<KeepaliveStats>,
    http: reqwest::Client,
    data_dir: PathBuf,
    uptime: Instant,
}

impl Gateway {
    pub fn new(
        config: Config,
        channel: Arc<dyn Channel>,
        messenger: Arc<dyn Messenger>,
        data_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let normalizer = PhoneNormalizer::new(&config.wacast.default_country_code)?;
        let runner = Arc::new(build_runner(&config, &data_dir));
        let cast_book = Arc::new(CastBook::new(cast_book_path(&data_dir)));
        Ok(Self {
            config,
            channel,
            messenger,
            runner,
            cast_book,
            normalizer,
            uploads: UploadWaiter::new(),
            keepalive: Arc::new(KeepaliveStats::new()),
            http: reqwest::Client::new(),
            data_dir,
            uptime: Instant::now(),
        })
    }

    /// Run the main event loop until Ctrl-C.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "wacast gateway running | channel: {} | prefix: {} | data: {}",
            self.channel.name(),
            self.config.wacast.prefix,
            self.data_dir.display()
        );

        self.report_saved_jobs();

        let mut rx = self
            .channel
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start channel {}: {e}", self.channel.name()))?;
        info!("Channel started: {}", self.channel.name());

        // Spawn HTTP dashboard.
        let api_handle = if self.config.api.enabled {
            let api_cfg = self.config.api.clone();
            let state = ApiState {
                bot_name: self.config.wacast.name.clone(),
                owner_name: self.config.wacast.owner_name.clone(),
                uptime: self.uptime,
                keepalive: self.keepalive.clone(),
                runner: self.runner.clone(),
                api_key: Some(self.config.api.api_key.clone()).filter(|k| !k.is_empty()),
            };
            Some(tokio::spawn(async move {
                api::serve(api_cfg, state).await;
            }))
        } else {
            None
        };

        // Spawn keepalive loop. Pointless without the dashboard to answer it.
        let keepalive_handle = if self.config.keepalive.enabled && self.config.api.enabled {
            let client = self.http.clone();
            let base_url = self.config.api.base_url();
            let interval = self.config.keepalive.interval_secs;
            Some(tokio::spawn(async move {
                keepalive::keepalive_loop(client, base_url, interval).await;
            }))
        } else {
            None
        };

        // Main event loop with graceful shutdown.
        loop {
            tokio::select! {
                incoming = rx.recv() => {
                    let Some(incoming) = incoming else {
                        warn!("channel closed, shutting down");
                        break;
                    };
                    let gw = self.clone();
                    tokio::spawn(async move {
                        gw.dispatch_message(incoming).await;
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown(&[api_handle, keepalive_handle]).await;
        Ok(())
    }

    /// Log jobs that were interrupted by the previous run.
    fn report_saved_jobs(&self) {
        for kind in wacast_jobs::JobKind::ALL {
            if let Some(cp) = self.runner.checkpoints().load(kind) {
                if cp.is_resumable() {
                    info!(
                        "saved {kind} job at {}/{} can be resumed",
                        cp.current_index,
                        cp.items.len()
                    );
                }
            }
        }
    }

    /// Route a message: hand uploads to a waiting command, else run it as a command.
    async fn dispatch_message(self: Arc<Self>, incoming: IncomingMessage) {
        match self.uploads.offer(&incoming) {
            Offer::Delivered => return,
            Offer::NotCsv => {
                self.reply(&incoming, "⚠️ Please send a valid CSV file.".to_string())
                    .await;
                return;
            }
            Offer::NotWaiting => {}
        }

        let Some(cmd) = Command::parse(&incoming.text, &self.config.wacast.prefix) else {
            debug!("ignoring non-command message from {}", incoming.sender_id);
            return;
        };
        info!("command {cmd:?} from {}", incoming.sender_id);

        if let Some(target) = incoming.reply_target.as_deref() {
            if let Err(e) = self.channel.send_typing(target).await {
                debug!("typing indicator failed: {e}");
            }
        }

        let ctx = CommandContext {
            config: &self.config,
            channel: &self.channel,
            messenger: &self.messenger,
            runner: &self.runner,
            cast_book: &self.cast_book,
            normalizer: &self.normalizer,
            uploads: &self.uploads,
            keepalive: &self.keepalive,
            http: &self.http,
            data_dir: &self.data_dir,
            uptime: &self.uptime,
            message: &incoming,
        };
        let response = commands::handle(cmd, &ctx).await;
        if !response.is_empty() {
            self.reply(&incoming, response).await;
        }
    }

    async fn reply(&self, incoming: &IncomingMessage, text: String) {
        let msg = OutgoingMessage {
            text,
            document: None,
            reply_target: incoming.reply_target.clone(),
        };
        if let Err(e) = self.channel.send(msg).await {
            warn!("failed to send reply to {}: {e}", incoming.sender_id);
        }
    }

    /// Graceful shutdown: stop jobs (their checkpoints stay resumable), abort
    /// background tasks, stop the channel.
    async fn shutdown(&self, handles: &[Option<tokio::task::JoinHandle<()>>]) {
        info!("Shutting down...");

        let stopped = self.runner.registry().stop_all();
        if !stopped.is_empty() {
            info!("stopping running jobs: {stopped:?}");
            // Give runners a moment to persist their cursor.
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }

        for h in handles.iter().flatten() {
            h.abort();
        }

        if let Err(e) = self.channel.stop().await {
            warn!("failed to stop channel {}: {e}", self.channel.name());
        }

        info!("Shutdown complete.");
    }
}
