mod api;
mod commands;
mod gateway;

use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use wacast_channels::whatsapp::WhatsAppBridge;
use wacast_core::{
    config::{self, Config},
    phone::{self, PhoneNormalizer},
    traits::{Channel, Messenger},
};
use wacast_jobs::{
    cast::CastBook,
    ops::{BroadcastMessage, VerifyNumbers},
    ItemOperation, JobKind,
};

#[derive(Parser)]
#[command(
    name = "wacast",
    version,
    about = "WhatsApp number checker and broadcaster with resumable jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "WACAST_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot.
    Start,
    /// Show configuration and saved job state.
    Status,
    /// Check one number against WhatsApp.
    Check {
        /// Phone number in local or international format.
        number: String,
    },
    /// Resume a saved job from the terminal.
    Resume {
        /// `verify-numbers` or `broadcast-message`.
        kind: JobKind,
    },
}

/// Install stderr logging, plus a daily-rolling file under `log_dir` when given.
///
/// `RUST_LOG` wins over `level`. The returned guard must outlive the program.
fn init_logging(level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "wacast.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter()),
        )
        .with(file_layer)
        .init();

    guard
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    let cfg = config::load(path)?;
    config::validate(&cfg)?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    let data_dir = config::ensure_layout(&cfg.wacast.data_dir);

    match cli.command {
        Commands::Start => {
            let _guard = init_logging(&cfg.wacast.log_level, Some(&data_dir.join("logs")));

            if !cfg.whatsapp.enabled {
                anyhow::bail!("WhatsApp is disabled. Enable [whatsapp] in config.toml.");
            }
            let bridge = Arc::new(WhatsAppBridge::new(cfg.whatsapp.clone()));
            let channel: Arc<dyn Channel> = bridge.clone();
            let messenger: Arc<dyn Messenger> = bridge;

            println!("wacast: starting {}...", cfg.wacast.name);
            let gw = Arc::new(gateway::Gateway::new(cfg, channel, messenger, data_dir)?);
            gw.run().await?;
        }
        Commands::Status => {
            let _guard = init_logging(&cfg.wacast.log_level, None);
            print_status(&cli.config, &cfg, &data_dir);
        }
        Commands::Check { number } => {
            let _guard = init_logging(&cfg.wacast.log_level, None);
            let normalizer = PhoneNormalizer::new(&cfg.wacast.default_country_code)?;
            let Some(key) = normalizer.normalize(&number) else {
                anyhow::bail!("invalid phone number: {number}");
            };
            let bridge = WhatsAppBridge::new(cfg.whatsapp.clone());
            let existence = bridge.check_exists(&phone::jid(&key)).await?;
            println!(
                "{key}: {}",
                if existence.exists {
                    "registered on WhatsApp"
                } else {
                    "not on WhatsApp"
                }
            );
        }
        Commands::Resume { kind } => {
            let _guard = init_logging(&cfg.wacast.log_level, Some(&data_dir.join("logs")));
            resume_in_terminal(&cfg, &data_dir, kind).await?;
        }
    }

    Ok(())
}

fn print_status(config_path: &str, cfg: &Config, data_dir: &Path) {
    println!("wacast: status\n");
    println!("Config: {config_path}");
    println!("Data dir: {}", data_dir.display());
    println!("Bridge: {}", cfg.whatsapp.bridge_url);
    println!("Country code: {}", cfg.wacast.default_country_code);
    println!(
        "Delay: {}-{}s, flush every {} items",
        cfg.jobs.min_delay_secs, cfg.jobs.max_delay_secs, cfg.jobs.flush_every
    );
    println!(
        "Dashboard: {}",
        if cfg.api.enabled {
            cfg.api.base_url()
        } else {
            "disabled".to_string()
        }
    );
    println!();

    let runner = gateway::build_runner(cfg, data_dir);
    for kind in JobKind::ALL {
        match runner.checkpoints().load(kind) {
            Some(cp) => println!(
                "  {kind}: {}/{} ({}), last active {}",
                cp.current_index,
                cp.items.len(),
                if cp.is_resumable() { "resumable" } else { "finished" },
                cp.last_active_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => println!("  {kind}: no saved job"),
        }
    }

    let ledger = runner.ledger().load();
    println!();
    println!(
        "  ledger: {} verified, {} rejected, {} notified",
        ledger.verified_set.len(),
        ledger.rejected_set.len(),
        ledger.notified_set.len()
    );
}

/// Resume `kind` with progress on stdout. Ctrl-C stops it at the next item.
async fn resume_in_terminal(cfg: &Config, data_dir: &Path, kind: JobKind) -> anyhow::Result<()> {
    let runner = gateway::build_runner(cfg, data_dir);
    let messenger: Arc<dyn Messenger> = Arc::new(WhatsAppBridge::new(cfg.whatsapp.clone()));
    let (lease, checkpoint) = runner.prepare_resume(kind)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("{line}");
        }
    });

    let op: Box<dyn ItemOperation> = match kind {
        JobKind::VerifyNumbers => Box::new(VerifyNumbers::new(messenger).with_progress(tx)),
        JobKind::BroadcastMessage => {
            let template = checkpoint
                .message
                .clone()
                .unwrap_or_else(|| cfg.broadcast.message.clone());
            let book = Arc::new(CastBook::new(gateway::cast_book_path(data_dir)));
            Box::new(
                BroadcastMessage::new(messenger, template)
                    .with_cast_book(book)
                    .with_progress(tx),
            )
        }
    };

    let signal = lease.signal().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("stopping after the current item...");
            signal.stop();
        }
    });

    println!(
        "resuming {kind} at {}/{}",
        checkpoint.current_index,
        checkpoint.items.len()
    );
    let summary = runner.execute(lease, checkpoint, op.as_ref()).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
