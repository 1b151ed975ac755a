mod channels;
mod defaults;

#[cfg(test)]
mod tests;

pub use channels::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::WacastError;
use defaults::*;

/// Top-level wacast configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wacast: WacastConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
}

/// General bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WacastConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_owner_name")]
    pub owner_name: String,
    /// Owner's phone number. Owner-only commands (broadcasts, cast book
    /// maintenance) are accepted from this sender and from the bot's own chat.
    #[serde(default)]
    pub owner_number: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Command prefix (e.g. `.` for `.wacheck`).
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Country code applied to local-format numbers. Digits only, no `+`.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

impl Default for WacastConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            owner_name: default_owner_name(),
            owner_number: String::new(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            prefix: default_prefix(),
            default_country_code: default_country_code(),
        }
    }
}

/// Batch job settings shared by bulk checks and broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Persist the checkpoint every N processed items.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// Lower bound of the randomized pause between items.
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,
    /// Upper bound of the randomized pause between items.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Hard limit on a single check or send.
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,
    /// Send a chat progress update every N processed items.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            flush_every: default_flush_every(),
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            item_timeout_secs: default_item_timeout_secs(),
            progress_every: default_progress_every(),
        }
    }
}

/// Message templates. `{name}` is replaced by the contact's display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_broadcast_message")]
    pub message: String,
    /// One-shot greeting sent to contacts added through shared contact cards.
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            message: default_broadcast_message(),
            greeting: default_greeting(),
        }
    }
}

/// CSV upload handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// How long `thecsv` / `csvfile` wait for the user's upload.
    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,
    /// Cap on files downloaded from URLs (`wacheckurl`, `wavalidcsv`).
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_upload_timeout_secs(),
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

/// Status dashboard server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Externally reachable base URL (e.g. `https://bot.example.com`).
    /// Empty = derived from host and port.
    #[serde(default)]
    pub public_url: String,
    /// Bearer token for `/api/jobs`. Empty = no auth (for local-only use).
    #[serde(default)]
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
            public_url: String::new(),
            api_key: String::new(),
        }
    }
}

impl ApiConfig {
    /// The URL users and the keepalive loop should hit.
    pub fn base_url(&self) -> String {
        if self.public_url.is_empty() {
            format!("http://{}:{}", self.host, self.port)
        } else {
            self.public_url.trim_end_matches('/').to_string()
        }
    }
}

/// Self-ping loop that keeps free-tier hosts from idling the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keepalive_interval")]
    pub interval_secs: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_keepalive_interval(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Create the `jobs/`, `logs/`, and `uploads/` subdirectories under the data dir.
///
/// Returns the expanded data directory.
pub fn ensure_layout(data_dir: &str) -> PathBuf {
    let base = PathBuf::from(shellexpand(data_dir));
    for sub in &["jobs", "logs", "uploads"] {
        if let Err(e) = std::fs::create_dir_all(base.join(sub)) {
            warn!("failed to create {}/{sub}: {e}", base.display());
        }
    }
    base
}

/// Apply environment overrides through `lookup` (usually `std::env::var`).
///
/// `WACAST_BRIDGE_TOKEN`, `WACAST_API_KEY`, and `PORT` win over the file.
pub fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup("WACAST_BRIDGE_TOKEN") {
        config.whatsapp.bridge_token = token;
    }
    if let Some(key) = lookup("WACAST_API_KEY") {
        config.api.api_key = key;
    }
    if let Some(port) = lookup("PORT") {
        match port.parse::<u16>() {
            Ok(p) => config.api.port = p,
            Err(e) => warn!("ignoring invalid PORT '{port}': {e}"),
        }
    }
}

/// Reject settings the rest of the bot relies on being sane.
pub fn validate(config: &Config) -> Result<(), WacastError> {
    let jobs = &config.jobs;
    if jobs.flush_every == 0 {
        return Err(WacastError::Config("jobs.flush_every must be at least 1".into()));
    }
    if jobs.min_delay_secs > jobs.max_delay_secs {
        return Err(WacastError::Config(format!(
            "jobs.min_delay_secs ({}) exceeds jobs.max_delay_secs ({})",
            jobs.min_delay_secs, jobs.max_delay_secs
        )));
    }
    if jobs.item_timeout_secs == 0 {
        return Err(WacastError::Config("jobs.item_timeout_secs must be at least 1".into()));
    }
    let whatsapp = &config.whatsapp;
    if whatsapp.request_timeout_secs == 0 {
        return Err(WacastError::Config(
            "whatsapp.request_timeout_secs must be at least 1".into(),
        ));
    }
    // A send cut off mid-retry may still land without being recorded.
    let budget = whatsapp.send_budget();
    if Duration::from_secs(jobs.item_timeout_secs) < budget {
        return Err(WacastError::Config(format!(
            "jobs.item_timeout_secs ({}) is shorter than one bridge send with retries ({}s); \
             raise it or lower whatsapp.request_timeout_secs",
            jobs.item_timeout_secs,
            budget.as_secs_f64().ceil() as u64
        )));
    }
    if config.wacast.prefix.is_empty() {
        return Err(WacastError::Config("wacast.prefix must not be empty".into()));
    }
    crate::phone::PhoneNormalizer::new(&config.wacast.default_country_code)?;
    Ok(())
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Environment overrides
/// are applied either way.
pub fn load(path: &str) -> Result<Config, WacastError> {
    let path = Path::new(path);
    let mut config = if !path.exists() {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    } else {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WacastError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| WacastError::Config(format!("failed to parse config: {}", e)))?
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}
