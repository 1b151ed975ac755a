//! Keepalive: ping our own `/ping` endpoint so free-tier hosts don't idle us.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Ping counters, shared by the dashboard and the keepalive loop.
#[derive(Debug, Default)]
pub struct KeepaliveStats {
    count: AtomicU64,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl KeepaliveStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one received ping.
    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn last_ping(&self) -> Option<DateTime<Utc>> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Ping `{base_url}/ping` every `interval_secs`. Runs until aborted.
///
/// The dashboard counts the ping when it answers, so this loop only logs.
pub async fn keepalive_loop(client: reqwest::Client, base_url: String, interval_secs: u64) {
    let url = format!("{}/ping", base_url.trim_end_matches('/'));
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // The first tick fires immediately; skip it so the server has time to bind.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match client
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => debug!("keepalive: pinged {url}"),
            Ok(resp) => warn!("keepalive: {url} answered {}", resp.status()),
            Err(e) => warn!("keepalive: ping to {url} failed: {e}"),
        }
    }
}

/// Format a duration as `1d 2h 3m 4s`.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{}d {}h {}m {}s",
        secs / 86_400,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
