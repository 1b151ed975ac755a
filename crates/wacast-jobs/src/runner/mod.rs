//! Sequential, rate-limited, checkpointed batch processing.
//!
//! A job walks its items one at a time. Before each item the stop signal is
//! checked; after each item the outcome is written to the ledger, and every
//! `flush_every` items the checkpoint cursor is advanced on disk. A crash or
//! stop therefore loses at most `flush_every - 1` cursor steps, and the ledger
//! makes re-processing those items a skip.

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use wacast_core::{config::JobsConfig, error::WacastError};

use crate::{
    checkpoint::{Checkpoint, CheckpointStore, JobKind, WorkItem},
    ledger::{Ledger, LedgerStore},
    registry::{JobLease, JobRegistry, StopSignal},
};

/// Classified result of a successful operation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Number is on WhatsApp / message delivered.
    Succeeded,
    /// Number is not on WhatsApp.
    Rejected,
}

/// Counters for one run (or one resumed slice of a job).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Items the cursor passed, including skips and errors.
    pub processed: usize,
    pub succeeded: usize,
    pub rejected: usize,
    pub errored: usize,
    pub skipped_already_handled: usize,
    pub stopped_early: bool,
}

/// Periodic progress snapshot handed to [`ItemOperation::on_progress`].
#[derive(Debug, Clone)]
pub struct Progress {
    /// 1-based position of the item just processed.
    pub position: usize,
    pub total: usize,
    pub summary: Summary,
}

/// The per-item work of a job kind.
#[async_trait]
pub trait ItemOperation: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Whether the ledger already covers this item.
    fn is_handled(&self, ledger: &Ledger, item: &WorkItem) -> bool;

    /// Do the work for one item.
    async fn apply(&self, item: &WorkItem) -> Result<Outcome, WacastError>;

    /// Write `outcome` into the ledger. Must be idempotent.
    fn record(&self, ledger: &mut Ledger, item: &WorkItem, outcome: Outcome);

    /// Called every `progress_every` processed items.
    async fn on_progress(&self, _progress: &Progress) {}
}

/// Runner tuning, usually built from `[jobs]`.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub flush_every: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub item_timeout: Duration,
    pub progress_every: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for RunnerConfig {
    fn from(jobs: &JobsConfig) -> Self {
        Self {
            flush_every: jobs.flush_every.max(1),
            min_delay: Duration::from_secs(jobs.min_delay_secs),
            max_delay: Duration::from_secs(jobs.max_delay_secs.max(jobs.min_delay_secs)),
            item_timeout: Duration::from_secs(jobs.item_timeout_secs),
            progress_every: jobs.progress_every,
        }
    }
}

impl RunnerConfig {
    /// Uniform random pause in `[min_delay, max_delay]`.
    pub fn pick_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = (self.max_delay.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Rough wall time for `items` items, using the midpoint delay.
    pub fn estimate(&self, items: usize) -> Duration {
        let mid = (self.min_delay + self.max_delay) / 2;
        mid * items.saturating_sub(1) as u32
    }
}

/// Drives jobs against the checkpoint store, ledger, and registry.
pub struct BatchRunner {
    checkpoints: CheckpointStore,
    ledger: Arc<LedgerStore>,
    registry: Arc<JobRegistry>,
    config: RunnerConfig,
}

impl BatchRunner {
    pub fn new(
        checkpoints: CheckpointStore,
        ledger: Arc<LedgerStore>,
        registry: Arc<JobRegistry>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            checkpoints,
            ledger,
            registry,
            config,
        }
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Claim `kind` and write a fresh checkpoint for `items`.
    ///
    /// Fails with `InputInvalid` on an empty list and `AlreadyRunning` when a
    /// job of this kind is in flight. The previous checkpoint is replaced.
    pub fn prepare_start(
        &self,
        kind: JobKind,
        items: Vec<WorkItem>,
        message: Option<String>,
    ) -> Result<(JobLease, Checkpoint), WacastError> {
        if items.is_empty() {
            return Err(WacastError::InputInvalid("no contacts to process".into()));
        }
        let lease = self.registry.acquire(kind)?;
        let checkpoint = Checkpoint::new(kind, items, message);
        self.checkpoints.save(&checkpoint)?;
        info!(
            "{kind}: starting job with {} items",
            checkpoint.items.len()
        );
        Ok((lease, checkpoint))
    }

    /// Claim `kind` and load its saved checkpoint.
    ///
    /// Fails with `NoSavedJob` when the checkpoint is missing, inactive, or empty.
    pub fn prepare_resume(&self, kind: JobKind) -> Result<(JobLease, Checkpoint), WacastError> {
        let lease = self.registry.acquire(kind)?;
        match self.checkpoints.load(kind) {
            Some(cp) if cp.is_resumable() => {
                info!(
                    "{kind}: resuming at {}/{}",
                    cp.current_index,
                    cp.items.len()
                );
                Ok((lease, cp))
            }
            _ => Err(WacastError::NoSavedJob(kind.label().to_string())),
        }
    }

    /// Start a job and run it to completion (or stop) on the current task.
    pub async fn start(
        &self,
        items: Vec<WorkItem>,
        message: Option<String>,
        op: &dyn ItemOperation,
    ) -> Result<Summary, WacastError> {
        let (lease, checkpoint) = self.prepare_start(op.kind(), items, message)?;
        Ok(self.execute(lease, checkpoint, op).await)
    }

    /// Resume the saved job of `op.kind()` on the current task.
    pub async fn resume(&self, op: &dyn ItemOperation) -> Result<Summary, WacastError> {
        let (lease, checkpoint) = self.prepare_resume(op.kind())?;
        Ok(self.execute(lease, checkpoint, op).await)
    }

    /// Run a prepared job while holding its lease.
    pub async fn execute(
        &self,
        lease: JobLease,
        checkpoint: Checkpoint,
        op: &dyn ItemOperation,
    ) -> Summary {
        let summary = self.run(checkpoint, op, lease.signal()).await;
        drop(lease);
        summary
    }

    /// Process `checkpoint.items` from `checkpoint.current_index` onwards.
    pub async fn run(
        &self,
        mut checkpoint: Checkpoint,
        op: &dyn ItemOperation,
        stop: &StopSignal,
    ) -> Summary {
        let kind = checkpoint.job_kind;
        let total = checkpoint.items.len();
        let start = checkpoint.current_index.min(total);
        let mut ledger = self.ledger.load();
        let mut summary = Summary::default();
        let mut since_flush = 0usize;
        checkpoint.is_active = true;

        for i in start..total {
            if stop.is_stopped() {
                checkpoint.current_index = i;
                checkpoint.is_active = true;
                self.persist(&mut checkpoint);
                summary.stopped_early = true;
                info!("{kind}: stopped at {i}/{total}");
                return summary;
            }

            let item = checkpoint.items[i].clone();
            let mut pause = false;

            if op.is_handled(&ledger, &item) {
                summary.skipped_already_handled += 1;
                debug!("{kind}: {} already handled", item.normalized_key);
            } else {
                match tokio::time::timeout(self.config.item_timeout, op.apply(&item)).await {
                    Ok(Ok(outcome)) => {
                        match outcome {
                            Outcome::Succeeded => summary.succeeded += 1,
                            Outcome::Rejected => summary.rejected += 1,
                        }
                        op.record(&mut ledger, &item, outcome);
                        match self.ledger.update(|l| op.record(l, &item, outcome)) {
                            Ok(fresh) => ledger = fresh,
                            Err(e) => warn!("{kind}: ledger write failed, continuing: {e}"),
                        }
                        pause = true;
                    }
                    Ok(Err(e)) => {
                        summary.errored += 1;
                        warn!("{kind}: {} failed: {e}", item.normalized_key);
                    }
                    Err(_) => {
                        summary.errored += 1;
                        warn!(
                            "{kind}: {} timed out after {:?}",
                            item.normalized_key, self.config.item_timeout
                        );
                    }
                }
            }

            summary.processed += 1;
            since_flush += 1;
            if since_flush >= self.config.flush_every {
                checkpoint.current_index = i + 1;
                self.persist(&mut checkpoint);
                since_flush = 0;
            }

            if self.config.progress_every > 0 && summary.processed % self.config.progress_every == 0 {
                op.on_progress(&Progress {
                    position: i + 1,
                    total,
                    summary: summary.clone(),
                })
                .await;
            }

            if pause && i + 1 < total {
                let delay = self.config.pick_delay();
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stop.stopped() => {}
                    }
                }
            }
        }

        checkpoint.current_index = total;
        checkpoint.is_active = false;
        self.persist(&mut checkpoint);
        info!(
            "{kind}: finished: {} processed, {} ok, {} rejected, {} errors, {} skipped",
            summary.processed,
            summary.succeeded,
            summary.rejected,
            summary.errored,
            summary.skipped_already_handled
        );
        summary
    }

    fn persist(&self, checkpoint: &mut Checkpoint) {
        checkpoint.last_active_at = chrono::Utc::now();
        if let Err(e) = self.checkpoints.save(checkpoint) {
            warn!(
                "{}: checkpoint write failed, continuing: {e}",
                checkpoint.job_kind
            );
        }
    }
}
