//! # wacast-jobs
//!
//! Resumable batch processing: checkpoints, the contact ledger, the job
//! registry, the batch runner, and the operations it drives.

pub mod cast;
pub mod checkpoint;
pub mod ledger;
pub mod ops;
mod persist;
pub mod registry;
pub mod runner;

pub use checkpoint::{Checkpoint, CheckpointStore, JobKind, WorkItem};
pub use ledger::{Ledger, LedgerStore};
pub use registry::{JobLease, JobRegistry, StopSignal};
pub use runner::{BatchRunner, ItemOperation, Outcome, Progress, RunnerConfig, Summary};
