//! Durable per-job-kind progress records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};
use tracing::warn;
use wacast_core::error::WacastError;

use crate::persist::write_json_atomic;

/// The kinds of resumable jobs. At most one job of each kind runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    VerifyNumbers,
    BroadcastMessage,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::VerifyNumbers, JobKind::BroadcastMessage];

    /// Stable identifier, also the checkpoint file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::VerifyNumbers => "verify-numbers",
            JobKind::BroadcastMessage => "broadcast-message",
        }
    }

    /// Short name for chat replies.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::VerifyNumbers => "number check",
            JobKind::BroadcastMessage => "broadcast",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = WacastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verify-numbers" | "verify" | "check" => Ok(JobKind::VerifyNumbers),
            "broadcast-message" | "broadcast" => Ok(JobKind::BroadcastMessage),
            other => Err(WacastError::InputInvalid(format!(
                "unknown job kind '{other}' (expected verify-numbers or broadcast-message)"
            ))),
        }
    }
}

/// One unit of work: a contact to check or message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub display_name: String,
    pub normalized_key: String,
}

impl WorkItem {
    pub fn new(display_name: impl Into<String>, normalized_key: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            normalized_key: normalized_key.into(),
        }
    }
}

/// Persisted job state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub is_active: bool,
    pub items: Vec<WorkItem>,
    /// Index of the next unprocessed item.
    pub current_index: usize,
    pub job_kind: JobKind,
    pub last_active_at: DateTime<Utc>,
    /// Broadcast text captured at start so a resumed job sends the same text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Checkpoint {
    /// A fresh, active checkpoint at index 0.
    pub fn new(job_kind: JobKind, items: Vec<WorkItem>, message: Option<String>) -> Self {
        Self {
            is_active: true,
            items,
            current_index: 0,
            job_kind,
            last_active_at: Utc::now(),
            message,
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.current_index)
    }

    /// Active with items left to process.
    pub fn is_resumable(&self) -> bool {
        self.is_active && !self.items.is_empty()
    }
}

/// Stores one checkpoint file per job kind under a directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, kind: JobKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.as_str()))
    }

    /// Atomically replace the checkpoint for `checkpoint.job_kind`.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), WacastError> {
        write_json_atomic(&self.path(checkpoint.job_kind), checkpoint)
    }

    /// Load the checkpoint for `kind`. Missing, unreadable, or corrupt files yield `None`.
    pub fn load(&self, kind: JobKind) -> Option<Checkpoint> {
        let path = self.path(kind);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("checkpoint: cannot read {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_slice::<Checkpoint>(&raw) {
            Ok(cp) if cp.job_kind != kind => {
                warn!(
                    "checkpoint: {} holds a {} job, ignoring",
                    path.display(),
                    cp.job_kind
                );
                None
            }
            Ok(mut cp) => {
                cp.current_index = cp.current_index.min(cp.items.len());
                Some(cp)
            }
            Err(e) => {
                warn!("checkpoint: corrupt {}: {e}", path.display());
                None
            }
        }
    }

    /// Delete the checkpoint for `kind`. Missing files are fine.
    pub fn clear(&self, kind: JobKind) -> Result<(), WacastError> {
        match std::fs::remove_file(self.path(kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WacastError::Persistence(format!(
                "remove {} checkpoint: {e}",
                kind
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    /// Fresh temp directory unique to this process and call.
    pub(crate) fn temp_dir(tag: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "__wacast_{tag}_{}_{n}__",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new(format!("Contact {i}"), format!("25471234{i:04}")))
            .collect()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = temp_dir("cp_roundtrip");
        let store = CheckpointStore::new(&dir);
        let mut cp = Checkpoint::new(
            JobKind::BroadcastMessage,
            items(3),
            Some("Hi {name}".into()),
        );
        cp.current_index = 2;
        store.save(&cp).unwrap();

        let loaded = store.load(JobKind::BroadcastMessage).unwrap();
        assert_eq!(loaded, cp);
        assert!(store.load(JobKind::VerifyNumbers).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_json_field_names() {
        let cp = Checkpoint::new(JobKind::VerifyNumbers, items(1), None);
        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["isActive"], true);
        assert_eq!(json["currentIndex"], 0);
        assert_eq!(json["jobKind"], "verify-numbers");
        assert_eq!(json["items"][0]["normalizedKey"], "254712340000");
        assert_eq!(json["items"][0]["displayName"], "Contact 0");
        assert!(json.get("lastActiveAt").is_some());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_load_corrupt_returns_none() {
        let dir = temp_dir("cp_corrupt");
        let store = CheckpointStore::new(&dir);
        std::fs::write(store.path(JobKind::VerifyNumbers), b"{not json").unwrap();
        assert!(store.load(JobKind::VerifyNumbers).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = temp_dir("cp_missing");
        let store = CheckpointStore::new(&dir);
        assert!(store.load(JobKind::BroadcastMessage).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_clamps_index() {
        let dir = temp_dir("cp_clamp");
        let store = CheckpointStore::new(&dir);
        let mut cp = Checkpoint::new(JobKind::VerifyNumbers, items(2), None);
        cp.current_index = 9;
        store.save(&cp).unwrap();
        assert_eq!(store.load(JobKind::VerifyNumbers).unwrap().current_index, 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_overwrites_and_clear() {
        let dir = temp_dir("cp_clear");
        let store = CheckpointStore::new(&dir);
        let mut cp = Checkpoint::new(JobKind::VerifyNumbers, items(4), None);
        store.save(&cp).unwrap();
        cp.current_index = 3;
        store.save(&cp).unwrap();
        assert_eq!(store.load(JobKind::VerifyNumbers).unwrap().current_index, 3);

        store.clear(JobKind::VerifyNumbers).unwrap();
        assert!(store.load(JobKind::VerifyNumbers).is_none());
        store.clear(JobKind::VerifyNumbers).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_job_kind_parse() {
        assert_eq!("verify".parse::<JobKind>().unwrap(), JobKind::VerifyNumbers);
        assert_eq!(
            "Broadcast-Message".parse::<JobKind>().unwrap(),
            JobKind::BroadcastMessage
        );
        assert!("cast".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_remaining_and_resumable() {
        let mut cp = Checkpoint::new(JobKind::VerifyNumbers, items(5), None);
        cp.current_index = 3;
        assert_eq!(cp.remaining(), 2);
        assert!(cp.is_resumable());
        cp.is_active = false;
        assert!(!cp.is_resumable());
        let empty = Checkpoint::new(JobKind::VerifyNumbers, vec![], None);
        assert!(!empty.is_resumable());
    }
}
