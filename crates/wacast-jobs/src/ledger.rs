//! The contact ledger: which numbers are verified, rejected, or already notified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::Mutex,
};
use tracing::warn;
use wacast_core::error::WacastError;

use crate::persist::write_json_atomic;

/// Durable outcome record keyed by normalized phone number.
///
/// A key sits in at most one of `verified_set` / `rejected_set`; the last
/// recorded outcome wins. `notified_set` only grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    #[serde(default)]
    pub verified_set: BTreeSet<String>,
    #[serde(default)]
    pub rejected_set: BTreeSet<String>,
    #[serde(default)]
    pub notified_set: BTreeSet<String>,
    #[serde(default)]
    pub display_names: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            verified_set: BTreeSet::new(),
            rejected_set: BTreeSet::new(),
            notified_set: BTreeSet::new(),
            display_names: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl Ledger {
    pub fn mark_verified(&mut self, key: &str, name: &str) {
        self.rejected_set.remove(key);
        self.verified_set.insert(key.to_string());
        self.remember_name(key, name);
    }

    pub fn mark_rejected(&mut self, key: &str, name: &str) {
        self.verified_set.remove(key);
        self.rejected_set.insert(key.to_string());
        self.remember_name(key, name);
    }

    pub fn mark_notified(&mut self, key: &str) {
        self.notified_set.insert(key.to_string());
    }

    pub fn is_verified(&self, key: &str) -> bool {
        self.verified_set.contains(key)
    }

    pub fn is_rejected(&self, key: &str) -> bool {
        self.rejected_set.contains(key)
    }

    pub fn is_notified(&self, key: &str) -> bool {
        self.notified_set.contains(key)
    }

    /// Known display name, or the key itself.
    pub fn name_of<'a>(&'a self, key: &'a str) -> &'a str {
        self.display_names.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Verified contacts as `(name, key)` pairs, ordered by key.
    pub fn verified_contacts(&self) -> Vec<(String, String)> {
        self.verified_set
            .iter()
            .map(|k| (self.name_of(k).to_string(), k.clone()))
            .collect()
    }

    /// Verified keys that have not been notified yet.
    pub fn pending_notification(&self) -> Vec<(String, String)> {
        self.verified_contacts()
            .into_iter()
            .filter(|(_, k)| !self.is_notified(k))
            .collect()
    }

    fn remember_name(&mut self, key: &str, name: &str) {
        let name = name.trim();
        if !name.is_empty() && name != key {
            self.display_names.insert(key.to_string(), name.to_string());
        }
    }
}

/// File-backed ledger with serialized read-modify-write updates.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read the ledger from disk for display. Missing or unreadable → empty.
    pub fn load(&self) -> Ledger {
        match self.read() {
            Ok(ledger) => ledger.unwrap_or_default(),
            Err(e) => {
                warn!("ledger: {e}");
                Ledger::default()
            }
        }
    }

    /// Strict read. `Ok(None)` when the file is missing or was corrupt (and
    /// has been set aside); `Err` when it exists but cannot be read.
    fn read(&self) -> Result<Option<Ledger>, WacastError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WacastError::Persistence(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )))
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(ledger) => Ok(Some(ledger)),
            Err(e) => {
                let backup = self.path.with_extension("json.corrupt");
                warn!(
                    "ledger: corrupt {} ({e}), moving it to {}",
                    self.path.display(),
                    backup.display()
                );
                std::fs::rename(&self.path, &backup).map_err(|e| {
                    WacastError::Persistence(format!("set aside corrupt ledger: {e}"))
                })?;
                Ok(None)
            }
        }
    }

    /// Read, apply `f`, stamp `last_updated`, and save. Returns the saved ledger.
    ///
    /// A ledger that exists but cannot be read is never overwritten.
    pub fn update<F>(&self, f: F) -> Result<Ledger, WacastError>
    where
        F: FnOnce(&mut Ledger),
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut ledger = self.read()?.unwrap_or_default();
        f(&mut ledger);
        ledger.last_updated = Utc::now();
        write_json_atomic(&self.path, &ledger)?;
        Ok(ledger)
    }
}
