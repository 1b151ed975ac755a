//! The cast book: contacts added by sharing a contact card, stored as CSV.
//!
//! Columns: `Name,Phone Number,WhatsApp Status,Message Sent`.

use std::{path::PathBuf, sync::Mutex};
use wacast_core::{csv_codec, error::WacastError};

use crate::checkpoint::WorkItem;

pub const HEADERS: [&str; 4] = ["Name", "Phone Number", "WhatsApp Status", "Message Sent"];

const REGISTERED: &str = "Registered";
const NOT_REGISTERED: &str = "Not Registered";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastEntry {
    pub name: String,
    pub key: String,
    pub registered: bool,
    pub message_sent: bool,
}

impl CastEntry {
    fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.key.clone(),
            if self.registered { REGISTERED } else { NOT_REGISTERED }.to_string(),
            if self.message_sent { "Yes" } else { "No" }.to_string(),
        ]
    }
}

/// Result of adding a contact card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Added,
    /// Already present; the stored entry is returned.
    Existing(CastEntry),
}

/// CSV-backed address book. All access is serialized.
#[derive(Debug)]
pub struct CastBook {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CastBook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> Result<Vec<CastEntry>, WacastError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let table = csv_codec::decode(&bytes)?;
        Ok(table
            .rows
            .iter()
            .filter(|row| !table.cell(row, 1).is_empty())
            .map(|row| CastEntry {
                name: table.cell(row, 0).to_string(),
                key: table.cell(row, 1).to_string(),
                registered: table.cell(row, 2).eq_ignore_ascii_case(REGISTERED),
                message_sent: table.cell(row, 3).eq_ignore_ascii_case("yes"),
            })
            .collect())
    }

    fn write(&self, entries: &[CastEntry]) -> Result<(), WacastError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let bytes = self.encode(entries)?;
        let tmp = self.path.with_extension("csv.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn encode(&self, entries: &[CastEntry]) -> Result<Vec<u8>, WacastError> {
        csv_codec::encode(&HEADERS, entries.iter().map(CastEntry::to_row))
    }

    pub fn entries(&self) -> Result<Vec<CastEntry>, WacastError> {
        let _g = self.guard();
        self.read()
    }

    pub fn get(&self, key: &str) -> Result<Option<CastEntry>, WacastError> {
        Ok(self.entries()?.into_iter().find(|e| e.key == key))
    }

    /// Add `entry`, or refresh the registration status of a known number.
    ///
    /// An existing entry keeps its name and sent flag; the entry as it was
    /// before the call is returned.
    pub fn upsert(&self, entry: CastEntry) -> Result<Upsert, WacastError> {
        let _g = self.guard();
        let mut entries = self.read()?;
        if let Some(existing) = entries.iter_mut().find(|e| e.key == entry.key) {
            let before = existing.clone();
            if existing.registered != entry.registered {
                existing.registered = entry.registered;
                self.write(&entries)?;
            }
            return Ok(Upsert::Existing(before));
        }
        entries.push(entry);
        self.write(&entries)?;
        Ok(Upsert::Added)
    }

    /// Flag `key` as greeted. Returns false if the number isn't in the book.
    pub fn mark_sent(&self, key: &str) -> Result<bool, WacastError> {
        let _g = self.guard();
        let mut entries = self.read()?;
        let Some(entry) = entries.iter_mut().find(|e| e.key == key) else {
            return Ok(false);
        };
        entry.message_sent = true;
        self.write(&entries)?;
        Ok(true)
    }

    /// Registered contacts not greeted yet, as work items.
    pub fn pending(&self) -> Result<Vec<WorkItem>, WacastError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.registered && !e.message_sent)
            .map(|e| WorkItem::new(e.name, e.key))
            .collect())
    }

    /// Reset to a header-only file.
    pub fn clear(&self) -> Result<(), WacastError> {
        let _g = self.guard();
        self.write(&[])
    }

    /// Current book as CSV bytes (header-only when empty).
    pub fn export(&self) -> Result<Vec<u8>, WacastError> {
        let _g = self.guard();
        let entries = self.read()?;
        self.encode(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::tests::temp_dir;

    fn entry(name: &str, key: &str, registered: bool) -> CastEntry {
        CastEntry {
            name: name.into(),
            key: key.into(),
            registered,
            message_sent: false,
        }
    }

    #[test]
    fn test_upsert_and_duplicates() {
        let dir = temp_dir("cast_upsert");
        let book = CastBook::new(dir.join("casted_contacts.csv"));
        assert!(book.entries().unwrap().is_empty());

        assert_eq!(
            book.upsert(entry("Doe, Jane", "254700000001", true)).unwrap(),
            Upsert::Added
        );
        match book.upsert(entry("Other", "254700000001", false)).unwrap() {
            Upsert::Existing(e) => {
                assert_eq!(e.name, "Doe, Jane");
                assert!(e.registered);
            }
            Upsert::Added => panic!("duplicate added"),
        }
        let entries = book.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Doe, Jane");
        assert!(!entries[0].registered, "registration is refreshed");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_file_format() {
        let dir = temp_dir("cast_format");
        let book = CastBook::new(dir.join("casted_contacts.csv"));
        book.upsert(entry("Doe, Jane", "254700000001", true)).unwrap();
        book.upsert(entry("Bob", "254700000002", false)).unwrap();
        book.mark_sent("254700000001").unwrap();

        let text = std::fs::read_to_string(book.path()).unwrap();
        assert_eq!(
            text,
            "Name,Phone Number,WhatsApp Status,Message Sent\n\
             \"Doe, Jane\",254700000001,Registered,Yes\n\
             Bob,254700000002,Not Registered,No\n"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_pending_and_mark_sent() {
        let dir = temp_dir("cast_pending");
        let book = CastBook::new(dir.join("casted_contacts.csv"));
        book.upsert(entry("A", "254700000001", true)).unwrap();
        book.upsert(entry("B", "254700000002", false)).unwrap();
        book.upsert(entry("C", "254700000003", true)).unwrap();
        book.mark_sent("254700000003").unwrap();
        assert!(!book.mark_sent("254799999999").unwrap());

        let pending = book.pending().unwrap();
        assert_eq!(pending, vec![WorkItem::new("A", "254700000001")]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_clear_and_export() {
        let dir = temp_dir("cast_clear");
        let book = CastBook::new(dir.join("casted_contacts.csv"));
        book.upsert(entry("A", "254700000001", true)).unwrap();
        book.clear().unwrap();
        assert!(book.entries().unwrap().is_empty());
        assert_eq!(
            book.export().unwrap(),
            b"Name,Phone Number,WhatsApp Status,Message Sent\n".to_vec()
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
