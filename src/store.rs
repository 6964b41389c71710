//! Persisted history and account slots
//!
//! The history slot holds records oldest-first. Callers only ever see the
//! newest-first view; every write reverses it back before persisting.

use crate::error::{HistoryError, Result};
use crate::model::{HistoryRecord, UserAccount};
use crate::storage::LocalStorage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered collection of history records backed by one storage slot.
///
/// One in-memory view is materialized at `open` and every mutation
/// read-modify-writes that view.
pub struct HistoryStore {
    storage: Arc<dyn LocalStorage>,
    slot: String,
    /// Newest-first
    view: Vec<HistoryRecord>,
}

impl HistoryStore {
    /// Open the store and load the slot
    pub fn open(storage: Arc<dyn LocalStorage>, slot: impl Into<String>) -> Self {
        let mut store = Self {
            storage,
            slot: slot.into(),
            view: Vec::new(),
        };
        store.load();
        store
    }

    /// Re-read the slot, replacing the in-memory view.
    ///
    /// Missing or malformed data yields an empty history; the failure is
    /// logged and never returned.
    pub fn load(&mut self) -> &[HistoryRecord] {
        let mut records = self.read_slot();
        records.reverse();
        self.view = records;
        &self.view
    }

    fn read_slot(&self) -> Vec<HistoryRecord> {
        let text = match self.storage.get_item(&self.slot) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(slot = %self.slot, "History slot empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(slot = %self.slot, error = %e, "Failed to read history slot");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<HistoryRecord>>(&text) {
            Ok(records) => {
                debug!(slot = %self.slot, count = records.len(), "Loaded history");
                records
            }
            Err(e) => {
                warn!(slot = %self.slot, error = %e, "Failed to parse history, treating as empty");
                Vec::new()
            }
        }
    }

    /// Newest-first view
    pub fn records(&self) -> &[HistoryRecord] {
        &self.view
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryRecord> {
        self.view.iter().find(|r| r.id == id)
    }

    /// Add a newly completed record; it becomes the newest entry
    pub fn append(&mut self, record: HistoryRecord) -> Result<()> {
        if self.get(&record.id).is_some() {
            return Err(HistoryError::DuplicateRecord(record.id));
        }

        let mut next = Vec::with_capacity(self.view.len() + 1);
        next.push(record);
        next.extend(self.view.iter().cloned());

        self.persist(&next)?;
        debug!(id = %next[0].id, "Appended history record");
        self.view = next;
        Ok(())
    }

    /// Remove a record by id and return the updated newest-first view.
    ///
    /// An unknown id issues no write and returns the view unchanged.
    pub fn remove(&mut self, id: &str) -> Result<&[HistoryRecord]> {
        if self.get(id).is_none() {
            debug!(id, "Remove requested for unknown record");
            return Ok(&self.view);
        }

        let next: Vec<HistoryRecord> = self.view.iter().filter(|r| r.id != id).cloned().collect();
        self.persist(&next)?;
        info!(id, remaining = next.len(), "Removed history record");
        self.view = next;
        Ok(&self.view)
    }

    /// Write a newest-first view back to the slot oldest-first
    fn persist(&self, newest_first: &[HistoryRecord]) -> Result<()> {
        let oldest_first: Vec<&HistoryRecord> = newest_first.iter().rev().collect();
        let text = serde_json::to_string(&oldest_first)?;
        self.storage.set_item(&self.slot, &text)
    }
}

/// Case-insensitive substring filter over title or subject.
///
/// An empty query matches everything; input order is preserved.
pub fn search<'a>(query: &str, records: &'a [HistoryRecord]) -> Vec<&'a HistoryRecord> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return records.iter().collect();
    }
    records.iter().filter(|r| r.matches_lowercase(&needle)).collect()
}

/// Local copy of the signed-in account
pub struct AccountStore {
    storage: Arc<dyn LocalStorage>,
    slot: String,
}

impl AccountStore {
    pub fn new(storage: Arc<dyn LocalStorage>, slot: impl Into<String>) -> Self {
        Self {
            storage,
            slot: slot.into(),
        }
    }

    /// Read the stored account; unreadable data is logged and yields `None`
    pub fn load(&self) -> Option<UserAccount> {
        let text = match self.storage.get_item(&self.slot) {
            Ok(text) => text?,
            Err(e) => {
                warn!(slot = %self.slot, error = %e, "Failed to read account slot");
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(account) => Some(account),
            Err(e) => {
                warn!(slot = %self.slot, error = %e, "Failed to parse stored account");
                None
            }
        }
    }

    pub fn save(&self, account: &UserAccount) -> Result<()> {
        let text = serde_json::to_string(account)?;
        self.storage.set_item(&self.slot, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentCategory, Role};
    use crate::storage::MemoryStorage;
    use chrono::{TimeZone, Utc};

    const SLOT: &str = "lesson_history";

    fn record(id: &str, title: &str, subject: &str) -> HistoryRecord {
        HistoryRecord::new(
            id,
            ContentCategory::Lesson,
            title,
            subject,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn ids(records: &[HistoryRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn stored_ids(storage: &MemoryStorage) -> Vec<String> {
        let text = storage.get_item(SLOT).unwrap().unwrap();
        let records: Vec<HistoryRecord> = serde_json::from_str(&text).unwrap();
        records.into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_missing_slot_is_empty() {
        let store = HistoryStore::open(Arc::new(MemoryStorage::new()), SLOT);
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_slot_is_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(SLOT, "{not json").unwrap();

        let store = HistoryStore::open(storage.clone(), SLOT);
        assert!(store.is_empty());
        // Bad data is left for inspection, not overwritten
        assert_eq!(storage.get_item(SLOT).unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn test_load_reverses_storage_order() {
        let storage = Arc::new(MemoryStorage::new());
        let oldest_first = vec![record("a", "A", "S"), record("b", "B", "S"), record("c", "C", "S")];
        storage
            .set_item(SLOT, &serde_json::to_string(&oldest_first).unwrap())
            .unwrap();

        let store = HistoryStore::open(storage, SLOT);
        assert_eq!(ids(store.records()), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_append_keeps_oldest_first_on_disk() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = HistoryStore::open(storage.clone(), SLOT);

        store.append(record("a", "A", "S")).unwrap();
        store.append(record("b", "B", "S")).unwrap();
        store.append(record("c", "C", "S")).unwrap();

        assert_eq!(ids(store.records()), vec!["c", "b", "a"]);
        assert_eq!(stored_ids(&storage), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_append_rejects_duplicate_id() {
        let mut store = HistoryStore::open(Arc::new(MemoryStorage::new()), SLOT);
        store.append(record("a", "A", "S")).unwrap();

        let err = store.append(record("a", "Again", "S")).unwrap_err();
        assert!(matches!(err, HistoryError::DuplicateRecord(id) if id == "a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_persists_reversed() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = HistoryStore::open(storage.clone(), SLOT);
        for id in ["a", "b", "c", "d"] {
            store.append(record(id, id, "S")).unwrap();
        }

        let view = store.remove("b").unwrap();
        assert_eq!(ids(view), vec!["d", "c", "a"]);
        assert_eq!(stored_ids(&storage), vec!["a", "c", "d"]);

        // A fresh load sees the same newest-first order
        let reloaded = HistoryStore::open(storage, SLOT);
        assert_eq!(ids(reloaded.records()), vec!["d", "c", "a"]);
    }

    #[test]
    fn test_remove_unknown_id_leaves_bytes_unchanged() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = HistoryStore::open(storage.clone(), SLOT);
        store.append(record("a", "A", "S")).unwrap();
        store.append(record("b", "B", "S")).unwrap();

        let before = storage.get_item(SLOT).unwrap();
        let view = store.remove("missing").unwrap();
        assert_eq!(ids(view), vec!["b", "a"]);
        assert_eq!(storage.get_item(SLOT).unwrap(), before);
    }

    #[test]
    fn test_search() {
        let records = vec![
            record("1", "Newton's Laws", "Physics"),
            record("2", "Organic Bonds", "Chemistry"),
            record("3", "Kinematics", "physics"),
        ];

        let hits: Vec<&str> = search("newton", &records).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(hits, vec!["1"]);

        let hits: Vec<&str> = search("PHYS", &records).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(hits, vec!["1", "3"]);

        assert_eq!(search("", &records).len(), 3);
        assert!(search("biology", &records).is_empty());
    }

    #[test]
    fn test_account_store() {
        let storage = Arc::new(MemoryStorage::new());
        let accounts = AccountStore::new(storage.clone(), "current_user");
        assert!(accounts.load().is_none());

        let account = UserAccount::new("u1", Role::Student, 4);
        accounts.save(&account).unwrap();
        assert_eq!(accounts.load(), Some(account));

        storage.set_item("current_user", "null?").unwrap();
        assert!(accounts.load().is_none());
    }
}
