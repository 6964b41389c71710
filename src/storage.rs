//! Named-slot local storage
//!
//! The history and the current account each live in one named slot holding
//! serialized JSON text. Backends are injected so the store and gate can be
//! exercised without touching disk.

use crate::error::{HistoryError, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key/value slot storage, in the spirit of browser `localStorage`.
///
/// Methods take `&self` so one backend can be shared between the history
/// store and the account store.
pub trait LocalStorage: Send + Sync {
    /// Read the slot; `None` when it was never written
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Replace the slot contents
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory slots (tests, ephemeral sessions)
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per slot under a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    root_dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a slot directory
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&root_dir)?;
        debug!(path = %root_dir.display(), "Opened slot directory");
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(HistoryError::Storage(format!("invalid slot key: {:?}", key)));
        }
        Ok(self.root_dir.join(format!("{}.json", key)))
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.slot_path(key)?;
        // Slot is replaced atomically
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, value)?;
        std::fs::rename(&tmp_path, &path)?;
        debug!(slot = key, bytes = value.len(), "Wrote slot");
        Ok(())
    }
}
