//! Configuration for lesson-history

use crate::error::{HistoryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lesson-history")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the local storage slots
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Slot holding the history records (oldest-first)
    #[serde(default = "default_history_slot")]
    pub history_slot: String,

    /// Slot holding the current user account
    #[serde(default = "default_user_slot")]
    pub user_slot: String,

    /// System settings consulted by the access gate
    #[serde(default)]
    pub settings: SystemSettings,

    /// Remote account sync; disabled when absent
    #[serde(default)]
    pub sync: Option<SyncConfig>,
}

fn default_history_slot() -> String {
    "lesson_history".to_string()
}

fn default_user_slot() -> String {
    "current_user".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            history_slot: default_history_slot(),
            user_slot: default_user_slot(),
            settings: SystemSettings::default(),
            sync: None,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| HistoryError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| HistoryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get config file path inside the storage directory
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

/// System-wide settings.
///
/// Absent settings resolve to the defaults, so a missing `[settings]`
/// table behaves like `mcq_history_cost = 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    /// Credits charged to reopen a gated record from history
    #[serde(default = "default_mcq_history_cost", alias = "mcq_history_cost")]
    pub mcq_history_cost: i64,
}

fn default_mcq_history_cost() -> i64 {
    1
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            mcq_history_cost: default_mcq_history_cost(),
        }
    }
}

impl SystemSettings {
    /// Effective cost in credits; non-positive values mean free
    pub fn resolved_cost(&self) -> u32 {
        self.mcq_history_cost.clamp(0, u32::MAX as i64) as u32
    }
}

/// Remote account sync endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the account service
    pub base_url: String,

    /// Optional bearer token
    #[serde(default)]
    pub api_key: Option<String>,
}
