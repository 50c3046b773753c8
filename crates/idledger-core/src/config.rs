//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Identity ledger engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the JSON snapshots
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Snapshot scheduling
    #[serde(default)]
    pub auto_save: AutoSaveConfig,

    /// Funded account that deploys the identity contract and relays its
    /// transactions. Defaults to the first genesis account.
    #[serde(default)]
    pub operator: Option<String>,

    /// Address of an already deployed identity contract to reattach to
    #[serde(default)]
    pub contract_address: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            auto_save: AutoSaveConfig::default(),
            operator: None,
            contract_address: None,
        }
    }
}

/// Auto-save configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    /// Enable periodic and save-on-write snapshots
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Periodic save interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Request a save after every mutating operation
    #[serde(default = "default_true")]
    pub save_on_write: bool,
}

impl AutoSaveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            save_on_write: true,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("data/blockchain")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.storage_dir, PathBuf::from("data/blockchain"));
        assert!(config.auto_save.enabled);
        assert_eq!(config.auto_save.interval_secs, 300);
        assert!(config.operator.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"auto_save": {"interval_secs": 5}}"#).unwrap();
        assert_eq!(config.auto_save.interval(), Duration::from_secs(5));
        assert!(config.auto_save.save_on_write);
        assert_eq!(config.storage_dir, PathBuf::from("data/blockchain"));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = AutoSaveConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(1));
    }
}
