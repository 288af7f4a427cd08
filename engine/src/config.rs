//! Engine configuration with TOML file support.

use crate::EngineError;
use oxpool_types::Amount;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which storage backend holds the tracked records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Files,
    Sqlite,
}

/// Configuration for the oxpool core engine.
///
/// Can be loaded from a TOML file via [`EngineConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the daemon's unix command socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Data directory for tracked records, blocks, leases and journals.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Storage backend for tracked records.
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Full block reward. The daemon's reward schedule can change, so this
    /// is configuration rather than a constant.
    #[serde(default = "default_reward")]
    pub reward: Amount,

    /// Address count requested from the node on a routine gather.
    #[serde(default = "default_gather_limit")]
    pub gather_limit: u64,

    /// Effectively unbounded address count, used for full gathers and the
    /// first gather on a fresh install.
    #[serde(default = "default_gather_unbounded_limit")]
    pub gather_unbounded_limit: u64,

    /// TTL of the operation locks; a crashed holder's lock is considered
    /// abandoned after this many seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: i64,

    /// Re-inspection backoff for addresses whose found block is recent,
    /// giving the downstream payout process time to act.
    #[serde(default = "default_inspect_backoff_secs")]
    pub inspect_backoff_secs: i64,

    /// Found blocks younger than this get the re-inspection backoff.
    #[serde(default = "default_recent_found_secs")]
    pub recent_found_secs: i64,

    /// Stop inspecting addresses first seen more than this many days ago.
    #[serde(default = "default_inspect_cutoff_days")]
    pub inspect_cutoff_days: i64,

    /// Addresses seeded into the store on a fresh install.
    #[serde(default)]
    pub extra_accounts: Vec<String>,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_socket_path() -> PathBuf {
    PathBuf::from("./client/unix_sock.dat")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./oxpool_data")
}

fn default_backend() -> StorageBackend {
    StorageBackend::Files
}

fn default_reward() -> Amount {
    Amount::from_coins(1024)
}

fn default_gather_limit() -> u64 {
    100
}

fn default_gather_unbounded_limit() -> u64 {
    10_000_000_000
}

fn default_lock_ttl_secs() -> i64 {
    300
}

fn default_inspect_backoff_secs() -> i64 {
    600
}

fn default_recent_found_secs() -> i64 {
    86_400
}

fn default_inspect_cutoff_days() -> i64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("EngineConfig is always serializable to TOML")
    }

    /// Inspect cutoff expressed in seconds.
    pub fn inspect_cutoff_secs(&self) -> i64 {
        self.inspect_cutoff_days * 86_400
    }

    /// Path of the SQLite database file inside the data directory.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("core.db")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            data_dir: default_data_dir(),
            backend: default_backend(),
            reward: default_reward(),
            gather_limit: default_gather_limit(),
            gather_unbounded_limit: default_gather_unbounded_limit(),
            lock_ttl_secs: default_lock_ttl_secs(),
            inspect_backoff_secs: default_inspect_backoff_secs(),
            recent_found_secs: default_recent_found_secs(),
            inspect_cutoff_days: default_inspect_cutoff_days(),
            extra_accounts: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = EngineConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = EngineConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.reward, config.reward);
        assert_eq!(parsed.gather_limit, config.gather_limit);
        assert_eq!(parsed.backend, StorageBackend::Files);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.reward, Amount::from_coins(1024));
        assert_eq!(config.gather_limit, 100);
        assert_eq!(config.inspect_backoff_secs, 600);
        assert_eq!(config.inspect_cutoff_days, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            backend = "sqlite"
            reward = "512.000000000"
            inspect_cutoff_days = 10
            extra_accounts = ["gKNRtSL1pUaTpzMuPMznKw49ILtP6qX3"]
        "#;
        let config = EngineConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.backend, StorageBackend::Sqlite);
        assert_eq!(config.reward, Amount::from_coins(512));
        assert_eq!(config.inspect_cutoff_days, 10);
        assert_eq!(config.extra_accounts.len(), 1);
        assert_eq!(config.gather_limit, 100); // default
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = EngineConfig::from_toml_file("/nonexistent/oxpool.toml");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
