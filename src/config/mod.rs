// src/config/mod.rs
// Central configuration for the sync daemon and CLI.

pub mod duration;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};

/// Per-entity cache staleness TTLs (§6.2), stored as the raw duration
/// strings so `config path` / `config get` can round-trip the exact text
/// the user wrote, with parsed milliseconds available via `*_ms()`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStalenessConfig {
    pub peers: Option<String>,
    pub dialogs: Option<String>,
    #[serde(rename = "fullInfo")]
    pub full_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    pub staleness: CacheStalenessConfig,
    #[serde(rename = "backgroundRefresh")]
    pub background_refresh: Option<bool>,
    #[serde(rename = "maxCacheAge")]
    pub max_cache_age: Option<String>,
}

/// `config.json` contents (§6.2).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(rename = "activeAccount")]
    pub active_account: Option<i64>,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::General(e.to_string()))?;
        let parsed: Self = serde_json::from_str(&raw)
            .map_err(|e| CoreError::InvalidArgs(format!("config.json: {e}")))?;
        parsed.validate_strict()?;
        Ok(parsed)
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::General(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|e| CoreError::General(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| CoreError::General(e.to_string()))?;
        Ok(())
    }

    /// Strict-mode validation: collects every offending duration path into
    /// one config error instead of failing on the first bad value.
    pub fn validate_strict(&self) -> CoreResult<()> {
        let mut offending = Vec::new();
        let candidates: [(&str, &Option<String>); 4] = [
            ("cache.staleness.peers", &self.cache.staleness.peers),
            ("cache.staleness.dialogs", &self.cache.staleness.dialogs),
            ("cache.staleness.fullInfo", &self.cache.staleness.full_info),
            ("cache.maxCacheAge", &self.cache.max_cache_age),
        ];
        for (path, value) in candidates {
            if let Some(v) = value {
                if duration::parse_duration(v).is_err() {
                    offending.push(path.to_string());
                }
            }
        }
        if offending.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidArgs(format!(
                "invalid duration values at: {}",
                offending.join(", ")
            )))
        }
    }
}

/// Resolved runtime config: env-derived remote credentials plus the parsed
/// file config, composed the way the teacher's `MiraConfig` composes its
/// domain sub-configs from env and defaults.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub verbose: bool,
    pub file: FileConfig,
}

impl RuntimeConfig {
    pub fn load() -> CoreResult<Self> {
        let data_dir = data_dir();
        let file = FileConfig::load(&data_dir.join("config.json"))?;
        Ok(Self {
            data_dir,
            api_id: std::env::var("TELEGRAM_API_ID").ok(),
            api_hash: std::env::var("TELEGRAM_API_HASH").ok(),
            verbose: std::env::var("VERBOSE").map(|v| v == "1").unwrap_or(false),
            file,
        })
    }

    pub fn accounts_db_path(&self) -> PathBuf {
        self.data_dir.join("accounts.db")
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    pub fn session_db_path(&self, account_id: i64) -> PathBuf {
        self.data_dir.join(format!("session_{account_id}.db"))
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.data_dir.join("daemon.pid")
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

/// `$TELEGRAM_SYNC_CLI_DATA_DIR` override, default `$HOME/.telegram-sync-cli`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TELEGRAM_SYNC_CLI_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".telegram-sync-cli")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_validation_collects_all_offenders() {
        let cfg = FileConfig {
            active_account: None,
            cache: CacheConfig {
                staleness: CacheStalenessConfig {
                    peers: Some("bad".into()),
                    dialogs: Some("5m".into()),
                    full_info: Some("also-bad".into()),
                },
                background_refresh: None,
                max_cache_age: None,
            },
        };
        let err = cfg.validate_strict().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cache.staleness.peers"));
        assert!(msg.contains("cache.staleness.fullInfo"));
        assert!(!msg.contains("cache.staleness.dialogs"));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(FileConfig::default().validate_strict().is_ok());
    }
}
