//! Process configuration
//!
//! Resolution order: built-in defaults, then the JSON file named by
//! `VWAP_CONFIG` (if set), then individual `VWAP_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::simulation::ProducerConfig;

pub const CONFIG_PATH_ENV: &str = "VWAP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration for the VWAP engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VwapConfig {
    /// Instruments to track; one calculator each
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,

    /// Market places the simulator produces ticks for
    #[serde(default = "default_market_places")]
    pub market_places: Vec<String>,

    /// Interval between ticks per (instrument, market place) pair
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Tokio worker threads
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Grace period for producer tasks on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub producer: ProducerConfig,
}

impl Default for VwapConfig {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            market_places: default_market_places(),
            update_interval_ms: default_update_interval_ms(),
            worker_threads: default_worker_threads(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            producer: ProducerConfig::default(),
        }
    }
}

// Default value functions for serde
fn default_instruments() -> Vec<String> {
    vec!["OIL".to_string(), "GOLD".to_string(), "GRAIN".to_string()]
}

fn default_market_places() -> Vec<String> {
    vec!["NYSE".to_string(), "NASDAQ".to_string(), "AMEX".to_string()]
}

fn default_update_interval_ms() -> u64 {
    1000
}

fn default_worker_threads() -> usize {
    3
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

impl VwapConfig {
    /// Load from `VWAP_CONFIG` and environment overrides, then validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Apply `VWAP_*` overrides read through `lookup`
    ///
    /// `lookup` is injected so tests do not have to touch process env.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VWAP_INSTRUMENTS") {
            self.instruments = split_list(&value);
        }
        if let Some(value) = lookup("VWAP_MARKET_PLACES") {
            self.market_places = split_list(&value);
        }
        if let Some(value) = lookup("VWAP_UPDATE_INTERVAL_MS") {
            self.update_interval_ms = parse_env("VWAP_UPDATE_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("VWAP_WORKER_THREADS") {
            self.worker_threads = parse_env("VWAP_WORKER_THREADS", &value)?;
        }
        if let Some(value) = lookup("VWAP_SHUTDOWN_TIMEOUT_SECS") {
            self.shutdown_timeout_secs = parse_env("VWAP_SHUTDOWN_TIMEOUT_SECS", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("at least one instrument is required".to_string()));
        }
        if let Some(blank) = self.instruments.iter().find(|i| i.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("blank instrument {:?}", blank)));
        }
        if self.market_places.is_empty() {
            return Err(ConfigError::Invalid("at least one market place is required".to_string()));
        }
        if self.update_interval_ms == 0 {
            return Err(ConfigError::Invalid("update_interval_ms must be > 0".to_string()));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be > 0".to_string()));
        }
        self.producer.validate().map_err(ConfigError::Invalid)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = VwapConfig::default();
        assert_eq!(config.instruments, vec!["OIL", "GOLD", "GRAIN"]);
        assert_eq!(config.market_places, vec!["NYSE", "NASDAQ", "AMEX"]);
        assert_eq!(config.update_interval_ms, 1000);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.shutdown_timeout_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"instruments": ["BTC"], "update_interval_ms": 250}}"#).unwrap();

        let config = VwapConfig::from_file(file.path()).unwrap();
        assert_eq!(config.instruments, vec!["BTC"]);
        assert_eq!(config.update_interval_ms, 250);
        assert_eq!(config.market_places, vec!["NYSE", "NASDAQ", "AMEX"]);
        assert_eq!(config.producer, ProducerConfig::default());
    }

    #[test]
    fn test_from_file_errors() {
        let missing = VwapConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let bad = VwapConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(bad, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VWAP_INSTRUMENTS", "EURUSD, XAUUSD ,,"),
            ("VWAP_UPDATE_INTERVAL_MS", "50"),
            ("VWAP_WORKER_THREADS", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = VwapConfig::default();
        config
            .apply_env_overrides(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.instruments, vec!["EURUSD", "XAUUSD"]);
        assert_eq!(config.update_interval_ms, 50);
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.shutdown_timeout_secs, 5);
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut config = VwapConfig::default();
        let err = config
            .apply_env_overrides(|var| (var == "VWAP_WORKER_THREADS").then(|| "many".to_string()))
            .unwrap_err();

        assert_eq!(err.to_string(), r#"Invalid value for VWAP_WORKER_THREADS: "many""#);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = VwapConfig::default();
        config.instruments.clear();
        assert!(config.validate().is_err());

        let mut config = VwapConfig::default();
        config.instruments.push("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = VwapConfig::default();
        config.update_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = VwapConfig::default();
        config.worker_threads = 0;
        assert!(config.validate().is_err());

        let mut config = VwapConfig::default();
        config.producer.min_bid_price = 200.0;
        assert!(config.validate().is_err());
    }
}
