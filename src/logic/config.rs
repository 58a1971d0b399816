//! Runtime Configuration
//!
//! Layered: compiled defaults, then an optional JSON config file, then
//! environment variables. A value that fails validation is a startup
//! error, not a silent clamp.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::logic::model::TrainerSettings;
use crate::logic::store::StoreConfig;
use crate::logic::stress::StressThresholds;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Read(String),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read(e) => write!(f, "Cannot read config: {}", e),
            Self::Parse(e) => write!(f, "Cannot parse config: {}", e),
            Self::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// STRUCTURE
// ============================================================================

/// Reconnect backoff shape. Waits grow by `multiplier` per failed
/// attempt and never exceed `max_ms`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectBackoff {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        ReconnectBackoff {
            initial_ms: constants::DEFAULT_BACKOFF_INITIAL_MS,
            max_ms: constants::DEFAULT_BACKOFF_MAX_MS,
            multiplier: constants::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl ReconnectBackoff {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Link endpoints, scanned in priority order
    pub link_candidates: Vec<String>,
    pub link_timeout_ms: u64,
    pub read_interval_ms: u64,
    pub batch_size: usize,
    /// A partial batch is flushed after waiting this long
    pub max_wait_ms: u64,
    pub buffer_capacity: usize,
    pub reconnect_backoff: ReconnectBackoff,
    pub upload_enabled: bool,
    pub store: StoreConfig,
    pub thresholds: StressThresholds,
    pub trainer: TrainerSettings,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            link_candidates: constants::DEFAULT_LINK_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            link_timeout_ms: constants::DEFAULT_LINK_TIMEOUT_MS,
            read_interval_ms: constants::DEFAULT_READ_INTERVAL_MS,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            max_wait_ms: constants::DEFAULT_MAX_WAIT_MS,
            buffer_capacity: constants::DEFAULT_BUFFER_CAPACITY,
            reconnect_backoff: ReconnectBackoff::default(),
            upload_enabled: true,
            store: StoreConfig::default(),
            thresholds: StressThresholds::default(),
            trainer: TrainerSettings::default(),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl CollectorConfig {
    /// Resolve the effective configuration. An explicit path must exist;
    /// the default path (`config.json` in the data directory) is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = constants::data_dir().join("config.json");
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("OBD_STORE_URL") {
            self.store.url = v;
        }
        if let Ok(v) = env::var("OBD_STORE_KEY") {
            self.store.api_key = v;
        }
        if let Ok(v) = env::var("OBD_LINK_CANDIDATES") {
            self.link_candidates = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = env_number("OBD_READ_INTERVAL_MS")? {
            self.read_interval_ms = v;
        }
        if let Some(v) = env_number("OBD_BATCH_SIZE")? {
            self.batch_size = v as usize;
        }
        if let Ok(v) = env::var("OBD_UPLOAD_ENABLED") {
            self.upload_enabled = v.to_lowercase() != "false" && v != "0";
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.link_candidates.is_empty() {
            return Err(ConfigError::Invalid(
                "link_candidates must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        if self.buffer_capacity < self.batch_size {
            return Err(ConfigError::Invalid(format!(
                "buffer_capacity ({}) must be >= batch_size ({})",
                self.buffer_capacity, self.batch_size
            )));
        }
        if self.read_interval_ms < 100 {
            return Err(ConfigError::Invalid(
                "read_interval_ms must be at least 100".to_string(),
            ));
        }
        if self.link_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "link_timeout_ms must be at least 1".to_string(),
            ));
        }
        let backoff = &self.reconnect_backoff;
        if backoff.initial_ms == 0 || backoff.max_ms < backoff.initial_ms {
            return Err(ConfigError::Invalid(
                "reconnect_backoff window is inverted".to_string(),
            ));
        }
        if backoff.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "reconnect_backoff.multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.store.url.is_empty() {
            return Err(ConfigError::Invalid("store.url must not be empty".to_string()));
        }
        if self.store.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "store.timeout_seconds must be at least 1".to_string(),
            ));
        }
        if !(self.trainer.test_fraction > 0.0 && self.trainer.test_fraction < 1.0) {
            return Err(ConfigError::Invalid(
                "trainer.test_fraction must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }
}

fn env_number(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{}: not a number: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// TESTS
// ============================================================================
