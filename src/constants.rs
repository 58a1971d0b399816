//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! To change the default store endpoint or cadence, only edit this file.

/// Default remote store URL
///
/// This is the fallback URL when no environment variable is set.
/// For development: http://localhost:8090
pub const DEFAULT_STORE_URL: &str = "http://localhost:8090";

/// Default remote store API key
pub const DEFAULT_STORE_KEY: &str = "dev-store-key-change-in-production";

/// Remote store table receiving batched labeled records
pub const DEFAULT_READINGS_TABLE: &str = "sensor_readings";

/// Remote store table holding the single latest record per vehicle
pub const DEFAULT_LATEST_TABLE: &str = "realtime_status";

/// Conflict key for the latest-state upsert
pub const LATEST_CONFLICT_KEY: &str = "vehicle_signature";

/// Default read-cycle interval (milliseconds)
pub const DEFAULT_READ_INTERVAL_MS: u64 = 1000;

/// Default dispatch batch size
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default upload buffer capacity (oldest records drop beyond this)
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Default max wait before a partial batch is flushed (milliseconds)
pub const DEFAULT_MAX_WAIT_MS: u64 = 15_000;

/// Default per-read link timeout (milliseconds)
pub const DEFAULT_LINK_TIMEOUT_MS: u64 = 2_000;

/// Default network dispatch timeout (milliseconds)
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 10_000;

/// Default link candidates, scanned in priority order
pub const DEFAULT_LINK_CANDIDATES: &[&str] = &[
    "tcp://192.168.0.10:35000",
    "tcp://127.0.0.1:35000",
];

/// Reconnect backoff: initial wait (milliseconds)
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 5_000;

/// Reconnect backoff: maximum wait (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

/// Reconnect backoff: multiplier applied per failed attempt
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Consecutive all-failure read cycles before the session is restarted
pub const DEFAULT_MAX_CYCLE_FAILURES: u32 = 5;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "OBD-Sentinel";

// ============================================
// Path helpers
// ============================================

/// Base data directory for dataset files and model artifacts
pub fn data_dir() -> std::path::PathBuf {
    if let Ok(custom) = std::env::var("OBD_DATA_DIR") {
        return std::path::PathBuf::from(custom);
    }
    dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("obd-sentinel")
}

/// Model artifact filename, relative to the data directory
pub const MODEL_ARTIFACT_FILE: &str = "health_model.json";

/// Sidecar metadata filename written next to the artifact
pub const MODEL_SIDECAR_FILE: &str = "health_model.meta.json";

/// Model artifact path from environment or the data directory
pub fn model_path() -> std::path::PathBuf {
    if let Ok(custom) = std::env::var("OBD_MODEL_PATH") {
        return std::path::PathBuf::from(custom);
    }
    data_dir().join(MODEL_ARTIFACT_FILE)
}
