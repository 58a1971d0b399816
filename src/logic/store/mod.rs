//! Remote Store
//!
//! Uplink to the PostgREST-style telemetry store. Two tables: an
//! append-only readings table and a one-row-per-vehicle latest-state
//! mirror keyed on the vehicle signature.

pub mod client;

pub use client::{StoreClient, StoreConfig};

use crate::logic::dataset::{LabeledRecord, LatestState};

/// Store errors split into transient (retry the batch) and fatal
/// (drop the batch, it will never be accepted).
#[derive(Debug, Clone)]
pub enum StoreError {
    Network(String),
    Timeout,
    RateLimited,
    /// 5xx reply
    Server(u16),
    /// Non-retryable 4xx reply
    Rejected { status: u16, body: String },
    Serialize(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_)
            | StoreError::Timeout
            | StoreError::RateLimited
            | StoreError::Server(_) => true,
            StoreError::Rejected { .. } | StoreError::Serialize(_) => false,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Timeout => write!(f, "Request timed out"),
            Self::RateLimited => write!(f, "Rate limited by store"),
            Self::Server(code) => write!(f, "Server error: {}", code),
            Self::Rejected { status, body } => write!(f, "Rejected ({}): {}", status, body),
            Self::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Seam between the uploader and the wire. The mock in the uploader
/// tests implements this too.
pub trait RemoteStore {
    /// Append a batch to the readings table. All-or-nothing.
    async fn insert_readings(&self, rows: &[LabeledRecord]) -> Result<(), StoreError>;

    /// Upsert the per-vehicle latest row on its conflict key.
    async fn upsert_latest(&self, row: &LatestState) -> Result<(), StoreError>;
}
