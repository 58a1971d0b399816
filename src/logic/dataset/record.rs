use serde::{Deserialize, Serialize};

use crate::logic::features::DerivedFeatures;
use crate::logic::reading::ObdParameters;
use crate::logic::stress::HealthTier;

/// One labeled telemetry row. The same shape is written to the JSONL
/// training corpus and uploaded to the remote readings table.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LabeledRecord {
    /// RFC 3339 UTC capture time
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub session_id: String,
    pub vehicle_signature: String,
    /// Position in the session stream
    pub sequence: u64,
    /// Percent of attempted queries that decoded (0-100)
    pub data_quality: u8,

    /// Raw decoded parameters, absent ones as explicit nulls
    pub raw_parameters: ObdParameters,

    pub derived_features: DerivedFeatures,

    // Label (training target)
    pub stress_score: u32,
    pub health_tier: HealthTier,

    // Model output, absent until a trained model is loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_status: Option<HealthTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_alerts: Option<Vec<String>>,
}

/// Latest-state mirror row, one per vehicle, upserted on `vehicle_signature`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LatestState {
    pub vehicle_signature: String,
    pub session_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Coarse 0-100 display score derived from the tier
    pub health_score: f64,
    pub health_tier: HealthTier,
    pub stress_score: u32,
    pub data_quality: u8,
    pub rpm: Option<f64>,
    pub speed: Option<f64>,
    pub coolant_temp: Option<f64>,
    pub engine_load: Option<f64>,
    pub control_module_voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_status: Option<HealthTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_confidence: Option<f64>,
}

impl LatestState {
    pub fn from_record(record: &LabeledRecord) -> Self {
        LatestState {
            vehicle_signature: record.vehicle_signature.clone(),
            session_id: record.session_id.clone(),
            timestamp: record.timestamp,
            health_score: record.health_tier.health_score(),
            health_tier: record.health_tier,
            stress_score: record.stress_score,
            data_quality: record.data_quality,
            rpm: record.raw_parameters.rpm,
            speed: record.raw_parameters.speed,
            coolant_temp: record.raw_parameters.coolant_temp,
            engine_load: record.raw_parameters.engine_load,
            control_module_voltage: record.raw_parameters.control_module_voltage,
            ml_status: record.ml_status,
            ml_confidence: record.ml_confidence,
        }
    }
}
