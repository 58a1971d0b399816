//! Stress Labeler
//!
//! Deterministic multi-factor scoring of one reading into a health tier.
//! This is the labeling oracle for supervised training, so it must be a
//! pure function of its inputs. KHÔNG giữ state giữa các readings.

pub mod rules;


pub use rules::{assess, BandRule, OverrideLimits, StressThresholds};

use serde::{Deserialize, Serialize};

// ============================================================================
// HEALTH TIER
// ============================================================================

/// Ordered health classification tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthTier {
    Normal,
    Advisory,
    Warning,
    Critical,
}

impl HealthTier {
    pub const ALL: &'static [HealthTier] = &[
        HealthTier::Normal,
        HealthTier::Advisory,
        HealthTier::Warning,
        HealthTier::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthTier::Normal => "NORMAL",
            HealthTier::Advisory => "ADVISORY",
            HealthTier::Warning => "WARNING",
            HealthTier::Critical => "CRITICAL",
        }
    }

    /// Class index used by the model (label encoding).
    pub fn index(&self) -> usize {
        match self {
            HealthTier::Normal => 0,
            HealthTier::Advisory => 1,
            HealthTier::Warning => 2,
            HealthTier::Critical => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<HealthTier> {
        match index {
            0 => Some(HealthTier::Normal),
            1 => Some(HealthTier::Advisory),
            2 => Some(HealthTier::Warning),
            3 => Some(HealthTier::Critical),
            _ => None,
        }
    }

    /// Coarse 0-100 display score for the latest-state dashboard row.
    pub fn health_score(&self) -> f64 {
        match self {
            HealthTier::Normal => 95.0,
            HealthTier::Advisory => 70.0,
            HealthTier::Warning => 45.0,
            HealthTier::Critical => 20.0,
        }
    }
}

impl std::fmt::Display for HealthTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// STRESS FACTORS
// ============================================================================

/// Independent risk factors in the scoring table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressFactor {
    EngineLoad,
    RpmBand,
    RpmLoadMismatch,
    CoolantTemp,
    VoltageLow,
    VoltageHigh,
    FuelTrim,
    O2Sensor,
    DtcCount,
    MilOn,
    MilDistance,
    /// Override-only factor, no band row
    CatalystTemp,
}

impl StressFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            StressFactor::EngineLoad => "engine_load",
            StressFactor::RpmBand => "rpm_band",
            StressFactor::RpmLoadMismatch => "rpm_load_mismatch",
            StressFactor::CoolantTemp => "coolant_temp",
            StressFactor::VoltageLow => "voltage_low",
            StressFactor::VoltageHigh => "voltage_high",
            StressFactor::FuelTrim => "fuel_trim",
            StressFactor::O2Sensor => "o2_sensor",
            StressFactor::DtcCount => "dtc_count",
            StressFactor::MilOn => "mil_on",
            StressFactor::MilDistance => "mil_distance",
            StressFactor::CatalystTemp => "catalyst_temp",
        }
    }

    /// Human-readable label for alert lists.
    pub fn describe(&self) -> &'static str {
        match self {
            StressFactor::EngineLoad => "Engine load high",
            StressFactor::RpmBand => "Sustained high RPM",
            StressFactor::RpmLoadMismatch => "High RPM at low load",
            StressFactor::CoolantTemp => "Coolant temperature elevated",
            StressFactor::VoltageLow => "Battery voltage low",
            StressFactor::VoltageHigh => "Charging voltage high",
            StressFactor::FuelTrim => "Fuel trim out of range",
            StressFactor::O2Sensor => "O2 sensor voltage off center",
            StressFactor::DtcCount => "Stored trouble codes present",
            StressFactor::MilOn => "Malfunction indicator lamp on",
            StressFactor::MilDistance => "Distance driven with MIL on",
            StressFactor::CatalystTemp => "Catalyst temperature extreme",
        }
    }
}

impl std::fmt::Display for StressFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ASSESSMENT RESULT
// ============================================================================

/// One factor's contribution to the summed score
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FactorContribution {
    pub factor: StressFactor,
    pub points: u32,
}

/// Full labeler output for one reading
#[derive(Debug, Clone, Serialize)]
pub struct StressAssessment {
    pub score: u32,
    pub tier: HealthTier,
    /// Non-zero contributions in table order
    pub contributions: Vec<FactorContribution>,
    /// Set when a hard safety limit short-circuited the sum
    pub overridden: Option<StressFactor>,
}

impl StressAssessment {
    /// Factors sorted by contribution, biggest first.
    pub fn dominant_factors(&self) -> Vec<StressFactor> {
        let mut sorted = self.contributions.clone();
        sorted.sort_by(|a, b| b.points.cmp(&a.points));
        sorted.into_iter().map(|c| c.factor).collect()
    }
}
