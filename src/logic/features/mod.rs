//! Feature Engine
//!
//! Derived, time-dependent metrics computed from the raw reading stream.
//! Rolling state is bounded to the previous reading's coolant temperature;
//! it must be reset on every reconnect so gradients never span sessions.

pub mod layout;

pub use layout::{
    assemble, feature_index, feature_name, is_layout_compatible, layout_hash,
    MODEL_FEATURE_COUNT, MODEL_FEATURE_LAYOUT, MODEL_FEATURE_VERSION,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::reading::Reading;

/// Nominal gasoline density used by the consumption estimate (kg/L).
const FUEL_DENSITY_KG_PER_L: f64 = 0.75;

// ============================================================================
// DERIVED FEATURES
// ============================================================================

/// Derived metrics for one reading. Absent means "not computable this
/// cycle", which downstream consumers must treat differently from zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    /// (engine_load / rpm) * 1000, how hard the engine works per rev
    pub load_rpm_ratio: Option<f64>,
    /// Coolant temperature change rate (°C per minute)
    pub temp_gradient: Option<f64>,
    /// Fuel consumption estimate (L/100km) from MAF and speed
    pub fuel_efficiency: Option<f64>,
}

// ============================================================================
// FEATURE ENGINE
// ============================================================================

/// Computes derived features, carrying one reading of history.
pub struct FeatureEngine {
    last_temp: Option<(f64, DateTime<Utc>)>,
}

impl FeatureEngine {
    pub fn new() -> Self {
        Self { last_temp: None }
    }

    /// Drop rolling history. Called on every reconnect: the first reading
    /// of a new session has no defined gradient.
    pub fn reset(&mut self) {
        self.last_temp = None;
    }

    pub fn compute(&mut self, reading: &Reading) -> DerivedFeatures {
        let p = &reading.params;

        let load_rpm_ratio = match (p.engine_load, p.rpm) {
            (Some(load), Some(rpm)) if rpm > 0.0 => Some(load / rpm * 1000.0),
            _ => None,
        };

        let temp_gradient = match (p.coolant_temp, self.last_temp) {
            (Some(now), Some((prev, at))) => {
                let minutes = (reading.timestamp - at).num_milliseconds() as f64 / 60_000.0;
                if minutes > 0.0 {
                    Some((now - prev) / minutes)
                } else {
                    None
                }
            }
            _ => None,
        };

        let fuel_efficiency = match (p.maf, p.speed) {
            (Some(maf), Some(speed)) if speed > 0.0 => {
                Some(maf / 1000.0 / FUEL_DENSITY_KG_PER_L / speed * 3600.0 * 100.0)
            }
            _ => None,
        };

        // an absent temperature breaks the chain; the next gradient needs
        // two consecutive readings with temperature present
        self.last_temp = p.coolant_temp.map(|t| (t, reading.timestamp));

        DerivedFeatures {
            load_rpm_ratio,
            temp_gradient,
            fuel_efficiency,
        }
    }
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}
