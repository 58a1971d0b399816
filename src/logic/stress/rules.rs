//! Scoring Rules
//!
//! The factor table behind the stress labeler. Bands are declarative data
//! (cut + points, checked in order, first hit wins) so every factor can be
//! tuned from config and tested alone. Strict comparisons at every cut.

use serde::{Deserialize, Serialize};

use super::{FactorContribution, HealthTier, StressAssessment, StressFactor};
use crate::logic::reading::ObdParameters;

/// One severity band: awarded when the value passes `cut`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRule {
    pub cut: f64,
    pub points: u32,
}

impl BandRule {
    pub const fn new(cut: f64, points: u32) -> Self {
        BandRule { cut, points }
    }
}

#[derive(Debug, Clone, Copy)]
enum BandDirection {
    Above,
    Below,
}

/// First band the value passes wins. Bands must be ordered worst-first.
fn band_points(value: f64, direction: BandDirection, bands: &[BandRule]) -> u32 {
    for band in bands {
        let hit = match direction {
            BandDirection::Above => value > band.cut,
            BandDirection::Below => value < band.cut,
        };
        if hit {
            return band.points;
        }
    }
    0
}

/// Hard safety limits. Any breach forces `override_score` regardless of
/// what the rest of the table says.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideLimits {
    pub coolant_temp_above: f64,
    pub voltage_below: f64,
    pub dtc_count_above: u32,
    pub catalyst_temp_above: f64,
    pub engine_load_above: f64,
}

impl Default for OverrideLimits {
    fn default() -> Self {
        OverrideLimits {
            coolant_temp_above: 110.0,
            voltage_below: 11.0,
            dtc_count_above: 10,
            catalyst_temp_above: 900.0,
            engine_load_above: 95.0,
        }
    }
}

/// Tunable scoring table. Defaults encode the field-calibrated values;
/// config may override any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressThresholds {
    pub load_bands: Vec<BandRule>,
    pub rpm_bands: Vec<BandRule>,
    /// Mismatch fires when rpm is above this and load below the next field
    pub mismatch_rpm_above: f64,
    pub mismatch_load_below: f64,
    pub mismatch_points: u32,
    pub temp_bands: Vec<BandRule>,
    pub voltage_low_bands: Vec<BandRule>,
    pub voltage_high_bands: Vec<BandRule>,
    pub short_trim_bands: Vec<BandRule>,
    pub long_trim_bands: Vec<BandRule>,
    /// Narrowband O2 mid-point, volts
    pub o2_center: f64,
    pub o2_deviation_bands: Vec<BandRule>,
    pub dtc_bands: Vec<BandRule>,
    pub mil_points: u32,
    pub mil_distance_bands: Vec<BandRule>,
    pub overrides: OverrideLimits,
    pub override_score: u32,
    /// Tier cuts: score >= cut enters the tier
    pub advisory_at: u32,
    pub warning_at: u32,
    pub critical_at: u32,
}

impl Default for StressThresholds {
    fn default() -> Self {
        StressThresholds {
            load_bands: vec![
                BandRule::new(85.0, 3),
                BandRule::new(70.0, 2),
                BandRule::new(50.0, 1),
            ],
            rpm_bands: vec![BandRule::new(4500.0, 2), BandRule::new(4000.0, 1)],
            mismatch_rpm_above: 3500.0,
            mismatch_load_below: 30.0,
            mismatch_points: 2,
            temp_bands: vec![
                BandRule::new(105.0, 3),
                BandRule::new(100.0, 2),
                BandRule::new(95.0, 1),
            ],
            voltage_low_bands: vec![BandRule::new(12.0, 2), BandRule::new(13.0, 1)],
            voltage_high_bands: vec![BandRule::new(15.0, 2)],
            short_trim_bands: vec![BandRule::new(20.0, 2), BandRule::new(10.0, 1)],
            long_trim_bands: vec![BandRule::new(15.0, 2), BandRule::new(8.0, 1)],
            o2_center: 0.45,
            o2_deviation_bands: vec![BandRule::new(0.3, 1)],
            dtc_bands: vec![BandRule::new(2.0, 2), BandRule::new(0.0, 1)],
            mil_points: 2,
            mil_distance_bands: vec![BandRule::new(50.0, 1)],
            overrides: OverrideLimits::default(),
            override_score: 15,
            advisory_at: 3,
            warning_at: 6,
            critical_at: 10,
        }
    }
}

impl StressThresholds {
    pub fn tier_for(&self, score: u32) -> HealthTier {
        if score >= self.critical_at {
            HealthTier::Critical
        } else if score >= self.warning_at {
            HealthTier::Warning
        } else if score >= self.advisory_at {
            HealthTier::Advisory
        } else {
            HealthTier::Normal
        }
    }

    fn check_overrides(&self, p: &ObdParameters) -> Option<StressFactor> {
        let o = &self.overrides;
        if p.coolant_temp.map_or(false, |v| v > o.coolant_temp_above) {
            return Some(StressFactor::CoolantTemp);
        }
        if p.control_module_voltage.map_or(false, |v| v < o.voltage_below) {
            return Some(StressFactor::VoltageLow);
        }
        if p.dtc_count.map_or(false, |c| c > o.dtc_count_above) {
            return Some(StressFactor::DtcCount);
        }
        if p.catalyst_temp_b1s1.map_or(false, |v| v > o.catalyst_temp_above) {
            return Some(StressFactor::CatalystTemp);
        }
        if p.engine_load.map_or(false, |v| v > o.engine_load_above) {
            return Some(StressFactor::EngineLoad);
        }
        None
    }
}

/// Score one parameter set. Absent parameters contribute nothing, so a
/// sparse reading can only land in a healthier tier, never a sicker one.
pub fn assess(params: &ObdParameters, thresholds: &StressThresholds) -> StressAssessment {
    if let Some(factor) = thresholds.check_overrides(params) {
        let score = thresholds.override_score;
        return StressAssessment {
            score,
            tier: thresholds.tier_for(score),
            contributions: vec![FactorContribution {
                factor,
                points: score,
            }],
            overridden: Some(factor),
        };
    }

    // Synthetic inputs for the flag-style rows
    let mismatch = match (params.rpm, params.engine_load) {
        (Some(rpm), Some(load)) => {
            let hit = rpm > thresholds.mismatch_rpm_above && load < thresholds.mismatch_load_below;
            Some(if hit { 1.0 } else { 0.0 })
        }
        _ => None,
    };
    let o2_deviation = params.o2_b1s1.map(|v| (v - thresholds.o2_center).abs());
    let dtc = params.dtc_count.map(|c| c as f64);
    let mil = params.mil_on.map(|on| if on { 1.0 } else { 0.0 });

    let mismatch_bands = [BandRule::new(0.0, thresholds.mismatch_points)];
    let mil_bands = [BandRule::new(0.0, thresholds.mil_points)];

    let rows: [(StressFactor, Option<f64>, BandDirection, &[BandRule]); 10] = [
        (
            StressFactor::EngineLoad,
            params.engine_load,
            BandDirection::Above,
            thresholds.load_bands.as_slice(),
        ),
        (
            StressFactor::RpmBand,
            params.rpm,
            BandDirection::Above,
            thresholds.rpm_bands.as_slice(),
        ),
        (
            StressFactor::RpmLoadMismatch,
            mismatch,
            BandDirection::Above,
            &mismatch_bands,
        ),
        (
            StressFactor::CoolantTemp,
            params.coolant_temp,
            BandDirection::Above,
            thresholds.temp_bands.as_slice(),
        ),
        (
            StressFactor::VoltageLow,
            params.control_module_voltage,
            BandDirection::Below,
            thresholds.voltage_low_bands.as_slice(),
        ),
        (
            StressFactor::VoltageHigh,
            params.control_module_voltage,
            BandDirection::Above,
            thresholds.voltage_high_bands.as_slice(),
        ),
        (
            StressFactor::O2Sensor,
            o2_deviation,
            BandDirection::Above,
            thresholds.o2_deviation_bands.as_slice(),
        ),
        (
            StressFactor::DtcCount,
            dtc,
            BandDirection::Above,
            thresholds.dtc_bands.as_slice(),
        ),
        (StressFactor::MilOn, mil, BandDirection::Above, &mil_bands),
        (
            StressFactor::MilDistance,
            params.distance_w_mil,
            BandDirection::Above,
            thresholds.mil_distance_bands.as_slice(),
        ),
    ];

    let mut score = 0u32;
    let mut contributions = Vec::new();
    for (factor, input, direction, bands) in rows {
        if let Some(value) = input {
            let points = band_points(value, direction, bands);
            if points > 0 {
                score += points;
                contributions.push(FactorContribution { factor, points });
            }
        }
    }

    // Fuel trim: short and long band independently, the worse one counts
    let short = params
        .short_fuel_trim_1
        .map(|v| band_points(v.abs(), BandDirection::Above, &thresholds.short_trim_bands))
        .unwrap_or(0);
    let long = params
        .long_fuel_trim_1
        .map(|v| band_points(v.abs(), BandDirection::Above, &thresholds.long_trim_bands))
        .unwrap_or(0);
    let trim_points = short.max(long);
    if trim_points > 0 {
        score += trim_points;
        contributions.push(FactorContribution {
            factor: StressFactor::FuelTrim,
            points: trim_points,
        });
    }

    StressAssessment {
        score,
        tier: thresholds.tier_for(score),
        contributions,
        overridden: None,
    }
}
