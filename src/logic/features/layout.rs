//! Model Feature Layout - Centralized Feature Definition
//!
//! **This file controls the model input schema**
//!
//! ## Rules (NEVER break these):
//! 1. Add feature → increment MODEL_FEATURE_VERSION
//! 2. Change order → increment MODEL_FEATURE_VERSION
//! 3. Remove feature → increment MODEL_FEATURE_VERSION
//!
//! Trainer and predictor both read this list; the artifact carries the
//! hash so a stale model can be refused at load time.

use crc32fast::Hasher;

use super::DerivedFeatures;
use crate::logic::reading::ObdParameters;

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current model feature layout version
/// MUST be incremented when the layout changes
pub const MODEL_FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT (Authoritative source)
// ============================================================================

/// Feature names in the exact order they appear in the model input vector.
/// This is the SINGLE SOURCE OF TRUTH for the model schema.
pub const MODEL_FEATURE_LAYOUT: &[&str] = &[
    // === Raw parameters (0-16) ===
    "rpm",                    // 0
    "speed",                  // 1
    "coolant_temp",           // 2
    "engine_load",            // 3
    "throttle_pos",           // 4
    "intake_temp",            // 5
    "control_module_voltage", // 6
    "intake_pressure",        // 7
    "barometric_pressure",    // 8
    "ambient_air_temp",       // 9
    "run_time",               // 10
    "distance_w_mil",         // 11
    "maf",                    // 12
    "short_fuel_trim_1",      // 13
    "long_fuel_trim_1",       // 14
    "o2_b1s1",                // 15
    "dtc_count",              // 16

    // === Derived features (17-19) ===
    "load_rpm_ratio",         // 17
    "temp_gradient",          // 18
    "fuel_efficiency",        // 19

    // === Engineered indicators (20-27) ===
    "rpm_load_ratio",         // 20: revs per unit load
    "temp_efficiency",        // 21: coolant vs intake temperature
    "speed_throttle_ratio",   // 22: km/h per percent throttle
    "high_rpm",               // 23: rpm above 3000
    "low_speed",              // 24: below 20 km/h
    "high_throttle",          // 25: throttle above 70 percent
    "voltage_health",         // 26: charging voltage in 12.5-14.5 band
    "stress_indicator",       // 27: high rpm while near-stationary
];

/// Total number of model features
/// IMPORTANT: Must match MODEL_FEATURE_LAYOUT.len()!
pub const MODEL_FEATURE_COUNT: usize = 28;

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 over version + ordered names. Detects schema drift between a
/// stored artifact and the running binary.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[MODEL_FEATURE_VERSION]);
    for name in MODEL_FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]); // Separator
    }
    hasher.finalize()
}

/// Check if a stored layout matches the compiled one.
pub fn is_layout_compatible(version: u8, hash: u32) -> bool {
    version == MODEL_FEATURE_VERSION && hash == layout_hash()
}

// ============================================================================
// FEATURE LOOKUP
// ============================================================================

/// Get feature index by name (O(n) but features are few)
pub fn feature_index(name: &str) -> Option<usize> {
    MODEL_FEATURE_LAYOUT.iter().position(|&n| n == name)
}

/// Get feature name by index
pub fn feature_name(index: usize) -> Option<&'static str> {
    MODEL_FEATURE_LAYOUT.get(index).copied()
}

// ============================================================================
// VECTOR ASSEMBLY
// ============================================================================

/// Assemble the model input vector in layout order.
///
/// Slots stay `None` where an input is absent; imputation is the model
/// side's job (training-set medians live in the artifact).
pub fn assemble(p: &ObdParameters, derived: &DerivedFeatures) -> Vec<Option<f64>> {
    let ratio = |num: Option<f64>, den: Option<f64>| match (num, den) {
        (Some(n), Some(d)) if d > 0.0 => Some(n / d),
        _ => None,
    };
    let flag = |cond: Option<bool>| cond.map(|c| if c { 1.0 } else { 0.0 });

    let high_rpm = flag(p.rpm.map(|r| r > 3000.0));
    let low_speed = flag(p.speed.map(|s| s < 20.0));
    let stress_indicator = match (p.rpm, p.speed) {
        (Some(r), Some(s)) => Some(if r > 3000.0 && s < 20.0 { 1.0 } else { 0.0 }),
        _ => None,
    };

    vec![
        p.rpm,
        p.speed,
        p.coolant_temp,
        p.engine_load,
        p.throttle_pos,
        p.intake_temp,
        p.control_module_voltage,
        p.intake_pressure,
        p.barometric_pressure,
        p.ambient_air_temp,
        p.run_time,
        p.distance_w_mil,
        p.maf,
        p.short_fuel_trim_1,
        p.long_fuel_trim_1,
        p.o2_b1s1,
        p.dtc_count.map(|c| c as f64),
        derived.load_rpm_ratio,
        derived.temp_gradient,
        derived.fuel_efficiency,
        ratio(p.rpm, p.engine_load),
        ratio(p.coolant_temp, p.intake_temp),
        ratio(p.speed, p.throttle_pos),
        high_rpm,
        low_speed,
        flag(p.throttle_pos.map(|t| t > 70.0)),
        flag(p.control_module_voltage.map(|v| (12.5..=14.5).contains(&v))),
        stress_indicator,
    ]
}

// ============================================================================
// TESTS
// ============================================================================
