//! Reading Types
//!
//! One timestamped snapshot of decoded OBD-II parameters.
//! KHÔNG chứa decode logic - chỉ data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// RAW PARAMETERS
// ============================================================================

/// Raw mode-01 parameters from one read cycle.
///
/// Every field is optional: a parameter the vehicle does not support, or
/// whose reply timed out or came back garbled, stays `None`. Serialized
/// with explicit nulls so consumers can tell absent from zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObdParameters {
    /// Engine speed (rpm)
    pub rpm: Option<f64>,
    /// Vehicle speed (km/h)
    pub speed: Option<f64>,
    /// Coolant temperature (°C)
    pub coolant_temp: Option<f64>,
    /// Calculated engine load (%)
    pub engine_load: Option<f64>,
    /// Intake air temperature (°C)
    pub intake_temp: Option<f64>,
    /// Timing advance before TDC (°)
    pub timing_advance: Option<f64>,
    /// Run time since engine start (s)
    pub run_time: Option<f64>,
    /// Absolute load value (%)
    pub absolute_load: Option<f64>,
    /// Fuel tank level (%)
    pub fuel_level: Option<f64>,
    /// Fuel pressure (kPa)
    pub fuel_pressure: Option<f64>,
    /// Throttle position (%)
    pub throttle_pos: Option<f64>,
    /// Short term fuel trim, bank 1 (%)
    pub short_fuel_trim_1: Option<f64>,
    /// Long term fuel trim, bank 1 (%)
    pub long_fuel_trim_1: Option<f64>,
    /// Short term fuel trim, bank 2 (%)
    pub short_fuel_trim_2: Option<f64>,
    /// Long term fuel trim, bank 2 (%)
    pub long_fuel_trim_2: Option<f64>,
    /// MAF air flow rate (g/s)
    pub maf: Option<f64>,
    /// Intake manifold absolute pressure (kPa)
    pub intake_pressure: Option<f64>,
    /// Barometric pressure (kPa)
    pub barometric_pressure: Option<f64>,
    /// O2 sensor voltage, bank 1 sensor 1 (V)
    pub o2_b1s1: Option<f64>,
    /// O2 sensor voltage, bank 1 sensor 2 (V)
    pub o2_b1s2: Option<f64>,
    /// Catalyst temperature, bank 1 sensor 1 (°C)
    pub catalyst_temp_b1s1: Option<f64>,
    /// Ambient air temperature (°C)
    pub ambient_air_temp: Option<f64>,
    /// Control module voltage (V)
    pub control_module_voltage: Option<f64>,
    /// Distance traveled with MIL on (km)
    pub distance_w_mil: Option<f64>,
    /// Stored diagnostic trouble code count
    pub dtc_count: Option<u32>,
    /// Malfunction indicator lamp state
    pub mil_on: Option<bool>,
}

impl ObdParameters {
    /// Count of populated numeric parameters (status fields excluded).
    pub fn present_count(&self) -> u32 {
        [
            self.rpm,
            self.speed,
            self.coolant_temp,
            self.engine_load,
            self.intake_temp,
            self.timing_advance,
            self.run_time,
            self.absolute_load,
            self.fuel_level,
            self.fuel_pressure,
            self.throttle_pos,
            self.short_fuel_trim_1,
            self.long_fuel_trim_1,
            self.short_fuel_trim_2,
            self.long_fuel_trim_2,
            self.maf,
            self.intake_pressure,
            self.barometric_pressure,
            self.o2_b1s1,
            self.o2_b1s2,
            self.catalyst_temp_b1s1,
            self.ambient_air_temp,
            self.control_module_voltage,
            self.distance_w_mil,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count() as u32
    }

    /// True when not a single parameter decoded this cycle.
    pub fn is_empty(&self) -> bool {
        self.present_count() == 0 && self.dtc_count.is_none() && self.mil_on.is_none()
    }
}

// ============================================================================
// READING
// ============================================================================

/// One timestamped snapshot of the vehicle, with its position in the
/// session stream and how much of the query cycle actually decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,

    /// Session-scoped sequence number, starts at 1
    pub sequence: u64,

    pub params: ObdParameters,

    /// Parameter queries attempted this cycle
    pub attempted: u32,
    /// Parameter queries that decoded successfully
    pub decoded: u32,
}

impl Reading {
    pub fn new(sequence: u64, params: ObdParameters, attempted: u32, decoded: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            sequence,
            params,
            attempted,
            decoded,
        }
    }

    /// Percentage of attempted queries that decoded (0-100).
    pub fn data_quality(&self) -> u8 {
        if self.attempted == 0 {
            return 0;
        }
        ((self.decoded * 100) / self.attempted) as u8
    }
}
