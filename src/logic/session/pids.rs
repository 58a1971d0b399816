//! OBD-II Parameter Catalogue
//!
//! Mode-01 PIDs the read cycle queries, with SAE J1979 decode formulas.
//! Decoding is total: a short or malformed payload yields `None`, never
//! a panic or a sentinel zero.

use crate::logic::reading::ObdParameters;

/// Mode-01 service byte for live data requests.
pub const MODE_LIVE_DATA: u8 = 0x01;

/// Monitor status PID (MIL flag + stored DTC count in byte A).
pub const PID_STATUS: u8 = 0x01;

// ============================================================================
// PARAMETER IDS
// ============================================================================

/// Every numeric parameter in the fixed request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pid {
    Rpm,
    Speed,
    CoolantTemp,
    EngineLoad,
    IntakeTemp,
    TimingAdvance,
    RunTime,
    AbsoluteLoad,
    FuelLevel,
    FuelPressure,
    ThrottlePos,
    ShortFuelTrim1,
    LongFuelTrim1,
    ShortFuelTrim2,
    LongFuelTrim2,
    Maf,
    IntakePressure,
    BarometricPressure,
    O2B1S1,
    O2B1S2,
    CatalystTempB1S1,
    AmbientAirTemp,
    ControlModuleVoltage,
    DistanceWithMil,
}

impl Pid {
    /// The full request cycle, in query order.
    pub const ALL: &'static [Pid] = &[
        Pid::Rpm,
        Pid::Speed,
        Pid::CoolantTemp,
        Pid::EngineLoad,
        Pid::IntakeTemp,
        Pid::TimingAdvance,
        Pid::RunTime,
        Pid::AbsoluteLoad,
        Pid::FuelLevel,
        Pid::FuelPressure,
        Pid::ThrottlePos,
        Pid::ShortFuelTrim1,
        Pid::LongFuelTrim1,
        Pid::ShortFuelTrim2,
        Pid::LongFuelTrim2,
        Pid::Maf,
        Pid::IntakePressure,
        Pid::BarometricPressure,
        Pid::O2B1S1,
        Pid::O2B1S2,
        Pid::CatalystTempB1S1,
        Pid::AmbientAirTemp,
        Pid::ControlModuleVoltage,
        Pid::DistanceWithMil,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Pid::Rpm => 0x0C,
            Pid::Speed => 0x0D,
            Pid::CoolantTemp => 0x05,
            Pid::EngineLoad => 0x04,
            Pid::IntakeTemp => 0x0F,
            Pid::TimingAdvance => 0x0E,
            Pid::RunTime => 0x1F,
            Pid::AbsoluteLoad => 0x43,
            Pid::FuelLevel => 0x2F,
            Pid::FuelPressure => 0x0A,
            Pid::ThrottlePos => 0x11,
            Pid::ShortFuelTrim1 => 0x06,
            Pid::LongFuelTrim1 => 0x07,
            Pid::ShortFuelTrim2 => 0x08,
            Pid::LongFuelTrim2 => 0x09,
            Pid::Maf => 0x10,
            Pid::IntakePressure => 0x0B,
            Pid::BarometricPressure => 0x33,
            Pid::O2B1S1 => 0x14,
            Pid::O2B1S2 => 0x15,
            Pid::CatalystTempB1S1 => 0x3C,
            Pid::AmbientAirTemp => 0x46,
            Pid::ControlModuleVoltage => 0x42,
            Pid::DistanceWithMil => 0x21,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Pid::Rpm => "rpm",
            Pid::Speed => "speed",
            Pid::CoolantTemp => "coolant_temp",
            Pid::EngineLoad => "engine_load",
            Pid::IntakeTemp => "intake_temp",
            Pid::TimingAdvance => "timing_advance",
            Pid::RunTime => "run_time",
            Pid::AbsoluteLoad => "absolute_load",
            Pid::FuelLevel => "fuel_level",
            Pid::FuelPressure => "fuel_pressure",
            Pid::ThrottlePos => "throttle_pos",
            Pid::ShortFuelTrim1 => "short_fuel_trim_1",
            Pid::LongFuelTrim1 => "long_fuel_trim_1",
            Pid::ShortFuelTrim2 => "short_fuel_trim_2",
            Pid::LongFuelTrim2 => "long_fuel_trim_2",
            Pid::Maf => "maf",
            Pid::IntakePressure => "intake_pressure",
            Pid::BarometricPressure => "barometric_pressure",
            Pid::O2B1S1 => "o2_b1s1",
            Pid::O2B1S2 => "o2_b1s2",
            Pid::CatalystTempB1S1 => "catalyst_temp_b1s1",
            Pid::AmbientAirTemp => "ambient_air_temp",
            Pid::ControlModuleVoltage => "control_module_voltage",
            Pid::DistanceWithMil => "distance_w_mil",
        }
    }

    /// Payload bytes the decode formula needs.
    pub fn expected_bytes(&self) -> usize {
        match self {
            Pid::Rpm
            | Pid::RunTime
            | Pid::AbsoluteLoad
            | Pid::Maf
            | Pid::CatalystTempB1S1
            | Pid::ControlModuleVoltage
            | Pid::DistanceWithMil => 2,
            _ => 1,
        }
    }

    /// Decode a reply payload into a physical value.
    ///
    /// A = data[0], B = data[1]. Two-byte quantities compose big-endian.
    pub fn decode(&self, data: &[u8]) -> Option<f64> {
        if data.len() < self.expected_bytes() {
            return None;
        }
        let a = data[0] as f64;
        let b = || data[1] as f64;
        let value = match self {
            Pid::Rpm => (a * 256.0 + b()) / 4.0,
            Pid::Speed => a,
            Pid::CoolantTemp | Pid::IntakeTemp | Pid::AmbientAirTemp => a - 40.0,
            Pid::EngineLoad | Pid::FuelLevel | Pid::ThrottlePos => a * 100.0 / 255.0,
            Pid::TimingAdvance => a / 2.0 - 64.0,
            Pid::RunTime | Pid::DistanceWithMil => a * 256.0 + b(),
            Pid::AbsoluteLoad => (a * 256.0 + b()) * 100.0 / 255.0,
            Pid::FuelPressure => a * 3.0,
            Pid::ShortFuelTrim1 | Pid::LongFuelTrim1 | Pid::ShortFuelTrim2 | Pid::LongFuelTrim2 => {
                a / 1.28 - 100.0
            }
            Pid::Maf => (a * 256.0 + b()) / 100.0,
            Pid::IntakePressure | Pid::BarometricPressure => a,
            Pid::O2B1S1 | Pid::O2B1S2 => a / 200.0,
            Pid::CatalystTempB1S1 => (a * 256.0 + b()) / 10.0 - 40.0,
            Pid::ControlModuleVoltage => (a * 256.0 + b()) / 1000.0,
        };
        Some(value)
    }

    /// Write a decoded value into its slot of the closed record.
    pub fn store(&self, params: &mut ObdParameters, value: f64) {
        let slot = match self {
            Pid::Rpm => &mut params.rpm,
            Pid::Speed => &mut params.speed,
            Pid::CoolantTemp => &mut params.coolant_temp,
            Pid::EngineLoad => &mut params.engine_load,
            Pid::IntakeTemp => &mut params.intake_temp,
            Pid::TimingAdvance => &mut params.timing_advance,
            Pid::RunTime => &mut params.run_time,
            Pid::AbsoluteLoad => &mut params.absolute_load,
            Pid::FuelLevel => &mut params.fuel_level,
            Pid::FuelPressure => &mut params.fuel_pressure,
            Pid::ThrottlePos => &mut params.throttle_pos,
            Pid::ShortFuelTrim1 => &mut params.short_fuel_trim_1,
            Pid::LongFuelTrim1 => &mut params.long_fuel_trim_1,
            Pid::ShortFuelTrim2 => &mut params.short_fuel_trim_2,
            Pid::LongFuelTrim2 => &mut params.long_fuel_trim_2,
            Pid::Maf => &mut params.maf,
            Pid::IntakePressure => &mut params.intake_pressure,
            Pid::BarometricPressure => &mut params.barometric_pressure,
            Pid::O2B1S1 => &mut params.o2_b1s1,
            Pid::O2B1S2 => &mut params.o2_b1s2,
            Pid::CatalystTempB1S1 => &mut params.catalyst_temp_b1s1,
            Pid::AmbientAirTemp => &mut params.ambient_air_temp,
            Pid::ControlModuleVoltage => &mut params.control_module_voltage,
            Pid::DistanceWithMil => &mut params.distance_w_mil,
        };
        *slot = Some(value);
    }
}

/// Decode the monitor status reply (PID 0x01, byte A).
///
/// Bit 7 is the MIL flag, bits 0-6 the stored DTC count.
pub fn decode_status(data: &[u8]) -> Option<(bool, u32)> {
    let a = *data.first()?;
    Some((a & 0x80 != 0, (a & 0x7F) as u32))
}

// ============================================================================
// SUPPORTED-PID SET
// ============================================================================

/// Which mode-01 PIDs the ECU reports as supported (codes 0x01..=0x60).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PidSet {
    bits: u128,
}

impl PidSet {
    pub fn insert(&mut self, code: u8) {
        if (1..=0x60).contains(&code) {
            self.bits |= 1u128 << (code - 1);
        }
    }

    pub fn contains(&self, code: u8) -> bool {
        (1..=0x60).contains(&code) && self.bits & (1u128 << (code - 1)) != 0
    }

    pub fn len(&self) -> u32 {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Fallback when the vehicle answers none of the bitmask queries:
    /// assume the whole catalogue and let per-query timeouts sort it out.
    pub fn full_catalogue() -> Self {
        let mut set = PidSet::default();
        for pid in Pid::ALL {
            set.insert(pid.code());
        }
        set.insert(PID_STATUS);
        set
    }

    /// Fold in one supported-PID bitmask reply.
    ///
    /// `base` is the queried PID (0x00, 0x20, 0x40); the four payload bytes
    /// cover codes base+1..=base+32, MSB first.
    pub fn apply_bitmask(&mut self, base: u8, data: &[u8]) {
        for (i, byte) in data.iter().take(4).enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    self.insert(base + (i * 8 + bit) as u8 + 1);
                }
            }
        }
    }

    /// Sorted hex codes, the fingerprint input for the vehicle signature.
    pub fn sorted_codes(&self) -> Vec<u8> {
        (1..=0x60).filter(|c| self.contains(*c)).collect()
    }
}
