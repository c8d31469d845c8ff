//! Sensor Sample and Alert Flag Types
//!
//! ## Overview
//!
//! A [`SensorSample`] is the unit of work of the whole pipeline. The sensor
//! producer creates one per sampling period, the vibration processor fills in
//! `vibration_rms`/`vibration_peak`, the alert engine fills in `flags`, and the
//! sample is then frozen: it goes into the telemetry queue by value and is
//! consumed exactly once by the dispatcher.
//!
//! ## Memory Model
//!
//! Samples are plain `Copy` values with no references, so the queue can move
//! them between tasks without any ownership bookkeeping:
//!
//! ```text
//! SensorSample layout (48 bytes):
//! ├── timestamp:        4 bytes
//! ├── accel:           12 bytes (3 × f32, g)
//! ├── gyro:            12 bytes (3 × f32, deg/s)
//! ├── temperature:      4 bytes
//! ├── vibration_rms:    4 bytes
//! ├── vibration_peak:   4 bytes
//! ├── battery_voltage:  4 bytes
//! ├── battery_level:    1 byte
//! ├── flags:            1 byte
//! └── padding:          2 bytes
//! ```
//!
//! ## Alert Flags
//!
//! Bit positions match the flags byte of the wire frame:
//!
//! | Bit | Flag |
//! |-----|------|
//! | 0x01 | `VIBRATION_WARN` |
//! | 0x02 | `VIBRATION_CRIT` |
//! | 0x04 | `TEMP_WARN` |
//! | 0x08 | `TEMP_CRIT` |
//! | 0x10 | `BATTERY_LOW` |
//! | 0x20 | `SENSOR_ERROR` |

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::sensors::{BATTERY_EMPTY_VOLTAGE, BATTERY_FULL_VOLTAGE};
use crate::time::Timestamp;

/// Three-axis vector (acceleration in g, angular rate in deg/s)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Axis3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Axis3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// All three components are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<(f32, f32, f32)> for Axis3 {
    fn from((x, y, z): (f32, f32, f32)) -> Self {
        Self::new(x, y, z)
    }
}

/// Alert condition bitmask
///
/// Recomputed for every sample; never carried over from the previous one.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct AlertFlags(u8);

impl AlertFlags {
    pub const NONE: Self = Self(0);
    pub const VIBRATION_WARN: Self = Self(0x01);
    pub const VIBRATION_CRIT: Self = Self(0x02);
    pub const TEMP_WARN: Self = Self(0x04);
    pub const TEMP_CRIT: Self = Self(0x08);
    pub const BATTERY_LOW: Self = Self(0x10);
    pub const SENSOR_ERROR: Self = Self(0x20);

    /// Every flag the threshold evaluation can raise
    pub const THRESHOLDS: Self = Self(0x1F);

    pub const fn empty() -> Self {
        Self::NONE
    }

    /// Build from a raw byte, discarding undefined bits
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0x3F)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Flags set in `self` but not in `other`
    pub const fn difference(&self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for AlertFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AlertFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AlertFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(AlertFlags, &str); 6] = [
            (AlertFlags::VIBRATION_WARN, "VIBRATION_WARN"),
            (AlertFlags::VIBRATION_CRIT, "VIBRATION_CRIT"),
            (AlertFlags::TEMP_WARN, "TEMP_WARN"),
            (AlertFlags::TEMP_CRIT, "TEMP_CRIT"),
            (AlertFlags::BATTERY_LOW, "BATTERY_LOW"),
            (AlertFlags::SENSOR_ERROR, "SENSOR_ERROR"),
        ];

        if self.is_empty() {
            return f.write_str("NONE");
        }

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// One sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorSample {
    /// Seconds since epoch
    pub timestamp: Timestamp,
    /// Acceleration (g)
    pub accel: Axis3,
    /// Angular rate (deg/s)
    pub gyro: Axis3,
    /// Temperature (°C)
    pub temperature: f32,
    /// Instantaneous dynamic vibration magnitude (g)
    pub vibration_rms: f32,
    /// Running maximum of `vibration_rms` (g)
    pub vibration_peak: f32,
    /// Battery charge (0-100%)
    pub battery_level: u8,
    /// Battery voltage (V)
    pub battery_voltage: f32,
    /// Alert conditions
    pub flags: AlertFlags,
}

impl SensorSample {
    /// Zeroed sample stamped with `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    pub fn with_accel(mut self, x: f32, y: f32, z: f32) -> Self {
        self.accel = Axis3::new(x, y, z);
        self
    }

    pub fn with_gyro(mut self, x: f32, y: f32, z: f32) -> Self {
        self.gyro = Axis3::new(x, y, z);
        self
    }

    pub fn with_temperature(mut self, celsius: f32) -> Self {
        self.temperature = celsius;
        self
    }

    /// Set battery voltage and derive the level from it
    pub fn with_battery_voltage(mut self, volts: f32) -> Self {
        self.battery_voltage = volts;
        self.battery_level = battery_percent_from_voltage(volts);
        self
    }

    pub fn with_battery_level(mut self, percent: u8) -> Self {
        self.battery_level = percent.min(100);
        self
    }

    pub fn with_vibration(mut self, rms: f32, peak: f32) -> Self {
        self.vibration_rms = rms;
        self.vibration_peak = peak;
        self
    }

    pub fn has_sensor_error(&self) -> bool {
        self.flags.contains(AlertFlags::SENSOR_ERROR)
    }
}

/// Map a single-cell LiPo voltage to a charge percentage
///
/// Linear between the empty (3.0 V) and full (4.2 V) voltages, rounded to
/// the nearest percent. NaN maps to 0.
pub fn battery_percent_from_voltage(volts: f32) -> u8 {
    if volts.is_nan() || volts <= BATTERY_EMPTY_VOLTAGE {
        return 0;
    }
    if volts >= BATTERY_FULL_VOLTAGE {
        return 100;
    }

    let percent = (volts - BATTERY_EMPTY_VOLTAGE)
        / (BATTERY_FULL_VOLTAGE - BATTERY_EMPTY_VOLTAGE)
        * 100.0;
    libm::roundf(percent) as u8
}
