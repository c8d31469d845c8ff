//! Device configuration
//!
//! Everything a user can change at runtime: sampling cadence, alert levels,
//! the alert switch, delivery mode and the advertised name. Persisting it is
//! the platform's job; the core only validates and reads it.
//!
//! ```rust
//! use vibemon_core::config::{DeviceConfig, SamplingPreset};
//!
//! let mut config = DeviceConfig::default();
//! config.apply_preset(SamplingPreset::Fast);
//! config.thresholds.vibration_warning = 1.5;
//! assert!(config.validate().is_ok());
//! ```

use core::fmt::Write;

use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::alerts::Thresholds;
use crate::constants::buffers::{DEVICE_NAME_PREFIX, MAX_DEVICE_NAME_LEN};
use crate::constants::time::{
    DEFAULT_SAMPLE_INTERVAL_MS, FAST_SAMPLE_INTERVAL_MS, MAX_SAMPLE_INTERVAL_MS,
    MIN_SAMPLE_INTERVAL_MS, SLOW_SAMPLE_INTERVAL_MS,
};
use crate::dispatcher::DeliveryMode;
use crate::errors::ConfigError;
use crate::traits::ConfigProvider;

/// Advertised device name
pub type DeviceName = String<MAX_DEVICE_NAME_LEN>;

/// Named sampling intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SamplingPreset {
    /// 10 Hz
    Fast,
    /// 1 Hz
    Normal,
    /// 0.2 Hz
    Slow,
}

impl SamplingPreset {
    pub const fn interval_ms(&self) -> u32 {
        match self {
            SamplingPreset::Fast => FAST_SAMPLE_INTERVAL_MS,
            SamplingPreset::Normal => DEFAULT_SAMPLE_INTERVAL_MS,
            SamplingPreset::Slow => SLOW_SAMPLE_INTERVAL_MS,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    /// Sampling period (ms)
    pub sample_interval_ms: u32,
    pub thresholds: Thresholds,
    /// When false, no threshold flag is raised; `SENSOR_ERROR` still is
    pub alerts_enabled: bool,
    pub delivery: DeliveryMode,
    pub device_name: DeviceName,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            thresholds: Thresholds::default(),
            alerts_enabled: true,
            delivery: DeliveryMode::Notify,
            device_name: default_name(),
        }
    }
}

impl DeviceConfig {
    /// Defaults with the name derived from the device address
    pub fn for_device(address: [u8; 6]) -> Self {
        Self {
            device_name: default_device_name(address),
            ..Self::default()
        }
    }

    pub fn apply_preset(&mut self, preset: SamplingPreset) {
        self.sample_interval_ms = preset.interval_ms();
    }

    /// Replace the advertised name
    pub fn set_device_name(&mut self, name: &str) -> Result<(), ConfigError> {
        let mut new_name = DeviceName::new();
        new_name
            .push_str(name)
            .map_err(|_| ConfigError::NameTooLong { max: MAX_DEVICE_NAME_LEN })?;
        self.device_name = new_name;
        Ok(())
    }

    /// Check every field against its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_INTERVAL_MS..=MAX_SAMPLE_INTERVAL_MS).contains(&self.sample_interval_ms) {
            return Err(ConfigError::IntervalOutOfRange {
                value: self.sample_interval_ms,
                min: MIN_SAMPLE_INTERVAL_MS,
                max: MAX_SAMPLE_INTERVAL_MS,
            });
        }
        self.thresholds.validate()
    }
}

impl ConfigProvider for DeviceConfig {
    fn sample_interval_ms(&self) -> u32 {
        self.sample_interval_ms
    }

    fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn alerts_enabled(&self) -> bool {
        self.alerts_enabled
    }
}

/// Name used when no device address is known, `VibeMon`
pub fn default_name() -> DeviceName {
    let mut name = DeviceName::new();
    // Prefix is shorter than the name buffer
    let _ = name.push_str(DEVICE_NAME_PREFIX.trim_end_matches('_'));
    name
}

/// `VibeMon_` followed by the last two address bytes in hex, e.g. `VibeMon_EEFF`
pub fn default_device_name(address: [u8; 6]) -> DeviceName {
    let mut name = DeviceName::new();
    // 12 bytes always fit
    let _ = write!(name, "{}{:02X}{:02X}", DEVICE_NAME_PREFIX, address[4], address[5]);
    name
}
