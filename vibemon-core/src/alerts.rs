//! Multi-Level Threshold Alerts
//!
//! Each monitored signal has a warning and a critical level. Evaluation is a
//! pure function of one sample and the thresholds:
//!
//! | Signal | Warning bit | Critical bit | Condition |
//! |--------|-------------|--------------|-----------|
//! | vibration | `VIBRATION_WARN` | `VIBRATION_CRIT` | `rms >= level` |
//! | temperature | `TEMP_WARN` | `TEMP_CRIT` | `temperature >= level` |
//! | battery | `BATTERY_LOW` | | `level <= battery_low_percent` |
//!
//! Critical wins over warning, so at most one bit per signal is set. Signals
//! are independent of each other. Nothing is remembered between samples:
//! a condition that goes away clears on the very next sample.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::sensors::{
    BATTERY_LOW_PERCENT, TEMP_CRITICAL_C, TEMP_WARNING_C, VIBRATION_CRITICAL_G,
    VIBRATION_WARNING_G,
};
use crate::errors::ConfigError;
use crate::sample::{AlertFlags, SensorSample};

/// Severity of one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

impl AlertLevel {
    pub const fn name(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "normal",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Alert levels for every monitored signal
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Thresholds {
    /// Vibration warning level (g)
    pub vibration_warning: f32,
    /// Vibration critical level (g)
    pub vibration_critical: f32,
    /// Temperature warning level (°C)
    pub temp_warning: f32,
    /// Temperature critical level (°C)
    pub temp_critical: f32,
    /// Battery level at or below which `BATTERY_LOW` is raised (%)
    pub battery_low_percent: u8,
}

impl Thresholds {
    pub const DEFAULT: Self = Self {
        vibration_warning: VIBRATION_WARNING_G,
        vibration_critical: VIBRATION_CRITICAL_G,
        temp_warning: TEMP_WARNING_C,
        temp_critical: TEMP_CRITICAL_C,
        battery_low_percent: BATTERY_LOW_PERCENT,
    };

    /// Check that every warning level is positive and below its critical level
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_pair("vibration", self.vibration_warning, self.vibration_critical)?;
        check_pair("temperature", self.temp_warning, self.temp_critical)?;

        if self.battery_low_percent > 100 {
            return Err(ConfigError::BatteryThreshold(self.battery_low_percent));
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn check_pair(signal: &'static str, warning: f32, critical: f32) -> Result<(), ConfigError> {
    // Written so that NaN fails too
    if warning > 0.0 && warning < critical {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOrder { signal, warning, critical })
    }
}

/// Classify a value against a warning/critical pair
#[inline]
pub fn level_for_value(value: f32, warning: f32, critical: f32) -> AlertLevel {
    if value >= critical {
        AlertLevel::Critical
    } else if value >= warning {
        AlertLevel::Warning
    } else {
        AlertLevel::Normal
    }
}

/// Compute the threshold flags for one sample
///
/// Only threshold bits are produced; `SENSOR_ERROR` is the producer's concern.
pub fn evaluate(sample: &SensorSample, thresholds: &Thresholds) -> AlertFlags {
    let mut flags = AlertFlags::empty();

    match level_for_value(
        sample.vibration_rms,
        thresholds.vibration_warning,
        thresholds.vibration_critical,
    ) {
        AlertLevel::Critical => flags.set(AlertFlags::VIBRATION_CRIT),
        AlertLevel::Warning => flags.set(AlertFlags::VIBRATION_WARN),
        AlertLevel::Normal => {}
    }

    match level_for_value(
        sample.temperature,
        thresholds.temp_warning,
        thresholds.temp_critical,
    ) {
        AlertLevel::Critical => flags.set(AlertFlags::TEMP_CRIT),
        AlertLevel::Warning => flags.set(AlertFlags::TEMP_WARN),
        AlertLevel::Normal => {}
    }

    if sample.battery_level <= thresholds.battery_low_percent {
        flags.set(AlertFlags::BATTERY_LOW);
    }

    flags
}

/// Stateful wrapper around [`evaluate`] that logs alert transitions
///
/// The previous flags are kept only for logging; they never influence the
/// flags returned.
#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    previous: AlertFlags,
}

impl AlertEngine {
    pub const fn new() -> Self {
        Self { previous: AlertFlags::NONE }
    }

    /// Evaluate a sample, suppressing every threshold flag when `enabled` is false
    pub fn evaluate(
        &mut self,
        sample: &SensorSample,
        thresholds: &Thresholds,
        enabled: bool,
    ) -> AlertFlags {
        let flags = if enabled {
            evaluate(sample, thresholds)
        } else {
            AlertFlags::empty()
        };

        let raised = flags.difference(self.previous);
        let cleared = self.previous.difference(flags);
        if !raised.is_empty() {
            log_warn!(
                "Alert raised at {}: {:?} (vibration {} g, temperature {} C, battery {}%)",
                sample.timestamp,
                raised,
                sample.vibration_rms,
                sample.temperature,
                sample.battery_level
            );
        }
        if !cleared.is_empty() {
            log_info!("Alert cleared at {}: {:?}", sample.timestamp, cleared);
        }

        self.previous = flags;
        flags
    }

    /// Flags returned by the last evaluation
    pub fn active(&self) -> AlertFlags {
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(vibration: f32, temperature: f32, battery: u8) -> SensorSample {
        SensorSample::new(0)
            .with_vibration(vibration, vibration)
            .with_temperature(temperature)
            .with_battery_level(battery)
    }

    #[test]
    fn quiet_sample_has_no_flags() {
        let flags = evaluate(&sample(0.0, 25.0, 50), &Thresholds::default());
        assert!(flags.is_empty());
    }

    #[test]
    fn critical_wins_over_warning() {
        let flags = evaluate(&sample(5.0, 25.0, 50), &Thresholds::default());
        assert_eq!(flags, AlertFlags::VIBRATION_CRIT);

        let flags = evaluate(&sample(0.0, 85.0, 50), &Thresholds::default());
        assert_eq!(flags, AlertFlags::TEMP_CRIT);
    }

    #[test]
    fn boundaries_are_inclusive() {
        let t = Thresholds::default();
        assert_eq!(evaluate(&sample(2.0, 25.0, 50), &t), AlertFlags::VIBRATION_WARN);
        assert_eq!(evaluate(&sample(4.0, 25.0, 50), &t), AlertFlags::VIBRATION_CRIT);
        assert_eq!(evaluate(&sample(0.0, 60.0, 50), &t), AlertFlags::TEMP_WARN);
        assert_eq!(evaluate(&sample(0.0, 25.0, 20), &t), AlertFlags::BATTERY_LOW);
        assert!(evaluate(&sample(0.0, 25.0, 21), &t).is_empty());
    }

    #[test]
    fn signals_are_additive() {
        let flags = evaluate(&sample(3.0, 90.0, 5), &Thresholds::default());
        assert_eq!(
            flags,
            AlertFlags::VIBRATION_WARN | AlertFlags::TEMP_CRIT | AlertFlags::BATTERY_LOW
        );
    }

    #[test]
    fn nan_raises_nothing() {
        let flags = evaluate(&sample(f32::NAN, f32::NAN, 50), &Thresholds::default());
        assert!(flags.is_empty());
    }

    #[test]
    fn engine_does_not_latch() {
        let mut engine = AlertEngine::new();
        let t = Thresholds::default();

        assert_eq!(engine.evaluate(&sample(5.0, 25.0, 50), &t, true), AlertFlags::VIBRATION_CRIT);
        assert!(engine.evaluate(&sample(0.1, 25.0, 50), &t, true).is_empty());
        assert!(engine.active().is_empty());
    }

    #[test]
    fn engine_disabled_suppresses() {
        let mut engine = AlertEngine::new();
        let flags = engine.evaluate(&sample(5.0, 90.0, 1), &Thresholds::default(), false);
        assert!(flags.is_empty());
    }

    #[test]
    fn threshold_validation() {
        assert!(Thresholds::default().validate().is_ok());

        let mut t = Thresholds::default();
        t.vibration_warning = 5.0;
        assert!(matches!(
            t.validate(),
            Err(ConfigError::ThresholdOrder { signal: "vibration", .. })
        ));

        let mut t = Thresholds::default();
        t.temp_warning = f32::NAN;
        assert!(t.validate().is_err());

        let mut t = Thresholds::default();
        t.battery_low_percent = 101;
        assert_eq!(t.validate(), Err(ConfigError::BatteryThreshold(101)));
    }

    #[test]
    fn level_ordering() {
        assert!(AlertLevel::Critical > AlertLevel::Warning);
        assert_eq!(level_for_value(1.0, 2.0, 4.0), AlertLevel::Normal);
    }
}
