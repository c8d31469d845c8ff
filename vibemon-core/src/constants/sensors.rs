//! Sensor Characteristics and Default Alert Levels
//!
//! Values for the accelerometer, the bearing thermometer and the single-cell
//! LiPo battery the device runs on.

// ===== VIBRATION =====

/// Smoothing factor of the gravity estimate.
///
/// Time constant of about 100 samples (100 s at 1 Hz): slow enough that
/// machine vibration does not leak into the estimate, fast enough to follow
/// a sensor that was re-mounted at a different angle.
pub const GRAVITY_FILTER_ALPHA: f64 = 0.99;

/// Default vibration warning level (g).
///
/// Roughly the ISO 10816 "unsatisfactory" zone for a medium machine on a
/// rigid foundation.
pub const VIBRATION_WARNING_G: f32 = 2.0;

/// Default vibration critical level (g).
pub const VIBRATION_CRITICAL_G: f32 = 4.0;

// ===== TEMPERATURE =====

/// Default temperature warning level (°C).
///
/// Bearing housings normally run 20-40°C above ambient.
pub const TEMP_WARNING_C: f32 = 60.0;

/// Default temperature critical level (°C).
pub const TEMP_CRITICAL_C: f32 = 80.0;

// ===== BATTERY =====

/// Cell voltage reported as 100% (V).
pub const BATTERY_FULL_VOLTAGE: f32 = 4.2;

/// Cell voltage reported as 0% (V).
///
/// The protection circuit cuts off shortly below this.
pub const BATTERY_EMPTY_VOLTAGE: f32 = 3.0;

/// Default low-battery alert level (%).
pub const BATTERY_LOW_PERCENT: u8 = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_below_critical() {
        assert!(VIBRATION_WARNING_G < VIBRATION_CRITICAL_G);
        assert!(TEMP_WARNING_C < TEMP_CRITICAL_C);
        assert!(BATTERY_LOW_PERCENT <= 100);
    }

    #[test]
    fn filter_alpha_is_a_fraction() {
        assert!(GRAVITY_FILTER_ALPHA > 0.0 && GRAVITY_FILTER_ALPHA < 1.0);
    }
}
