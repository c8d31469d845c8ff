//! Constants for VibeMon Core
//!
//! Centralized numeric values used throughout the telemetry pipeline. Every
//! value carries its unit in the name and a short note on where it comes from.
//!
//! ## Organization
//!
//! Constants are grouped by domain:
//! - **Time**: sampling presets and dispatch cadence
//! - **Buffers**: queue, store and frame sizes
//! - **Sensors**: gravity filter, default alert levels, battery curve
//! - **Link**: transfer units and connection parameters
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. Use descriptive names that include units
//! 3. Group related constants together

/// Sampling and dispatch intervals.
pub mod time;

/// Queue, store and frame sizes.
pub mod buffers;

/// Sensor characteristics and default alert levels.
pub mod sensors;

/// Transfer units and connection parameters.
pub mod link;

// Re-export commonly used constants for convenience
pub use time::{
    DEFAULT_SAMPLE_INTERVAL_MS, FAST_SAMPLE_INTERVAL_MS, SLOW_SAMPLE_INTERVAL_MS,
    DISPATCH_INTERVAL_MS,
};

pub use buffers::{
    TELEMETRY_QUEUE_CAPACITY, MAX_BUFFERED_READINGS, TELEMETRY_FRAME_LEN,
};

pub use sensors::{
    VIBRATION_WARNING_G, VIBRATION_CRITICAL_G, TEMP_WARNING_C, TEMP_CRITICAL_C,
    BATTERY_LOW_PERCENT,
};

pub use link::{DEFAULT_MTU, ATT_HEADER_LEN};
