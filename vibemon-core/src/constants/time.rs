//! Time-Related Constants
//!
//! Sampling and dispatch cadences of the device.

// ===== SAMPLING INTERVALS =====

/// Default sensor sampling interval (milliseconds).
///
/// 1 Hz is enough to follow bearing temperature and slow changes in
/// vibration severity while keeping the radio mostly idle.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u32 = 1000;

/// Fast sampling preset (milliseconds).
///
/// 10 Hz, used while commissioning a sensor or chasing a transient.
pub const FAST_SAMPLE_INTERVAL_MS: u32 = 100;

/// Slow sampling preset (milliseconds).
///
/// 0.2 Hz for long unattended deployments on battery.
pub const SLOW_SAMPLE_INTERVAL_MS: u32 = 5000;

/// Shortest accepted sampling interval (milliseconds).
pub const MIN_SAMPLE_INTERVAL_MS: u32 = FAST_SAMPLE_INTERVAL_MS;

/// Longest accepted sampling interval (milliseconds).
pub const MAX_SAMPLE_INTERVAL_MS: u32 = 60_000;

// ===== DISPATCH =====

/// Dispatcher tick period (milliseconds).
///
/// At one frame per tick this gives 100 frames/s of headroom over the
/// fastest sampling preset, so a connected client drains a full queue in
/// 200 ms.
pub const DISPATCH_INTERVAL_MS: u32 = 10;
