//! Buffer Sizes and Memory Constraints
//!
//! Everything on the device is statically sized; these are the sizes.

// ===== TELEMETRY QUEUE =====

/// Telemetry queue capacity (samples).
///
/// 20 samples × 48 bytes = 960 bytes of RAM. At the default 1 Hz cadence this
/// covers 20 seconds of dispatcher stall before samples are dropped.
pub const TELEMETRY_QUEUE_CAPACITY: usize = 20;

// ===== OFFLINE STORE =====

/// Maximum readings kept by the offline store.
///
/// A little over 16 minutes at 1 Hz. Further records are rejected with
/// `StorageError::Full` until the store is flushed.
pub const MAX_BUFFERED_READINGS: u32 = 1000;

// ===== FRAMES =====

/// Size of an encoded telemetry frame (bytes).
///
/// Fits the default 23-byte transfer unit minus the 3-byte ATT header, so
/// a frame never needs fragmentation.
pub const TELEMETRY_FRAME_LEN: usize = 20;

/// Largest inbound write accepted on the control channel (bytes).
pub const MAX_CONTROL_PAYLOAD: usize = 20;

// ===== DEVICE IDENTITY =====

/// Longest advertised device name (bytes).
///
/// The advertising payload is 31 bytes; the name never needs more.
pub const MAX_DEVICE_NAME_LEN: usize = 31;

/// Prefix of the default device name.
pub const DEVICE_NAME_PREFIX: &str = "VibeMon_";
