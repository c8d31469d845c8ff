//! Wireless Link Constants
//!
//! Transfer-unit sizes and the connection parameters requested when a client
//! attaches. Intervals are in milliseconds; the stack adapter converts them
//! to its native units (1.25 ms / 10 ms steps).

/// Transfer unit every connection starts with (bytes).
pub const DEFAULT_MTU: u16 = 23;

/// Largest transfer unit the device offers during negotiation (bytes).
pub const LOCAL_MAX_MTU: u16 = 517;

/// Protocol header carried by every notification (bytes).
///
/// Usable payload is `mtu - ATT_HEADER_LEN`.
pub const ATT_HEADER_LEN: usize = 3;

/// Minimum connection interval requested on connect (ms).
pub const CONN_INTERVAL_MIN_MS: f32 = 7.5;

/// Maximum connection interval requested on connect (ms).
pub const CONN_INTERVAL_MAX_MS: f32 = 20.0;

/// Peripheral latency requested on connect (connection events).
pub const CONN_LATENCY: u16 = 0;

/// Supervision timeout requested on connect (ms).
///
/// A peer silent for longer than this is considered gone and the stack
/// reports a disconnect.
pub const SUPERVISION_TIMEOUT_MS: u32 = 4000;
