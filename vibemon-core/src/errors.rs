//! Error Types for the Telemetry Pipeline
//!
//! ## Design Philosophy
//!
//! Errors here follow the same rules as everything else on the hot path:
//!
//! 1. **Small Size**: variants carry a handful of numbers or a `&'static str`.
//!    The one exception is [`SensorError::Partial`], which carries the partial
//!    sample so the pipeline can still emit it.
//!
//! 2. **No Heap Allocation**: nothing here owns a `String`.
//!
//! 3. **Copy Semantics**: every error is `Copy` and can be returned from the
//!    sampling and dispatch tasks without ownership juggling.
//!
//! ## Error Taxonomy
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | [`QueueFull`] | telemetry queue | drop the newest sample, count it |
//! | [`SensorError`] | sensor producer | emit the sample with `SENSOR_ERROR` |
//! | [`StorageError`] | offline store | log, count, move on |
//! | [`LinkError`] | wireless stack | drop the frame, no retry |
//! | [`SessionError`] | session manager | fatal when advertising cannot start |
//! | [`FrameError`] | frame decoder | reject the frame |
//! | [`ConfigError`] | configuration | reject the update |
//!
//! Only [`SessionError::AdvertisingFailed`] is fatal: without discovery the
//! device can never distribute telemetry, so the error is surfaced to whoever
//! owns the restart policy.

use core::fmt;

use thiserror_no_std::Error;

use crate::sample::SensorSample;
use crate::session::SessionState;

/// Returned by the queue producer when all slots are occupied.
///
/// The sample that caused the error is dropped; queued samples are untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Telemetry queue full ({capacity} samples)")]
pub struct QueueFull {
    /// Capacity of the queue that rejected the sample
    pub capacity: usize,
}

/// Physical sensor behind a [`SensorError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// Tri-axis accelerometer / gyroscope
    Motion,
    /// Digital thermometer
    Thermometer,
    /// Battery voltage divider
    Battery,
}

impl SensorKind {
    /// Short human-readable name
    pub const fn name(&self) -> &'static str {
        match self {
            SensorKind::Motion => "motion sensor",
            SensorKind::Thermometer => "thermometer",
            SensorKind::Battery => "battery monitor",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sensor read failures reported by the producer
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SensorError {
    /// One sensor failed but the rest of the sample is usable.
    ///
    /// Fields belonging to the failed sensor are zero.
    #[error("{0} read failed, partial sample kept")]
    Partial(SensorKind, SensorSample),

    /// Nothing could be read this period
    #[error("{0} unavailable")]
    Unavailable(SensorKind),
}

impl SensorError {
    /// Sensor that caused the failure
    pub fn sensor(&self) -> SensorKind {
        match self {
            SensorError::Partial(kind, _) | SensorError::Unavailable(kind) => *kind,
        }
    }
}

/// Offline store failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Store reached its capacity
    #[error("Offline store full ({capacity} records)")]
    Full {
        /// Maximum number of buffered records
        capacity: u32,
    },

    /// Backing medium failed
    #[error("Offline store I/O failure: {reason}")]
    Io {
        reason: &'static str,
    },
}

/// Wireless stack failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No peer attached at the link layer
    #[error("No connected peer")]
    NotConnected,

    /// Payload larger than the negotiated transfer unit allows
    #[error("Payload of {len} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        len: usize,
        limit: usize,
    },

    /// Stack rejected the request with a vendor status code
    #[error("Stack rejected request with status 0x{status:02X}")]
    Rejected {
        status: u8,
    },
}

/// Session manager failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Discovery broadcast could not be started. Fatal for telemetry.
    #[error("Advertising failed to start: {0}")]
    AdvertisingFailed(LinkError),

    /// Request is not valid in the current state
    #[error("Operation not allowed in state {state:?}")]
    InvalidState {
        state: SessionState,
    },

    /// Stack refused a non-fatal request
    #[error("Link request failed: {0}")]
    Link(LinkError),
}

impl SessionError {
    /// Whether the device can no longer distribute telemetry
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::AdvertisingFailed(_))
    }
}

/// Frame decoding failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer length is not the fixed frame size
    #[error("Frame must be {expected} bytes, got {actual}")]
    Length {
        expected: usize,
        actual: usize,
    },
}

/// Configuration validation failures
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// Sampling interval outside the supported range
    #[error("Sample interval {value} ms outside [{min}, {max}]")]
    IntervalOutOfRange {
        value: u32,
        min: u32,
        max: u32,
    },

    /// Warning threshold must be positive and below critical
    #[error("Invalid {signal} thresholds: warning {warning}, critical {critical}")]
    ThresholdOrder {
        signal: &'static str,
        warning: f32,
        critical: f32,
    },

    /// Battery threshold is a percentage
    #[error("Battery threshold {0}% above 100%")]
    BatteryThreshold(u8),

    /// Device name does not fit the advertising buffer
    #[error("Device name longer than {max} bytes")]
    NameTooLong {
        max: usize,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for QueueFull {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Queue full ({})", self.capacity)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LinkError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::NotConnected =>
                defmt::write!(fmt, "Not connected"),
            Self::PayloadTooLarge { len, limit } =>
                defmt::write!(fmt, "Payload {} > {}", len, limit),
            Self::Rejected { status } =>
                defmt::write!(fmt, "Rejected {:#x}", status),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SessionError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::AdvertisingFailed(e) =>
                defmt::write!(fmt, "Advertising failed: {}", e),
            Self::InvalidState { state } =>
                defmt::write!(fmt, "Invalid state {}", state.name()),
            Self::Link(e) =>
                defmt::write!(fmt, "Link: {}", e),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for StorageError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Full { capacity } =>
                defmt::write!(fmt, "Store full ({})", capacity),
            Self::Io { reason } =>
                defmt::write!(fmt, "Store I/O: {}", reason),
        }
    }
}
