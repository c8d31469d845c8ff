//! Device health counters
//!
//! Written by the sampling and dispatch tasks, read by anyone (status
//! characteristic, host logs, tests). All counters saturate at `u32::MAX`
//! instead of wrapping so they stay monotonic.

use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Live counters
#[derive(Debug)]
pub struct DeviceStatus {
    readings: AtomicU32,
    sensor_errors: AtomicU32,
    samples_dropped: AtomicU32,
    frames_sent: AtomicU32,
    send_failures: AtomicU32,
    frames_saturated: AtomicU32,
    offline_buffered: AtomicU32,
    storage_failures: AtomicU32,
    samples_discarded: AtomicU32,
}

/// Point-in-time copy of [`DeviceStatus`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusSnapshot {
    /// Samples produced by the sampler
    pub readings: u32,
    /// Samples flagged with `SENSOR_ERROR`
    pub sensor_errors: u32,
    /// Samples rejected by a full queue
    pub samples_dropped: u32,
    /// Frames accepted by the wireless stack
    pub frames_sent: u32,
    /// Frames the stack refused or had no buffer for
    pub send_failures: u32,
    /// Frames with at least one saturated field
    pub frames_saturated: u32,
    /// Samples handed to the offline store
    pub offline_buffered: u32,
    /// Samples the offline store rejected
    pub storage_failures: u32,
    /// Samples discarded in service mode
    pub samples_discarded: u32,
}

fn bump(counter: &AtomicU32) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_add(1));
}

impl DeviceStatus {
    pub const fn new() -> Self {
        Self {
            readings: AtomicU32::new(0),
            sensor_errors: AtomicU32::new(0),
            samples_dropped: AtomicU32::new(0),
            frames_sent: AtomicU32::new(0),
            send_failures: AtomicU32::new(0),
            frames_saturated: AtomicU32::new(0),
            offline_buffered: AtomicU32::new(0),
            storage_failures: AtomicU32::new(0),
            samples_discarded: AtomicU32::new(0),
        }
    }

    pub fn record_reading(&self) {
        bump(&self.readings);
    }

    pub fn record_sensor_error(&self) {
        bump(&self.sensor_errors);
    }

    pub fn record_dropped(&self) {
        bump(&self.samples_dropped);
    }

    pub fn record_sent(&self) {
        bump(&self.frames_sent);
    }

    pub fn record_send_failure(&self) {
        bump(&self.send_failures);
    }

    pub fn record_saturated(&self) {
        bump(&self.frames_saturated);
    }

    pub fn record_buffered(&self) {
        bump(&self.offline_buffered);
    }

    pub fn record_storage_failure(&self) {
        bump(&self.storage_failures);
    }

    pub fn record_discarded(&self) {
        bump(&self.samples_discarded);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            readings: self.readings.load(Ordering::Relaxed),
            sensor_errors: self.sensor_errors.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            frames_saturated: self.frames_saturated.load(Ordering::Relaxed),
            offline_buffered: self.offline_buffered.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            samples_discarded: self.samples_discarded.load(Ordering::Relaxed),
        }
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::new()
    }
}
