//! Shared device state
//!
//! Everything the sampling task, the dispatch task and the session manager
//! share lives in one [`DeviceContext`]. It is const-constructible, so
//! firmware places it in a `static`; the host leaks one to get a
//! `&'static` reference. Tasks only ever receive shared references.
//!
//! ```text
//!                  ┌──────────────── DeviceContext ────────────────┐
//!  Sampler ───────▶│ queue (producer half)                         │
//!                  │ queue (consumer half) ◀──────────── Dispatcher│
//!  SessionManager ▶│ session cell ──────────── snapshot ─▶ Dispatcher
//!  SessionManager ▶│ control requests ──────── take ─────▶ Sampler │
//!                  │ status counters ◀──── everyone                │
//!                  └───────────────────────────────────────────────┘
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use crate::constants::buffers::TELEMETRY_QUEUE_CAPACITY;
use crate::queue::TelemetryQueue;
use crate::sample::SensorSample;
use crate::session::SessionCell;
use crate::status::DeviceStatus;

/// One-shot requests from the session side to the sampling side
///
/// The gravity estimate is owned by the sampling task, so the session manager
/// cannot reset it directly. It raises a flag instead and the sampler applies
/// it before its next reading.
#[derive(Debug)]
pub struct ControlRequests {
    recalibrate: AtomicBool,
    reset_peak: AtomicBool,
}

impl ControlRequests {
    pub const fn new() -> Self {
        Self {
            recalibrate: AtomicBool::new(false),
            reset_peak: AtomicBool::new(false),
        }
    }

    /// Ask for the gravity estimate and peak to be rebuilt
    pub fn request_recalibration(&self) {
        self.recalibrate.store(true, Ordering::Release);
    }

    /// Ask for the running peak to be cleared
    pub fn request_peak_reset(&self) {
        self.reset_peak.store(true, Ordering::Release);
    }

    /// Consume a pending recalibration request
    pub fn take_recalibration(&self) -> bool {
        self.recalibrate.swap(false, Ordering::AcqRel)
    }

    /// Consume a pending peak reset request
    pub fn take_peak_reset(&self) -> bool {
        self.reset_peak.swap(false, Ordering::AcqRel)
    }
}

impl Default for ControlRequests {
    fn default() -> Self {
        Self::new()
    }
}

/// The device's long-lived shared state
pub struct DeviceContext<const N: usize = TELEMETRY_QUEUE_CAPACITY> {
    pub queue: TelemetryQueue<SensorSample, N>,
    pub session: SessionCell,
    pub requests: ControlRequests,
    pub status: DeviceStatus,
}

impl<const N: usize> DeviceContext<N> {
    pub const fn new() -> Self {
        Self {
            queue: TelemetryQueue::new(),
            session: SessionCell::new(),
            requests: ControlRequests::new(),
            status: DeviceStatus::new(),
        }
    }
}

impl<const N: usize> Default for DeviceContext<N> {
    fn default() -> Self {
        Self::new()
    }
}
