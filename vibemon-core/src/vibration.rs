//! Vibration Signal Processing
//!
//! ## Overview
//!
//! A mounted accelerometer measures gravity plus machine vibration. To get
//! the vibration alone the processor tracks gravity with a per-axis
//! exponentially weighted moving average and subtracts it:
//!
//! ```text
//! g' = α·g + (1 − α)·a          (α = 0.99)
//! d  = a − g'
//! |d| = sqrt(dx² + dy² + dz²)
//! ```
//!
//! The first sample after (re)initialization seeds `g = a`, so the first
//! magnitude is exactly zero. A constant input drives the magnitude towards
//! zero geometrically (factor α per sample).
//!
//! `vibration_rms` in a sample is this instantaneous magnitude; the name
//! follows the telemetry field it fills. [`VibrationStats`] provides a true
//! RMS over a window of samples.
//!
//! ## Numerical Safety
//!
//! Inputs are `f32`, but the filter state and the magnitude are carried in
//! `f64`: squaring a component near `f32::MAX` would overflow in `f32`. The
//! result is clamped to `f32::MAX`. Non-finite inputs are rejected without
//! touching the estimate, so one corrupt reading cannot poison the filter.

use crate::constants::sensors::GRAVITY_FILTER_ALPHA;
use crate::sample::{Axis3, SensorSample};

/// Output of one processing step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VibrationMetrics {
    /// Dynamic acceleration magnitude (g)
    pub rms: f32,
    /// Running maximum of `rms` since the last reset (g)
    pub peak: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Gravity {
    x: f64,
    y: f64,
    z: f64,
}

/// Gravity-compensated vibration magnitude with a running peak
///
/// Owned by the sampling task; no other task touches the estimate.
#[derive(Debug, Clone)]
pub struct VibrationProcessor {
    alpha: f64,
    gravity: Option<Gravity>,
    peak: f32,
}

impl VibrationProcessor {
    /// Processor with the default smoothing factor
    pub const fn new() -> Self {
        Self::with_alpha(GRAVITY_FILTER_ALPHA)
    }

    /// Processor with a custom smoothing factor in `(0, 1)`
    pub const fn with_alpha(alpha: f64) -> Self {
        Self {
            alpha,
            gravity: None,
            peak: 0.0,
        }
    }

    /// Feed one acceleration reading
    ///
    /// Returns `None` when any component is non-finite; the estimate and the
    /// peak are left untouched in that case.
    pub fn process(&mut self, accel: Axis3) -> Option<VibrationMetrics> {
        if !accel.is_finite() {
            return None;
        }

        let a = Gravity {
            x: accel.x as f64,
            y: accel.y as f64,
            z: accel.z as f64,
        };

        let g = match self.gravity {
            Some(prev) => Gravity {
                x: self.alpha * prev.x + (1.0 - self.alpha) * a.x,
                y: self.alpha * prev.y + (1.0 - self.alpha) * a.y,
                z: self.alpha * prev.z + (1.0 - self.alpha) * a.z,
            },
            None => a,
        };
        self.gravity = Some(g);

        let (dx, dy, dz) = (a.x - g.x, a.y - g.y, a.z - g.z);
        let magnitude = libm::sqrt(dx * dx + dy * dy + dz * dz);
        let rms = if magnitude >= f32::MAX as f64 {
            f32::MAX
        } else {
            magnitude as f32
        };

        if rms > self.peak {
            self.peak = rms;
        }

        Some(VibrationMetrics { rms, peak: self.peak })
    }

    /// Forget the gravity estimate and the peak
    ///
    /// The next sample reseeds the estimate.
    pub fn recalibrate(&mut self) {
        self.gravity = None;
        self.peak = 0.0;
    }

    /// Clear the running peak only
    pub fn reset_peak(&mut self) {
        self.peak = 0.0;
    }

    /// Current peak (g)
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Current gravity estimate, if seeded
    pub fn gravity(&self) -> Option<Axis3> {
        self.gravity
            .map(|g| Axis3::new(g.x as f32, g.y as f32, g.z as f32))
    }

    pub fn is_seeded(&self) -> bool {
        self.gravity.is_some()
    }
}

impl Default for VibrationProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Window statistics over processed samples
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VibrationStats {
    /// Root mean square of the per-sample magnitudes (g)
    pub rms: f32,
    /// Largest per-sample magnitude (g)
    pub peak: f32,
    /// `peak / rms`; 0 when `rms` is 0
    pub crest_factor: f32,
    /// Samples in the window
    pub count: usize,
}

impl VibrationStats {
    /// Summarize a window of samples
    ///
    /// An empty window yields all zeros.
    pub fn from_samples(samples: &[SensorSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sum_sq = 0.0f64;
        let mut peak = 0.0f32;
        for sample in samples {
            let v = sample.vibration_rms as f64;
            sum_sq += v * v;
            if sample.vibration_rms > peak {
                peak = sample.vibration_rms;
            }
        }

        let rms = libm::sqrt(sum_sq / samples.len() as f64) as f32;
        let crest_factor = if rms > 0.0 { peak / rms } else { 0.0 };

        Self {
            rms,
            peak,
            crest_factor,
            count: samples.len(),
        }
    }
}
