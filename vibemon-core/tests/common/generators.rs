//! Vibration signal generators
//!
//! Produce accelerometer readings with the shapes seen on real machines:
//! - Gravity on a fixed mounting axis
//! - A sinusoidal running component at the shaft frequency
//! - Bearing-defect impacts (short spikes at a fixed period)
//! - Deterministic pseudo-random noise

use std::f32::consts::PI;

use vibemon_core::sample::SensorSample;

/// Deterministic accelerometer stream
pub struct VibrationGenerator {
    /// Sample rate (Hz)
    pub sample_rate: f32,
    /// Running component amplitude (g)
    pub amplitude: f32,
    /// Running frequency (Hz)
    pub frequency: f32,
    /// Impact amplitude (g), 0 for none
    pub impact: f32,
    /// Samples between impacts
    pub impact_period: u32,
    /// Noise amplitude (g)
    pub noise: f32,
    index: u32,
    seed: u32,
}

impl VibrationGenerator {
    pub fn new(sample_rate: f32, amplitude: f32, frequency: f32) -> Self {
        Self {
            sample_rate,
            amplitude,
            frequency,
            impact: 0.0,
            impact_period: 0,
            noise: 0.0,
            index: 0,
            seed: 42,
        }
    }

    pub fn with_impacts(mut self, impact: f32, period: u32) -> Self {
        self.impact = impact;
        self.impact_period = period;
        self
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    /// Linear congruential generator in [-1, 1]
    fn next_noise(&mut self) -> f32 {
        self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        ((self.seed >> 16) & 0x7FFF) as f32 / 16_383.5 - 1.0
    }

    /// Next sample, stamped one second apart
    pub fn next_sample(&mut self) -> SensorSample {
        let t = self.index as f32 / self.sample_rate;
        let mut x = self.amplitude * (2.0 * PI * self.frequency * t).sin();

        if self.impact_period > 0 && self.index % self.impact_period == self.impact_period - 1 {
            x += self.impact;
        }
        let noise = self.noise * self.next_noise();

        let sample = SensorSample::new(self.index)
            .with_accel(x + noise, noise, 1.0)
            .with_temperature(35.0)
            .with_battery_level(90);
        self.index += 1;
        sample
    }

    pub fn take(&mut self, count: usize) -> Vec<SensorSample> {
        (0..count).map(|_| self.next_sample()).collect()
    }
}
