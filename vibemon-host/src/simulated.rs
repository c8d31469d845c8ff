//! Simulated sensor board
//!
//! Produces readings shaped like a machine at work: gravity on the mounting
//! axis, a running component at the shaft frequency, uniform noise, a
//! slowly warming housing and a draining battery. Faults can be injected at a
//! fixed probability to exercise the partial-sample path.
//!
//! Seeded, so a run can be reproduced exactly.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vibemon_core::constants::sensors::{BATTERY_EMPTY_VOLTAGE, BATTERY_FULL_VOLTAGE};
use vibemon_core::errors::{SensorError, SensorKind};
use vibemon_core::sample::SensorSample;
use vibemon_core::time::{SystemTime, TimeSource};
use vibemon_core::traits::SensorProducer;

/// Shape of the simulated signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    /// Running component amplitude (g)
    pub amplitude: f32,
    /// Shaft frequency (Hz)
    pub frequency: f32,
    /// Uniform noise amplitude (g)
    pub noise: f32,
    /// Housing temperature at start (°C)
    pub base_temperature: f32,
    /// Temperature rise per reading (°C)
    pub warming: f32,
    /// Battery drop per reading (V)
    pub drain: f32,
    /// Probability that a reading fails
    pub fault_rate: f64,
    /// Simulated time between readings (s)
    pub step: f32,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            amplitude: 0.3,
            frequency: 24.7,
            noise: 0.02,
            base_temperature: 32.0,
            warming: 0.0,
            drain: 0.0,
            fault_rate: 0.0,
            step: 0.1,
        }
    }
}

pub struct SimulatedSensor<C = SystemTime> {
    profile: Profile,
    rng: StdRng,
    clock: C,
    index: u32,
    temperature: f32,
    voltage: f32,
}

impl SimulatedSensor<SystemTime> {
    /// Default profile, stamped with wall-clock time
    pub fn new(seed: u64) -> Self {
        Self::with_clock(seed, SystemTime)
    }
}

impl<C: TimeSource> SimulatedSensor<C> {
    pub fn with_clock(seed: u64, clock: C) -> Self {
        let profile = Profile::default();
        Self {
            temperature: profile.base_temperature,
            voltage: BATTERY_FULL_VOLTAGE,
            profile,
            rng: StdRng::seed_from_u64(seed),
            clock,
            index: 0,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.temperature = profile.base_temperature;
        self.profile = profile;
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Change the signal without restarting the run
    pub fn set_profile(&mut self, profile: Profile) {
        self.profile = profile;
    }

    /// Readings produced so far
    pub fn readings(&self) -> u32 {
        self.index
    }

    fn noise(&mut self) -> f32 {
        if self.profile.noise > 0.0 {
            self.rng.gen_range(-self.profile.noise..=self.profile.noise)
        } else {
            0.0
        }
    }

    fn fault(&mut self) -> Option<SensorKind> {
        if self.profile.fault_rate <= 0.0 || !self.rng.gen_bool(self.profile.fault_rate.min(1.0)) {
            return None;
        }
        Some(match self.rng.gen_range(0..3) {
            0 => SensorKind::Motion,
            1 => SensorKind::Thermometer,
            _ => SensorKind::Battery,
        })
    }
}

impl<C: TimeSource> SensorProducer for SimulatedSensor<C> {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        let t = self.index as f32 * self.profile.step;
        self.index = self.index.wrapping_add(1);

        let running = self.profile.amplitude * (2.0 * PI * self.profile.frequency * t).sin();
        let (nx, ny, nz) = (self.noise(), self.noise(), self.noise());
        let (gx, gy, gz) = (self.noise(), self.noise(), self.noise());

        self.temperature += self.profile.warming;
        self.voltage = (self.voltage - self.profile.drain).max(BATTERY_EMPTY_VOLTAGE);

        let mut sample = SensorSample::new(self.clock.now())
            .with_accel(running + nx, ny, 1.0 + nz)
            .with_gyro(gx * 10.0, gy * 10.0, gz * 10.0)
            .with_temperature(self.temperature + self.noise())
            .with_battery_voltage(self.voltage);

        match self.fault() {
            None => Ok(sample),
            Some(SensorKind::Motion) if self.rng.gen_bool(0.5) => {
                Err(SensorError::Unavailable(SensorKind::Motion))
            }
            Some(kind) => {
                match kind {
                    SensorKind::Motion => {
                        sample = sample.with_accel(0.0, 0.0, 0.0).with_gyro(0.0, 0.0, 0.0);
                    }
                    SensorKind::Thermometer => sample.temperature = 0.0,
                    SensorKind::Battery => {
                        sample.battery_voltage = 0.0;
                        sample.battery_level = 0;
                    }
                }
                Err(SensorError::Partial(kind, sample))
            }
        }
    }
}
