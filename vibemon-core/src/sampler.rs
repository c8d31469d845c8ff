//! Sampling task
//!
//! Producer side of the pipeline. Once per sampling period:
//!
//! ```text
//! pending requests ─▶ sensor read ─▶ vibration ─▶ alerts ─▶ queue
//!  (recalibrate,        (partial       (gravity     (flags)   (drop-newest
//!   reset peak)          allowed)       filter)                on full)
//! ```
//!
//! A sensor fault never suppresses a sample: the sample is still emitted
//! with `SENSOR_ERROR` set so the client sees the gap. The gravity filter is
//! only fed with accelerometer data that is known to be good.

use crate::alerts::AlertEngine;
use crate::context::{ControlRequests, DeviceContext};
use crate::errors::{QueueFull, SensorError, SensorKind};
use crate::queue::QueueProducer;
use crate::sample::{AlertFlags, SensorSample};
use crate::status::DeviceStatus;
use crate::time::TimeSource;
use crate::traits::{ConfigProvider, SensorProducer};
use crate::vibration::VibrationProcessor;

/// Producer side of the pipeline
pub struct Sampler<'a, P, C, const N: usize> {
    producer: QueueProducer<'a, SensorSample, N>,
    requests: &'a ControlRequests,
    status: &'a DeviceStatus,
    sensor: P,
    clock: C,
    vibration: VibrationProcessor,
    alerts: AlertEngine,
}

impl<'a, P, C, const N: usize> Sampler<'a, P, C, N>
where
    P: SensorProducer,
    C: TimeSource,
{
    pub fn new(
        context: &'a DeviceContext<N>,
        producer: QueueProducer<'a, SensorSample, N>,
        sensor: P,
        clock: C,
    ) -> Self {
        Self {
            producer,
            requests: &context.requests,
            status: &context.status,
            sensor,
            clock,
            vibration: VibrationProcessor::new(),
            alerts: AlertEngine::new(),
        }
    }

    /// Replace the vibration processor (custom smoothing factor)
    pub fn with_processor(mut self, vibration: VibrationProcessor) -> Self {
        self.vibration = vibration;
        self
    }

    pub fn sensor(&self) -> &P {
        &self.sensor
    }

    pub fn vibration(&self) -> &VibrationProcessor {
        &self.vibration
    }

    /// Take, process and enqueue one sample
    ///
    /// Returns the sample as enqueued. A full queue drops the sample, which
    /// is reported as `Err(QueueFull)` after being logged and counted.
    pub fn sample_once<K: ConfigProvider>(&mut self, config: &K) -> Result<SensorSample, QueueFull> {
        self.apply_requests();

        let (mut sample, fault) = match self.sensor.read_sample() {
            Ok(sample) => (sample, None),
            Err(SensorError::Partial(kind, sample)) => (sample, Some(kind)),
            Err(SensorError::Unavailable(kind)) => (SensorSample::new(self.clock.now()), Some(kind)),
        };

        let mut sensor_error = fault.is_some();
        if let Some(kind) = fault {
            log_warn!("Sensor fault at {}: {}", sample.timestamp, kind);
        }

        // Accelerometer data from a failed motion read is zero, not real
        let motion_ok = !matches!(fault, Some(SensorKind::Motion));
        let metrics = if motion_ok {
            self.vibration.process(sample.accel)
        } else {
            None
        };

        match metrics {
            Some(m) => {
                sample.vibration_rms = m.rms;
                sample.vibration_peak = m.peak;
            }
            None => {
                if motion_ok {
                    log_warn!("Non-finite acceleration at {}", sample.timestamp);
                    sensor_error = true;
                }
                sample.vibration_rms = 0.0;
                sample.vibration_peak = self.vibration.peak();
            }
        }

        sample.flags = self
            .alerts
            .evaluate(&sample, &config.thresholds(), config.alerts_enabled());
        if sensor_error {
            sample.flags |= AlertFlags::SENSOR_ERROR;
            self.status.record_sensor_error();
        }

        self.status.record_reading();

        match self.producer.enqueue(sample) {
            Ok(()) => Ok(sample),
            Err(e) => {
                self.status.record_dropped();
                log_warn!("Sample {} dropped: {}", sample.timestamp, e);
                Err(e)
            }
        }
    }

    fn apply_requests(&mut self) {
        if self.requests.take_recalibration() {
            self.vibration.recalibrate();
            log_info!("Gravity estimate reset");
        }
        if self.requests.take_peak_reset() {
            self.vibration.reset_peak();
        }
    }
}
