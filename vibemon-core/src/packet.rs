//! Fixed-Layout Telemetry Frame
//!
//! ## Wire Format
//!
//! One sample becomes one 20-byte little-endian frame, sized so it fits a
//! single notification at the default transfer unit:
//!
//! ```text
//! offset  size  field          encoding
//! ──────  ────  ─────────────  ───────────────────────────
//!      0     4  timestamp      u32 seconds
//!      4     2  accel_x        i16 milli-g
//!      6     2  accel_y        i16 milli-g
//!      8     2  accel_z        i16 milli-g
//!     10     2  temperature    i16 centi-°C
//!     12     1  battery_level  u8 percent
//!     13     1  flags          alert bitmask
//!     14     6  reserved       zero
//! ```
//!
//! ## Scaling
//!
//! Scaled values are truncated toward zero and saturated to ±32767; they
//! never wrap. NaN encodes as 0. Saturation is reported to the caller by
//! [`encode_with_report`] rather than in the frame, so the reserved bytes
//! stay zero for every peer.

use crate::constants::buffers::TELEMETRY_FRAME_LEN;
use crate::errors::FrameError;
use crate::sample::{AlertFlags, SensorSample};
use crate::time::Timestamp;

/// Encoded frame size in bytes
pub const FRAME_LEN: usize = TELEMETRY_FRAME_LEN;

const ACCEL_SCALE: f32 = 1000.0;
const TEMP_SCALE: f32 = 100.0;
const SCALED_MAX: i16 = i16::MAX;

/// Fields that did not fit their wire encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaturatedFields(u8);

impl SaturatedFields {
    pub const ACCEL_X: Self = Self(0x01);
    pub const ACCEL_Y: Self = Self(0x02);
    pub const ACCEL_Z: Self = Self(0x04);
    pub const TEMPERATURE: Self = Self(0x08);

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    fn mark(&mut self, field: Self, saturated: bool) {
        if saturated {
            self.0 |= field.0;
        }
    }
}

/// Frame plus the encoding report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFrame {
    pub bytes: [u8; FRAME_LEN],
    pub saturated: SaturatedFields,
}

/// Decoded frame contents in engineering units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub timestamp: Timestamp,
    /// Acceleration (g), milli-g resolution
    pub accel: [f32; 3],
    /// Temperature (°C), centi-degree resolution
    pub temperature: f32,
    pub battery_level: u8,
    pub flags: AlertFlags,
}

/// Scale, truncate toward zero and saturate. Returns the value and whether it saturated.
#[inline]
fn scale(value: f32, factor: f32) -> (i16, bool) {
    if value.is_nan() {
        return (0, false);
    }

    let scaled = libm::truncf(value * factor);
    if scaled > SCALED_MAX as f32 {
        (SCALED_MAX, true)
    } else if scaled < -(SCALED_MAX as f32) {
        (-SCALED_MAX, true)
    } else {
        (scaled as i16, false)
    }
}

/// Encode a sample into its wire frame
#[inline]
pub fn encode(sample: &SensorSample) -> [u8; FRAME_LEN] {
    encode_with_report(sample).bytes
}

/// Encode a sample and report which fields saturated
pub fn encode_with_report(sample: &SensorSample) -> EncodedFrame {
    let mut bytes = [0u8; FRAME_LEN];
    let mut saturated = SaturatedFields::default();

    bytes[0..4].copy_from_slice(&sample.timestamp.to_le_bytes());

    let axes = [
        (sample.accel.x, SaturatedFields::ACCEL_X),
        (sample.accel.y, SaturatedFields::ACCEL_Y),
        (sample.accel.z, SaturatedFields::ACCEL_Z),
    ];
    for (i, (value, field)) in axes.into_iter().enumerate() {
        let (raw, sat) = scale(value, ACCEL_SCALE);
        saturated.mark(field, sat);
        let offset = 4 + i * 2;
        bytes[offset..offset + 2].copy_from_slice(&raw.to_le_bytes());
    }

    let (raw, sat) = scale(sample.temperature, TEMP_SCALE);
    saturated.mark(SaturatedFields::TEMPERATURE, sat);
    bytes[10..12].copy_from_slice(&raw.to_le_bytes());

    bytes[12] = sample.battery_level;
    bytes[13] = sample.flags.bits();
    // 14..20 reserved

    EncodedFrame { bytes, saturated }
}

/// Decode a wire frame
pub fn decode(bytes: &[u8]) -> Result<TelemetryFrame, FrameError> {
    let frame: &[u8; FRAME_LEN] = bytes.try_into().map_err(|_| FrameError::Length {
        expected: FRAME_LEN,
        actual: bytes.len(),
    })?;

    let i16_at = |offset: usize| i16::from_le_bytes([frame[offset], frame[offset + 1]]);

    Ok(TelemetryFrame {
        timestamp: u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]),
        accel: [
            i16_at(4) as f32 / ACCEL_SCALE,
            i16_at(6) as f32 / ACCEL_SCALE,
            i16_at(8) as f32 / ACCEL_SCALE,
        ],
        temperature: i16_at(10) as f32 / TEMP_SCALE,
        battery_level: frame[12],
        flags: AlertFlags::from_bits_truncate(frame[13]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resting_sample_layout() {
        let sample = SensorSample::new(0)
            .with_accel(0.0, 0.0, 1.0)
            .with_temperature(25.0)
            .with_battery_level(50);

        let frame = encode(&sample);
        assert_eq!(&frame[4..10], &[0x00, 0x00, 0x00, 0x00, 0xE8, 0x03]);
        assert_eq!(&frame[10..12], &2500i16.to_le_bytes());
        assert_eq!(frame[12], 50);
        assert_eq!(frame[13], 0);
        assert_eq!(&frame[14..], &[0u8; 6]);
    }

    #[test]
    fn timestamp_little_endian() {
        let frame = encode(&SensorSample::new(0x1234_5678));
        assert_eq!(&frame[0..4], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let sample = SensorSample::new(0)
            .with_accel(40.0, -40.0, 0.5)
            .with_temperature(400.0);

        let encoded = encode_with_report(&sample);
        assert_eq!(&encoded.bytes[4..6], &32767i16.to_le_bytes());
        assert_eq!(&encoded.bytes[6..8], &(-32767i16).to_le_bytes());
        assert_eq!(&encoded.bytes[8..10], &500i16.to_le_bytes());
        assert_eq!(&encoded.bytes[10..12], &32767i16.to_le_bytes());

        assert!(encoded.saturated.contains(SaturatedFields::ACCEL_X));
        assert!(encoded.saturated.contains(SaturatedFields::ACCEL_Y));
        assert!(!encoded.saturated.contains(SaturatedFields::ACCEL_Z));
        assert!(encoded.saturated.contains(SaturatedFields::TEMPERATURE));
        assert_eq!(&encoded.bytes[14..], &[0u8; 6]);
    }

    #[test]
    fn truncates_toward_zero() {
        let sample = SensorSample::new(0)
            .with_accel(0.0015, -0.0015, 0.0)
            .with_temperature(-0.019);
        let frame = decode(&encode(&sample)).unwrap();
        assert_eq!(frame.accel, [0.001, -0.001, 0.0]);
        assert_eq!(frame.temperature, -0.01);
    }

    #[test]
    fn nan_encodes_as_zero() {
        let sample = SensorSample::new(0)
            .with_accel(f32::NAN, 0.0, 0.0)
            .with_temperature(f32::NAN);
        let encoded = encode_with_report(&sample);
        assert_eq!(&encoded.bytes[4..6], &[0, 0]);
        assert_eq!(&encoded.bytes[10..12], &[0, 0]);
        assert!(encoded.saturated.is_empty());
    }

    #[test]
    fn flags_byte() {
        let mut sample = SensorSample::new(0);
        sample.flags = AlertFlags::TEMP_CRIT | AlertFlags::SENSOR_ERROR;
        let frame = encode(&sample);
        assert_eq!(frame[13], 0x28);
        assert_eq!(decode(&frame).unwrap().flags, sample.flags);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(
            decode(&[0u8; 19]),
            Err(FrameError::Length { expected: 20, actual: 19 })
        );
        assert!(decode(&[0u8; 21]).is_err());
    }
}
