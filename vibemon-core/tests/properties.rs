//! Property tests for the pure parts of the pipeline

use proptest::prelude::*;

use vibemon_core::{
    alerts::{evaluate, Thresholds},
    packet::{decode, encode, encode_with_report},
    sample::{AlertFlags, Axis3, SensorSample},
    vibration::VibrationProcessor,
};

fn in_range_sample() -> impl Strategy<Value = SensorSample> {
    (
        any::<u32>(),
        -32.0f32..32.0,
        -32.0f32..32.0,
        -32.0f32..32.0,
        -300.0f32..300.0,
        0u8..=100,
        0u8..0x40,
    )
        .prop_map(|(ts, x, y, z, temp, battery, flags)| {
            let mut sample = SensorSample::new(ts)
                .with_accel(x, y, z)
                .with_temperature(temp)
                .with_battery_level(battery);
            sample.flags = AlertFlags::from_bits_truncate(flags);
            sample
        })
}

proptest! {
    #[test]
    fn frame_round_trip(sample in in_range_sample()) {
        let encoded = encode_with_report(&sample);
        prop_assert!(encoded.saturated.is_empty());

        let frame = decode(&encoded.bytes).unwrap();
        prop_assert_eq!(frame.timestamp, sample.timestamp);
        prop_assert!((frame.accel[0] - sample.accel.x).abs() <= 0.001 + 1e-5);
        prop_assert!((frame.accel[1] - sample.accel.y).abs() <= 0.001 + 1e-5);
        prop_assert!((frame.accel[2] - sample.accel.z).abs() <= 0.001 + 1e-5);
        prop_assert!((frame.temperature - sample.temperature).abs() <= 0.01 + 1e-4);
        prop_assert_eq!(frame.battery_level, sample.battery_level);
        prop_assert_eq!(frame.flags, sample.flags);
        prop_assert_eq!(&encoded.bytes[14..], &[0u8; 6][..]);
    }

    #[test]
    fn encoding_never_wraps(x in any::<f32>(), temp in any::<f32>()) {
        let sample = SensorSample::new(0).with_accel(x, 0.0, 0.0).with_temperature(temp);
        let frame = decode(&encode(&sample)).unwrap();

        // Sign is preserved (or the value collapsed to zero)
        if !x.is_nan() {
            prop_assert!(frame.accel[0] == 0.0 || frame.accel[0].signum() == x.signum());
        }
        prop_assert!(frame.accel[0].abs() <= 32.767);
        prop_assert!(frame.temperature.abs() <= 327.67);
    }

    #[test]
    fn alert_pairs_are_exclusive(
        vibration in 0.0f32..10.0,
        temperature in -40.0f32..150.0,
        battery in 0u8..=100,
    ) {
        let sample = SensorSample::new(0)
            .with_vibration(vibration, vibration)
            .with_temperature(temperature)
            .with_battery_level(battery);
        let flags = evaluate(&sample, &Thresholds::default());

        prop_assert!(!flags.contains(AlertFlags::VIBRATION_WARN | AlertFlags::VIBRATION_CRIT));
        prop_assert!(!flags.contains(AlertFlags::TEMP_WARN | AlertFlags::TEMP_CRIT));
        prop_assert!(!flags.contains(AlertFlags::SENSOR_ERROR));
        prop_assert_eq!(flags.contains(AlertFlags::BATTERY_LOW), battery <= 20);
        prop_assert_eq!(flags.contains(AlertFlags::VIBRATION_CRIT), vibration >= 4.0);
    }

    #[test]
    fn vibration_output_always_finite(
        readings in proptest::collection::vec(
            (any::<f32>(), any::<f32>(), any::<f32>()),
            1..50,
        )
    ) {
        let mut processor = VibrationProcessor::new();
        for (x, y, z) in readings {
            if let Some(m) = processor.process(Axis3::new(x, y, z)) {
                prop_assert!(m.rms.is_finite() && m.rms >= 0.0);
                prop_assert!(m.peak >= m.rms);
            }
        }
    }
}
