//! Telemetry Frame Layout Example
//!
//! Encodes a few samples into the 20-byte wire frame and prints the bytes
//! next to what a client decodes from them, including a saturated reading.
//!
//! ## Frame Layout
//!
//! ```text
//! 0..4   timestamp (u32 LE, seconds)
//! 4..10  accel x, y, z (i16 LE, milli-g)
//! 10..12 temperature (i16 LE, centi-°C)
//! 12     battery (%)
//! 13     alert flags
//! 14..20 reserved, zero
//! ```
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 02_frame_layout
//! ```

use vibemon_core::{
    packet::{decode, encode_with_report},
    sample::{AlertFlags, SensorSample},
};

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() {
    println!("VibeMon Frame Layout Example");
    println!("============================\n");

    let mut hot = SensorSample::new(1_700_000_000)
        .with_accel(0.512, -0.031, 0.998)
        .with_temperature(83.25)
        .with_battery_level(17);
    hot.flags = AlertFlags::TEMP_CRIT | AlertFlags::BATTERY_LOW;

    let samples = [
        (
            "Resting",
            SensorSample::new(0)
                .with_accel(0.0, 0.0, 1.0)
                .with_temperature(25.0)
                .with_battery_level(50),
        ),
        ("Hot, low battery", hot),
        (
            "Impact beyond ±32 g",
            SensorSample::new(42).with_accel(40.0, -40.0, 1.0),
        ),
    ];

    for (label, sample) in samples {
        let encoded = encode_with_report(&sample);
        println!("{}:", label);
        println!("  bytes   {}", hex(&encoded.bytes));
        if !encoded.saturated.is_empty() {
            println!("  saturated fields {:#04x}", encoded.saturated.bits());
        }
        match decode(&encoded.bytes) {
            Ok(frame) => println!("  decoded {:?}\n", frame),
            Err(e) => println!("  decode failed: {}\n", e),
        }
    }
}
