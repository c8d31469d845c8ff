//! Telemetry Pipeline Example
//!
//! Drives the sampler, session manager and dispatcher by hand, the way the
//! two firmware tasks do, against a console "radio" and an in-memory offline
//! store.
//!
//! ## What You'll Learn
//!
//! - Sharing one `DeviceContext` between the producing and consuming sides
//! - How the session state decides between live frames and offline storage
//! - Alert flags appearing as a simulated bearing starts to fail
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Sensor → Sampler → TelemetryQueue → Dispatcher → notify  (Connected)
//!                                          └─────→ store   (otherwise)
//! ```
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_pipeline
//! ```

use std::f32::consts::PI;

use vibemon_core::{
    config::DeviceConfig,
    context::DeviceContext,
    dispatcher::{Dispatcher, TickOutcome},
    errors::{LinkError, SensorError, StorageError},
    packet::decode,
    sample::SensorSample,
    sampler::Sampler,
    session::{
        ChannelHandle, ConnectionId, DisconnectReason, LinkParams, PeerAddress, SessionEvent,
        SessionManager,
    },
    time::FixedTime,
    traits::{LinkControl, LinkTransmit, OfflineStore, SensorProducer},
};

const TELEMETRY: ChannelHandle = ChannelHandle(0x10);
const CONTROL: ChannelHandle = ChannelHandle(0x13);

/// Motor with a bearing defect that grows every second
struct FailingBearing {
    second: u32,
}

impl SensorProducer for FailingBearing {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        let t = self.second as f32;
        let severity = 0.2 + 0.35 * t;
        let x = severity * (2.0 * PI * 0.37 * t).sin();
        self.second += 1;

        Ok(SensorSample::new(self.second)
            .with_accel(x, 0.1 * x, 1.0)
            .with_temperature(38.0 + 2.5 * t)
            .with_battery_voltage(3.9))
    }
}

struct ConsoleRadio;

impl LinkControl for ConsoleRadio {
    fn start_advertising(&mut self, name: &str) -> Result<(), LinkError> {
        println!("  [radio] advertising as {}", name);
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn disconnect(&mut self, _: ConnectionId) -> Result<(), LinkError> {
        Ok(())
    }

    fn request_link_params(&mut self, _: ConnectionId, params: &LinkParams) -> Result<(), LinkError> {
        println!(
            "  [radio] interval {}-{} ms requested",
            params.interval_min_ms, params.interval_max_ms
        );
        Ok(())
    }
}

impl LinkTransmit for ConsoleRadio {
    fn notify(&mut self, _: ConnectionId, _: ChannelHandle, payload: &[u8]) -> nb::Result<(), LinkError> {
        if let Ok(frame) = decode(payload) {
            println!(
                "  [notify] t={:>2}  x={:+.3} g  {:5.1} °C  flags {:?}",
                frame.timestamp, frame.accel[0], frame.temperature, frame.flags
            );
        }
        Ok(())
    }

    fn indicate(&mut self, conn: ConnectionId, channel: ChannelHandle, payload: &[u8]) -> nb::Result<(), LinkError> {
        self.notify(conn, channel, payload)
    }
}

#[derive(Default)]
struct Flash {
    records: Vec<SensorSample>,
}

impl OfflineStore for Flash {
    fn buffer(&mut self, sample: &SensorSample) -> Result<(), StorageError> {
        self.records.push(*sample);
        Ok(())
    }
}

fn main() {
    println!("VibeMon Telemetry Pipeline Example");
    println!("==================================\n");

    static CONTEXT: DeviceContext = DeviceContext::new();
    let (producer, consumer) = CONTEXT.queue.split().expect("queue split once");

    let config = DeviceConfig::for_device([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    println!("Device name: {}\n", config.device_name);

    let mut sampler = Sampler::new(&CONTEXT, producer, FailingBearing { second: 0 }, FixedTime::new(0));
    let mut session = SessionManager::new(&CONTEXT.session, &CONTEXT.requests, ConsoleRadio, CONTROL)
        .with_name(config.device_name.clone());
    let mut dispatcher = Dispatcher::new(&CONTEXT, consumer, ConsoleRadio, Flash::default(), TELEMETRY);

    session.start().expect("advertising");

    println!("\nNo client yet, samples go to flash:");
    for _ in 0..3 {
        let _ = sampler.sample_once(&config);
        if let TickOutcome::Buffered { stored, .. } = dispatcher.tick() {
            println!("  [store] {} sample(s) buffered", stored);
        }
    }

    println!("\nClient connects:");
    session
        .handle(SessionEvent::Connected {
            conn: ConnectionId(1),
            peer: PeerAddress([0xC0, 0xFF, 0xEE, 0, 0, 1]),
        })
        .expect("connect");

    for _ in 0..12 {
        let _ = sampler.sample_once(&config);
        dispatcher.tick();
    }

    println!("\nClient walks away:");
    session
        .handle(SessionEvent::Disconnected {
            reason: DisconnectReason::SupervisionTimeout,
        })
        .expect("re-advertise");

    println!("\nSummary");
    println!("-------");
    println!("Offline records: {}", dispatcher.store().records.len());
    println!("Counters:        {:?}", CONTEXT.status.snapshot());
}
