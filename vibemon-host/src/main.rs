//! VibeMon simulator
//!
//! Runs the full pipeline against a simulated sensor and an in-process
//! client that prints every frame it receives.
//!
//! ```text
//! vibemon-sim [CONFIG] [OFFLINE_STORE]
//! ```
//!
//! Defaults to `vibemon.json` and `vibemon-offline.jsonl` in the working
//! directory. `VIBEMON_SEED` fixes the simulator seed, `RUST_LOG` the log
//! level.

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use log::{error, info, warn};

use vibemon_core::session::SessionNotice;
use vibemon_host::loopback::{self, LoopbackPeer};
use vibemon_host::{init_logging, Device, ExitReason, HostError, JsonLinesStore, SharedConfig, SimulatedSensor};

const CLIENT_ADDRESS: [u8; 6] = [0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01];
const STATUS_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(reason) => {
            info!("Exited: {:?}", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitReason, HostError> {
    let mut args = env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "vibemon.json".to_string());
    let store_path = args.next().unwrap_or_else(|| "vibemon-offline.jsonl".to_string());
    let seed = env::var("VIBEMON_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0x5EED);

    let config = SharedConfig::load_or_default(&config_path);
    let store = JsonLinesStore::open(&store_path)?;
    if !store.is_empty() {
        info!("{} samples waiting in {}", store.len(), store_path);
    }

    let (radio, peer) = loopback::pair(loopback::DEFAULT_TX_BUFFERS);
    let device = Device::new(config, SimulatedSensor::new(seed), store, radio);
    let handle = device.handle();
    let mut notices = device.subscribe();

    tokio::spawn(client(peer));
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            if let SessionNotice::MtuChanged { mtu, payload_limit } = notice {
                info!("MTU {} ({} byte payloads)", mtu, payload_limit);
            }
        }
    });

    let reporter = handle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_PERIOD);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("{:?}", reporter.status());
        }
    });

    device
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

/// Connect, upgrade the transfer unit and print frames until the link ends
async fn client(mut peer: LoopbackPeer) {
    loop {
        if let Err(e) = peer.connect(CLIENT_ADDRESS).await {
            warn!("Client cannot connect: {}", e);
            return;
        }
        if let Err(e) = peer.negotiate_mtu(247) {
            warn!("MTU exchange failed: {}", e);
        }

        while let Some(frame) = peer.recv_frame().await {
            match frame.decode() {
                Ok(t) => println!(
                    "{:>10}  accel [{:+.3} {:+.3} {:+.3}] g  {:6.2} °C  battery {:3}%  flags {:?}",
                    t.timestamp, t.accel[0], t.accel[1], t.accel[2], t.temperature, t.battery_level, t.flags
                ),
                Err(e) => warn!("Bad frame: {}", e),
            }
            if peer.connection().is_none() {
                break;
            }
        }
    }
}
