//! Host Runtime for the VibeMon Telemetry Core
//!
//! ## Overview
//!
//! `vibemon-core` is written for a microcontroller: no allocator, no threads,
//! collaborators behind narrow traits. This crate supplies those
//! collaborators for a desktop or gateway host so the full pipeline can run,
//! be demonstrated and be tested end to end:
//!
//! | Core trait | Host implementation |
//! |------------|---------------------|
//! | `SensorProducer` | [`simulated::SimulatedSensor`] (synthetic machine vibration) |
//! | `ConfigProvider` | [`config::SharedConfig`] (JSON file, reloadable) |
//! | `OfflineStore` | [`store::JsonLinesStore`] (one JSON record per line) |
//! | `LinkControl` / `LinkTransmit` | [`loopback`] radio with an in-process peer |
//!
//! ## Task Model
//!
//! The two device cadences become tokio tasks sharing one leaked
//! `&'static DeviceContext`:
//!
//! ```text
//!   ┌──────────────┐   every sample_interval_ms   ┌────────────────┐
//!   │ sampler task │ ───────── enqueue ─────────▶ │ TelemetryQueue │
//!   └──────────────┘                              └───────┬────────┘
//!                                                         │ every 10 ms
//!   ┌──────────────┐  SessionCell   ┌─────────────────┐   ▼
//!   │ session loop │ ─────────────▶ │ dispatcher task │ ──▶ radio / store
//!   └──────┬───────┘                └─────────────────┘
//!          │ SessionNotice (broadcast)
//!          ▼
//!     subscribers
//! ```
//!
//! Shutdown is a `watch` channel. A fatal session error (advertising cannot
//! start) stops every task and is returned from [`runtime::Device::run`].
//!
//! ## Example Usage
//!
//! ```no_run
//! use vibemon_host::{config::SharedConfig, loopback, runtime::Device, simulated::SimulatedSensor};
//! use vibemon_host::store::JsonLinesStore;
//!
//! # async fn example() -> Result<(), vibemon_host::HostError> {
//! let config = SharedConfig::load_or_default("vibemon.json");
//! let (radio, mut peer) = loopback::pair(loopback::DEFAULT_TX_BUFFERS);
//! let store = JsonLinesStore::open("offline.jsonl")?;
//!
//! let device = Device::new(config, SimulatedSensor::new(7), store, radio);
//! let running = tokio::spawn(device.run(async {
//!     tokio::signal::ctrl_c().await.ok();
//! }));
//!
//! peer.connect([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]).await?;
//! while let Some(frame) = peer.recv_frame().await {
//!     println!("{:?}", frame.decode());
//! }
//!
//! let reason = running.await??;
//! println!("stopped: {:?}", reason);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod loopback;
pub mod runtime;
pub mod simulated;
pub mod store;

use thiserror::Error;

use vibemon_core::errors::{ConfigError, LinkError, SessionError, StorageError};

pub use config::SharedConfig;
pub use loopback::{LoopbackPeer, LoopbackRadio};
pub use runtime::{Device, DeviceHandle, ExitReason};
pub use simulated::SimulatedSensor;
pub use store::JsonLinesStore;

/// Host runtime errors
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Session failed: {0}")]
    Session(#[from] SessionError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Offline store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Telemetry queue already claimed")]
    QueueClaimed,

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The three halves of a wireless stack as the device sees it
#[derive(Debug)]
pub struct Radio<L, T, E> {
    /// Advertising and connection management
    pub control: L,
    /// Telemetry frames out
    pub transmit: T,
    /// Connection, transfer unit and write events in
    pub events: E,
}

/// Source of wireless stack events
///
/// The device firmware gets these from the vendor stack's callbacks; on the
/// host they arrive over a channel.
#[async_trait::async_trait]
pub trait StackEvents: Send {
    /// Wait for the next event; `None` once the stack is gone
    async fn next_event(&mut self) -> Option<vibemon_core::session::SessionEvent>;
}

/// Installs `env_logger` with `info` as the default level
///
/// `RUST_LOG` overrides the default. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
