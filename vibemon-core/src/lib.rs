//! Telemetry core for VibeMon
//!
//! Samples vibration and temperature, derives a vibration severity metric,
//! raises threshold alerts and streams fixed-size frames to a connected
//! client, diverting to offline storage when nobody is listening.
//!
//! Key constraints:
//! - Runs without an allocator (`no_std` without the `std` feature)
//! - No heap allocation and no blocking in the sampling or dispatch path
//! - Two cadences (sampling, dispatch) sharing one lock-free queue
//!
//! ```text
//! SensorProducer ─▶ Sampler ─▶ TelemetryQueue ─▶ Dispatcher ─┬─▶ LinkTransmit (Connected)
//!                   (vibration,                               ├─▶ OfflineStore (not connected)
//!                    alerts)                                  └─▶ discard (ServiceMode)
//!                                 SessionManager ─▶ SessionCell ─┘
//! ```
//!
//! ```no_run
//! use vibemon_core::{DeviceContext, DeviceConfig, Sampler, Dispatcher};
//! # use vibemon_core::session::ChannelHandle;
//! # use vibemon_core::time::MonotonicTime;
//! # fn run<P, L, S>(sensor: P, link: L, store: S)
//! # where P: vibemon_core::SensorProducer, L: vibemon_core::LinkTransmit, S: vibemon_core::OfflineStore {
//!
//! static CONTEXT: DeviceContext = DeviceContext::new();
//! static CLOCK: MonotonicTime = MonotonicTime::new();
//!
//! let (producer, consumer) = CONTEXT.queue.split().unwrap();
//! let mut sampler = Sampler::new(&CONTEXT, producer, sensor, &CLOCK);
//! let mut dispatcher = Dispatcher::new(&CONTEXT, consumer, link, store, ChannelHandle(0x10));
//! let config = DeviceConfig::default();
//!
//! // Every sample_interval_ms
//! let _ = sampler.sample_once(&config);
//! // Every 10 ms
//! dispatcher.tick();
//! # }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod macros;

pub mod alerts;
pub mod config;
pub mod constants;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod packet;
pub mod queue;
pub mod sample;
pub mod sampler;
pub mod session;
pub mod status;
pub mod time;
pub mod traits;
pub mod vibration;

// Public API
pub use alerts::{evaluate, AlertEngine, AlertLevel, Thresholds};
pub use config::{DeviceConfig, SamplingPreset};
pub use context::{ControlRequests, DeviceContext};
pub use dispatcher::{DeliveryMode, Dispatcher, TickOutcome};
pub use errors::{
    ConfigError, FrameError, LinkError, QueueFull, SensorError, SensorKind, SessionError,
    StorageError,
};
pub use packet::{decode, encode, encode_with_report, TelemetryFrame, FRAME_LEN};
pub use queue::TelemetryQueue;
pub use sample::{AlertFlags, Axis3, SensorSample};
pub use sampler::Sampler;
pub use session::{
    ControlCommand, SessionCell, SessionEvent, SessionManager, SessionNotice, SessionState,
};
pub use status::{DeviceStatus, StatusSnapshot};
pub use time::{TimeSource, Timestamp};
pub use traits::{ConfigProvider, LinkControl, LinkTransmit, OfflineStore, SensorProducer};
pub use vibration::{VibrationMetrics, VibrationProcessor, VibrationStats};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
