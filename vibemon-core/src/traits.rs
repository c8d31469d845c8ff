//! Collaborator traits
//!
//! The core never touches hardware or storage directly. Sensor buses, the
//! configuration store, the offline buffer and the wireless stack are reached
//! through these traits. Keep them narrow: each is implemented once per board
//! and once per test double.
//!
//! ## Non-blocking transmit
//!
//! [`LinkTransmit`] follows the `nb` convention: `WouldBlock` means the stack
//! has no free TX buffer right now. The dispatcher does not retry; the frame
//! is dropped and the next tick moves on.
//!
//! ```rust
//! use vibemon_core::errors::LinkError;
//! use vibemon_core::session::{ChannelHandle, ConnectionId};
//! use vibemon_core::traits::LinkTransmit;
//!
//! struct Discard;
//!
//! impl LinkTransmit for Discard {
//!     fn notify(&mut self, _: ConnectionId, _: ChannelHandle, _: &[u8]) -> nb::Result<(), LinkError> {
//!         Ok(())
//!     }
//!
//!     fn indicate(&mut self, _: ConnectionId, _: ChannelHandle, _: &[u8]) -> nb::Result<(), LinkError> {
//!         Err(nb::Error::WouldBlock)
//!     }
//! }
//! ```

use crate::alerts::Thresholds;
use crate::errors::{LinkError, SensorError, StorageError};
use crate::sample::SensorSample;
use crate::session::{ChannelHandle, ConnectionId, LinkParams};

/// Source of raw sensor readings
///
/// Implementations fill timestamp, acceleration, angular rate, temperature and
/// battery fields. Vibration metrics and flags are computed by the core.
pub trait SensorProducer {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError>;
}

/// Runtime configuration, re-read every sampling period
pub trait ConfigProvider {
    /// Current sampling interval (ms)
    fn sample_interval_ms(&self) -> u32;

    /// Current alert levels
    fn thresholds(&self) -> Thresholds;

    /// Whether threshold alerts are raised at all
    fn alerts_enabled(&self) -> bool;
}

/// Storage for samples taken while no client is attached
pub trait OfflineStore {
    fn buffer(&mut self, sample: &SensorSample) -> Result<(), StorageError>;
}

/// Connection management requests to the wireless stack
pub trait LinkControl {
    /// Start the discovery broadcast under `name`
    fn start_advertising(&mut self, name: &str) -> Result<(), LinkError>;

    fn stop_advertising(&mut self) -> Result<(), LinkError>;

    /// Ask the stack to tear down a connection; completion arrives as an event
    fn disconnect(&mut self, conn: ConnectionId) -> Result<(), LinkError>;

    fn request_link_params(
        &mut self,
        conn: ConnectionId,
        params: &LinkParams,
    ) -> Result<(), LinkError>;
}

/// Outbound telemetry path of the wireless stack
pub trait LinkTransmit {
    /// Unacknowledged send
    fn notify(
        &mut self,
        conn: ConnectionId,
        channel: ChannelHandle,
        payload: &[u8],
    ) -> nb::Result<(), LinkError>;

    /// Acknowledged send
    fn indicate(
        &mut self,
        conn: ConnectionId,
        channel: ChannelHandle,
        payload: &[u8],
    ) -> nb::Result<(), LinkError>;
}

impl<T: SensorProducer + ?Sized> SensorProducer for &mut T {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        (**self).read_sample()
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProvider for &T {
    fn sample_interval_ms(&self) -> u32 {
        (**self).sample_interval_ms()
    }

    fn thresholds(&self) -> Thresholds {
        (**self).thresholds()
    }

    fn alerts_enabled(&self) -> bool {
        (**self).alerts_enabled()
    }
}

impl<T: OfflineStore + ?Sized> OfflineStore for &mut T {
    fn buffer(&mut self, sample: &SensorSample) -> Result<(), StorageError> {
        (**self).buffer(sample)
    }
}

impl<T: LinkControl + ?Sized> LinkControl for &mut T {
    fn start_advertising(&mut self, name: &str) -> Result<(), LinkError> {
        (**self).start_advertising(name)
    }

    fn stop_advertising(&mut self) -> Result<(), LinkError> {
        (**self).stop_advertising()
    }

    fn disconnect(&mut self, conn: ConnectionId) -> Result<(), LinkError> {
        (**self).disconnect(conn)
    }

    fn request_link_params(
        &mut self,
        conn: ConnectionId,
        params: &LinkParams,
    ) -> Result<(), LinkError> {
        (**self).request_link_params(conn, params)
    }
}

impl<T: LinkTransmit + ?Sized> LinkTransmit for &mut T {
    fn notify(
        &mut self,
        conn: ConnectionId,
        channel: ChannelHandle,
        payload: &[u8],
    ) -> nb::Result<(), LinkError> {
        (**self).notify(conn, channel, payload)
    }

    fn indicate(
        &mut self,
        conn: ConnectionId,
        channel: ChannelHandle,
        payload: &[u8],
    ) -> nb::Result<(), LinkError> {
        (**self).indicate(conn, channel, payload)
    }
}
