//! Common test doubles for integration tests
//!
//! This module provides:
//! - A scripted sensor producer
//! - Link control and transmit doubles that record every request
//! - An in-memory offline store with an optional capacity
//! - Data generators for realistic vibration signals

#![allow(dead_code)]

use std::collections::VecDeque;

use vibemon_core::{
    errors::{LinkError, SensorError, SensorKind, StorageError},
    packet::FRAME_LEN,
    sample::SensorSample,
    session::{ChannelHandle, ConnectionId, LinkParams, PeerAddress, SessionEvent},
    traits::{LinkControl, LinkTransmit, OfflineStore, SensorProducer},
};

pub mod generators;

pub const TELEMETRY: ChannelHandle = ChannelHandle(0x0010);
pub const CONTROL: ChannelHandle = ChannelHandle(0x0013);
pub const PEER: PeerAddress = PeerAddress([0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);

/// Sensor producer replaying a fixed list of readings
///
/// Once the script runs out every read reports the motion sensor unavailable.
#[derive(Default)]
pub struct ScriptedSensor {
    readings: VecDeque<Result<SensorSample, SensorError>>,
}

impl ScriptedSensor {
    pub fn new<I>(readings: I) -> Self
    where
        I: IntoIterator<Item = SensorSample>,
    {
        Self {
            readings: readings.into_iter().map(Ok).collect(),
        }
    }

    pub fn push(&mut self, reading: Result<SensorSample, SensorError>) {
        self.readings.push_back(reading);
    }

    pub fn remaining(&self) -> usize {
        self.readings.len()
    }
}

impl SensorProducer for ScriptedSensor {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        self.readings
            .pop_front()
            .unwrap_or(Err(SensorError::Unavailable(SensorKind::Motion)))
    }
}

/// Records connection management requests
#[derive(Default)]
pub struct MockControl {
    pub advertising_starts: usize,
    pub advertising_stops: usize,
    pub advertised_names: Vec<String>,
    pub disconnects: Vec<ConnectionId>,
    pub param_requests: Vec<(ConnectionId, LinkParams)>,
    pub fail_advertising: bool,
}

impl LinkControl for MockControl {
    fn start_advertising(&mut self, name: &str) -> Result<(), LinkError> {
        if self.fail_advertising {
            return Err(LinkError::Rejected { status: 0x0C });
        }
        self.advertising_starts += 1;
        self.advertised_names.push(name.to_string());
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), LinkError> {
        self.advertising_stops += 1;
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnectionId) -> Result<(), LinkError> {
        self.disconnects.push(conn);
        Ok(())
    }

    fn request_link_params(&mut self, conn: ConnectionId, params: &LinkParams) -> Result<(), LinkError> {
        self.param_requests.push((conn, *params));
        Ok(())
    }
}

/// How a frame reached the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Notified,
    Indicated,
}

/// Records every frame; failures can be scripted per send
#[derive(Default)]
pub struct MockTransmit {
    pub frames: Vec<(Sent, ConnectionId, ChannelHandle, [u8; FRAME_LEN])>,
    pub failures: VecDeque<nb::Error<LinkError>>,
}

impl MockTransmit {
    pub fn fail_next(&mut self, error: nb::Error<LinkError>) {
        self.failures.push_back(error);
    }

    pub fn notified(&self) -> usize {
        self.frames.iter().filter(|f| f.0 == Sent::Notified).count()
    }

    pub fn indicated(&self) -> usize {
        self.frames.iter().filter(|f| f.0 == Sent::Indicated).count()
    }

    fn send(
        &mut self,
        how: Sent,
        conn: ConnectionId,
        channel: ChannelHandle,
        payload: &[u8],
    ) -> nb::Result<(), LinkError> {
        if let Some(error) = self.failures.pop_front() {
            return Err(error);
        }
        let frame: [u8; FRAME_LEN] = payload
            .try_into()
            .map_err(|_| nb::Error::Other(LinkError::PayloadTooLarge { len: payload.len(), limit: FRAME_LEN }))?;
        self.frames.push((how, conn, channel, frame));
        Ok(())
    }
}

impl LinkTransmit for MockTransmit {
    fn notify(&mut self, conn: ConnectionId, channel: ChannelHandle, payload: &[u8]) -> nb::Result<(), LinkError> {
        self.send(Sent::Notified, conn, channel, payload)
    }

    fn indicate(&mut self, conn: ConnectionId, channel: ChannelHandle, payload: &[u8]) -> nb::Result<(), LinkError> {
        self.send(Sent::Indicated, conn, channel, payload)
    }
}

/// In-memory offline store
#[derive(Default)]
pub struct MemoryStore {
    pub samples: Vec<SensorSample>,
    pub capacity: Option<usize>,
}

impl OfflineStore for MemoryStore {
    fn buffer(&mut self, sample: &SensorSample) -> Result<(), StorageError> {
        if let Some(capacity) = self.capacity {
            if self.samples.len() >= capacity {
                return Err(StorageError::Full { capacity: capacity as u32 });
            }
        }
        self.samples.push(*sample);
        Ok(())
    }
}

/// Sample of a device lying still, right way up
pub fn resting(timestamp: u32) -> SensorSample {
    SensorSample::new(timestamp)
        .with_accel(0.0, 0.0, 1.0)
        .with_temperature(25.0)
        .with_battery_level(50)
}

pub fn connected(conn: u16) -> SessionEvent {
    SessionEvent::Connected {
        conn: ConnectionId(conn),
        peer: PEER,
    }
}

pub fn control_write(bytes: &[u8]) -> SessionEvent {
    SessionEvent::DataReceived {
        channel: CONTROL,
        payload: heapless::Vec::from_slice(bytes).expect("control payload fits"),
    }
}
