//! Telemetry Dispatcher
//!
//! ## Overview
//!
//! The dispatcher is the consumer side of the telemetry queue. It runs on a
//! fast fixed cadence (10 ms) and, on every tick, routes queued samples
//! according to the published session state:
//!
//! | Session state | Action per tick |
//! |---------------|-----------------|
//! | Connected | dequeue at most one sample, encode, notify/indicate |
//! | Idle, Advertising, Disconnecting | move every queued sample to the offline store |
//! | ServiceMode | discard every queued sample |
//!
//! One frame per tick paces the radio at 100 frames/s, well above the
//! fastest sampling preset, so a connected client catches up on a full queue
//! in 200 ms.
//!
//! ## Delivery Failures
//!
//! There are no retries. When the stack has no TX buffer (`WouldBlock`) or
//! refuses the frame, the sample is dropped, logged and counted. Requeueing
//! would reorder telemetry and could starve fresh samples behind a stale one.
//! Storage failures are handled the same way.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::context::DeviceContext;
use crate::errors::LinkError;
use crate::packet;
use crate::queue::QueueConsumer;
use crate::sample::SensorSample;
use crate::session::{ChannelHandle, SessionCell, SessionState};
use crate::status::DeviceStatus;
use crate::traits::{LinkTransmit, OfflineStore};

/// How frames are sent to a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeliveryMode {
    /// Unacknowledged notifications
    #[default]
    Notify,
    /// Acknowledged indications
    Indicate,
}

/// Why a frame was not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Stack had no free TX buffer
    NoBuffer,
    /// Stack refused the frame
    Link(LinkError),
}

/// Result of one dispatcher tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was queued
    Empty,
    /// One frame handed to the stack
    Sent,
    /// One frame dropped
    Dropped(DropReason),
    /// Samples moved to the offline store
    Buffered {
        stored: usize,
        failed: usize,
    },
    /// Samples thrown away in service mode
    Discarded {
        count: usize,
    },
}

/// Consumer side of the pipeline
pub struct Dispatcher<'a, L, S, const N: usize> {
    consumer: QueueConsumer<'a, SensorSample, N>,
    session: &'a SessionCell,
    status: &'a DeviceStatus,
    link: L,
    store: S,
    channel: ChannelHandle,
    mode: DeliveryMode,
}

impl<'a, L, S, const N: usize> Dispatcher<'a, L, S, N>
where
    L: LinkTransmit,
    S: OfflineStore,
{
    /// Dispatcher sending frames on `channel` in notify mode
    pub fn new(
        context: &'a DeviceContext<N>,
        consumer: QueueConsumer<'a, SensorSample, N>,
        link: L,
        store: S,
        channel: ChannelHandle,
    ) -> Self {
        Self {
            consumer,
            session: &context.session,
            status: &context.status,
            link,
            store,
            channel,
            mode: DeliveryMode::Notify,
        }
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_mode(&mut self, mode: DeliveryMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one dispatch step
    pub fn tick(&mut self) -> TickOutcome {
        match self.session.state() {
            SessionState::Connected => self.send_one(),
            SessionState::Idle | SessionState::Advertising | SessionState::Disconnecting => {
                self.buffer_all()
            }
            SessionState::ServiceMode => self.discard_all(),
        }
    }

    fn send_one(&mut self) -> TickOutcome {
        let sample = match self.consumer.dequeue() {
            Some(sample) => sample,
            None => return TickOutcome::Empty,
        };

        // State may have moved on since the check in tick()
        let conn = match self.session.snapshot().conn {
            Some(conn) => conn,
            None => return self.dropped(sample, DropReason::Link(LinkError::NotConnected)),
        };

        let encoded = packet::encode_with_report(&sample);
        if !encoded.saturated.is_empty() {
            log_warn!(
                "Frame {} saturated fields {:#04x}",
                sample.timestamp,
                encoded.saturated.bits()
            );
            self.status.record_saturated();
        }

        let result = match self.mode {
            DeliveryMode::Notify => self.link.notify(conn, self.channel, &encoded.bytes),
            DeliveryMode::Indicate => self.link.indicate(conn, self.channel, &encoded.bytes),
        };

        match result {
            Ok(()) => {
                self.status.record_sent();
                TickOutcome::Sent
            }
            Err(nb::Error::WouldBlock) => self.dropped(sample, DropReason::NoBuffer),
            Err(nb::Error::Other(e)) => self.dropped(sample, DropReason::Link(e)),
        }
    }

    fn dropped(&mut self, sample: SensorSample, reason: DropReason) -> TickOutcome {
        match reason {
            DropReason::NoBuffer => {
                log_debug!("No TX buffer, frame {} dropped", sample.timestamp)
            }
            DropReason::Link(e) => log_warn!("Frame {} dropped: {}", sample.timestamp, e),
        }
        self.status.record_send_failure();
        TickOutcome::Dropped(reason)
    }

    fn buffer_all(&mut self) -> TickOutcome {
        let mut stored = 0;
        let mut failed = 0;

        while let Some(sample) = self.consumer.dequeue() {
            match self.store.buffer(&sample) {
                Ok(()) => {
                    stored += 1;
                    self.status.record_buffered();
                }
                Err(e) => {
                    failed += 1;
                    self.status.record_storage_failure();
                    log_warn!("Sample {} not stored: {}", sample.timestamp, e);
                }
            }
        }

        if stored == 0 && failed == 0 {
            TickOutcome::Empty
        } else {
            TickOutcome::Buffered { stored, failed }
        }
    }

    fn discard_all(&mut self) -> TickOutcome {
        let mut count = 0;
        for _ in self.consumer.drain() {
            count += 1;
            self.status.record_discarded();
        }

        if count == 0 {
            TickOutcome::Empty
        } else {
            log_debug!("Service mode, discarded {} samples", count);
            TickOutcome::Discarded { count }
        }
    }
}
