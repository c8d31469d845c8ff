//! In-process wireless stack
//!
//! A loopback radio stands in for the vendor BLE stack. The device side gets
//! the three halves the core expects ([`LinkControl`], [`LinkTransmit`] and a
//! [`StackEvents`] source); the other end is a [`LoopbackPeer`] that plays
//! the client: it connects, negotiates a transfer unit, writes control bytes
//! and receives telemetry frames.
//!
//! ```text
//!   device side                                   client side
//!  ┌─────────────────┐   advertising (watch)   ┌──────────────┐
//!  │ LoopbackControl │ ──────────────────────▶ │              │
//!  ├─────────────────┤   frames (bounded mpsc) │ LoopbackPeer │
//!  │ LoopbackTransmit│ ──────────────────────▶ │              │
//!  ├─────────────────┤   events (mpsc)         │              │
//!  │ LoopbackEvents  │ ◀────────────────────── │              │
//!  └─────────────────┘                         └──────────────┘
//! ```
//!
//! The frame channel is bounded by the number of TX buffers. A client that
//! stops reading fills it and the transmit half reports `WouldBlock`, exactly
//! like a stack that has run out of buffers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::{mpsc, watch};

use vibemon_core::constants::buffers::MAX_CONTROL_PAYLOAD;
use vibemon_core::constants::link::{ATT_HEADER_LEN, DEFAULT_MTU, LOCAL_MAX_MTU};
use vibemon_core::errors::{FrameError, LinkError};
use vibemon_core::packet::{decode, TelemetryFrame};
use vibemon_core::session::{
    ChannelHandle, ConnectionId, ControlCommand, DisconnectReason, LinkParams, PeerAddress,
    SessionEvent,
};
use vibemon_core::traits::{LinkControl, LinkTransmit};

use crate::{Radio, StackEvents};

/// Default number of frames the stack can hold before `WouldBlock`
pub const DEFAULT_TX_BUFFERS: usize = 8;

/// Attribute handle the telemetry characteristic is served on
pub const TELEMETRY_CHANNEL: ChannelHandle = ChannelHandle(0x0010);

/// Attribute handle of the control characteristic
pub const CONTROL_CHANNEL: ChannelHandle = ChannelHandle(0x0013);

/// Status code reported when fault injection rejects a request
const INJECTED_FAULT_STATUS: u8 = 0x0C;

/// Device side of a loopback radio
pub type LoopbackRadio = Radio<LoopbackControl, LoopbackTransmit, LoopbackEvents>;

#[derive(Debug)]
struct LinkState {
    conn: Option<ConnectionId>,
    next_conn: u16,
    mtu: u16,
    fail_advertising: bool,
    reject_params: bool,
    param_requests: Vec<(ConnectionId, LinkParams)>,
    advertising_starts: u32,
    advertised_name: Option<String>,
}

#[derive(Debug, Clone)]
struct Shared {
    state: Arc<Mutex<LinkState>>,
    advertising: Arc<watch::Sender<bool>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: SessionEvent) -> Result<(), LinkError> {
        self.events.send(event).map_err(|_| LinkError::NotConnected)
    }
}

/// Create a connected device/peer pair
pub fn pair(tx_buffers: usize) -> (LoopbackRadio, LoopbackPeer) {
    let (advertising, advertising_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = mpsc::channel(tx_buffers.max(1));

    let shared = Shared {
        state: Arc::new(Mutex::new(LinkState {
            conn: None,
            next_conn: 1,
            mtu: DEFAULT_MTU,
            fail_advertising: false,
            reject_params: false,
            param_requests: Vec::new(),
            advertising_starts: 0,
            advertised_name: None,
        })),
        advertising: Arc::new(advertising),
        events: event_tx,
    };

    let radio = Radio {
        control: LoopbackControl { shared: shared.clone() },
        transmit: LoopbackTransmit {
            shared: shared.clone(),
            frames: frame_tx,
        },
        events: LoopbackEvents { events: event_rx },
    };

    let peer = LoopbackPeer {
        shared,
        advertising: advertising_rx,
        frames: frame_rx,
    };

    (radio, peer)
}

/// Connection management half
#[derive(Debug)]
pub struct LoopbackControl {
    shared: Shared,
}

impl LinkControl for LoopbackControl {
    fn start_advertising(&mut self, name: &str) -> Result<(), LinkError> {
        let mut state = self.shared.lock();
        if state.fail_advertising {
            return Err(LinkError::Rejected {
                status: INJECTED_FAULT_STATUS,
            });
        }
        state.advertising_starts += 1;
        state.advertised_name = Some(name.to_string());
        drop(state);
        debug!("Loopback advertising as {}", name);

        self.shared.advertising.send_replace(true);
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), LinkError> {
        self.shared.advertising.send_replace(false);
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnectionId) -> Result<(), LinkError> {
        let mut state = self.shared.lock();
        if state.conn != Some(conn) {
            return Err(LinkError::NotConnected);
        }
        state.conn = None;
        state.mtu = DEFAULT_MTU;
        drop(state);

        self.shared.push(SessionEvent::Disconnected {
            reason: DisconnectReason::LocalHost,
        })
    }

    fn request_link_params(
        &mut self,
        conn: ConnectionId,
        params: &LinkParams,
    ) -> Result<(), LinkError> {
        let mut state = self.shared.lock();
        if state.reject_params {
            return Err(LinkError::Rejected {
                status: INJECTED_FAULT_STATUS,
            });
        }
        state.param_requests.push((conn, *params));
        Ok(())
    }
}

/// How a frame was handed to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Notification,
    Indication,
}

/// A frame as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub conn: ConnectionId,
    pub channel: ChannelHandle,
    pub delivery: Delivery,
    pub payload: Vec<u8>,
}

impl ReceivedFrame {
    /// Decode the payload as a telemetry frame
    pub fn decode(&self) -> Result<TelemetryFrame, FrameError> {
        decode(&self.payload)
    }
}

/// Outbound telemetry half
#[derive(Debug)]
pub struct LoopbackTransmit {
    shared: Shared,
    frames: mpsc::Sender<ReceivedFrame>,
}

impl LoopbackTransmit {
    fn send(
        &mut self,
        conn: ConnectionId,
        channel: ChannelHandle,
        payload: &[u8],
        delivery: Delivery,
    ) -> nb::Result<(), LinkError> {
        let limit = {
            let state = self.shared.lock();
            if state.conn != Some(conn) {
                return Err(nb::Error::Other(LinkError::NotConnected));
            }
            (state.mtu as usize).saturating_sub(ATT_HEADER_LEN)
        };

        if payload.len() > limit {
            return Err(nb::Error::Other(LinkError::PayloadTooLarge {
                len: payload.len(),
                limit,
            }));
        }

        let frame = ReceivedFrame {
            conn,
            channel,
            delivery,
            payload: payload.to_vec(),
        };
        match self.frames.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(nb::Error::WouldBlock),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(nb::Error::Other(LinkError::NotConnected))
            }
        }
    }
}

impl LinkTransmit for LoopbackTransmit {
    fn notify(
        &mut self,
        conn: ConnectionId,
        channel: ChannelHandle,
        payload: &[u8],
    ) -> nb::Result<(), LinkError> {
        self.send(conn, channel, payload, Delivery::Notification)
    }

    fn indicate(
        &mut self,
        conn: ConnectionId,
        channel: ChannelHandle,
        payload: &[u8],
    ) -> nb::Result<(), LinkError> {
        self.send(conn, channel, payload, Delivery::Indication)
    }
}

/// Stack event source
#[derive(Debug)]
pub struct LoopbackEvents {
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

#[async_trait::async_trait]
impl StackEvents for LoopbackEvents {
    async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }
}

/// Client end of a loopback radio
#[derive(Debug)]
pub struct LoopbackPeer {
    shared: Shared,
    advertising: watch::Receiver<bool>,
    frames: mpsc::Receiver<ReceivedFrame>,
}

impl LoopbackPeer {
    /// Wait for the device to advertise, then connect to it
    pub async fn connect(&mut self, address: [u8; 6]) -> Result<ConnectionId, LinkError> {
        if self.advertising.wait_for(|advertising| *advertising).await.is_err() {
            return Err(LinkError::NotConnected);
        }

        let conn = {
            let mut state = self.shared.lock();
            if state.conn.is_some() {
                return Err(LinkError::Rejected { status: 0x09 });
            }
            let conn = ConnectionId(state.next_conn);
            state.next_conn = state.next_conn.wrapping_add(1);
            state.conn = Some(conn);
            state.mtu = DEFAULT_MTU;
            conn
        };

        // A connectable advertisement stops once a central attaches
        self.shared.advertising.send_replace(false);
        debug!("Loopback peer connected as {}", conn.0);

        self.shared.push(SessionEvent::Connected {
            conn,
            peer: PeerAddress(address),
        })?;
        Ok(conn)
    }

    /// Whether the device is currently advertising
    pub fn is_advertising(&self) -> bool {
        *self.advertising.borrow()
    }

    /// Current connection, if any
    pub fn connection(&self) -> Option<ConnectionId> {
        self.shared.lock().conn
    }

    /// Client-initiated disconnect
    pub fn disconnect(&mut self) -> Result<(), LinkError> {
        self.drop_link(DisconnectReason::RemoteUser)
    }

    /// Tear the link down with an arbitrary reason (e.g. supervision timeout)
    pub fn drop_link(&mut self, reason: DisconnectReason) -> Result<(), LinkError> {
        {
            let mut state = self.shared.lock();
            if state.conn.take().is_none() {
                return Err(LinkError::NotConnected);
            }
            state.mtu = DEFAULT_MTU;
        }
        self.shared.push(SessionEvent::Disconnected { reason })
    }

    /// Exchange a larger transfer unit
    ///
    /// The agreed unit is bounded by the local maximum, as a real exchange is.
    pub fn negotiate_mtu(&mut self, mtu: u16) -> Result<(), LinkError> {
        let agreed = mtu.clamp(DEFAULT_MTU, LOCAL_MAX_MTU);
        {
            let mut state = self.shared.lock();
            if state.conn.is_none() {
                return Err(LinkError::NotConnected);
            }
            state.mtu = agreed;
        }
        self.shared.push(SessionEvent::MtuChanged { mtu: agreed })
    }

    /// Write raw bytes to an attribute
    pub fn write(&mut self, channel: ChannelHandle, bytes: &[u8]) -> Result<(), LinkError> {
        if self.shared.lock().conn.is_none() {
            return Err(LinkError::NotConnected);
        }
        let payload =
            heapless::Vec::from_slice(bytes).map_err(|_| LinkError::PayloadTooLarge {
                len: bytes.len(),
                limit: MAX_CONTROL_PAYLOAD,
            })?;
        self.shared.push(SessionEvent::DataReceived { channel, payload })
    }

    /// Send a command on the control characteristic
    pub fn send_command(&mut self, command: ControlCommand) -> Result<(), LinkError> {
        self.write(CONTROL_CHANNEL, &[command.as_byte()])
    }

    /// Wait for the next telemetry frame
    pub async fn recv_frame(&mut self) -> Option<ReceivedFrame> {
        self.frames.recv().await
    }

    /// Next telemetry frame if one is already queued
    pub fn try_recv_frame(&mut self) -> Option<ReceivedFrame> {
        self.frames.try_recv().ok()
    }

    /// Make every advertising start fail (or succeed again)
    pub fn fail_advertising(&self, fail: bool) {
        self.shared.lock().fail_advertising = fail;
    }

    /// Make link parameter requests fail (or succeed again)
    pub fn reject_link_params(&self, reject: bool) {
        self.shared.lock().reject_params = reject;
    }

    /// Link parameter requests seen so far
    pub fn link_param_requests(&self) -> Vec<(ConnectionId, LinkParams)> {
        self.shared.lock().param_requests.clone()
    }

    /// Number of successful advertising starts
    pub fn advertising_starts(&self) -> u32 {
        self.shared.lock().advertising_starts
    }

    /// Name carried by the most recent advertising start
    pub fn advertised_name(&self) -> Option<String> {
        self.shared.lock().advertised_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibemon_core::packet::encode;
    use vibemon_core::sample::SensorSample;

    #[tokio::test]
    async fn connect_waits_for_advertising() {
        let (mut radio, mut peer) = pair(2);
        assert!(!peer.is_advertising());

        radio.control.start_advertising("VibeMon").unwrap();
        let conn = peer.connect([1, 2, 3, 4, 5, 6]).await.unwrap();
        assert!(!peer.is_advertising());

        let event = radio.events.next_event().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::Connected {
                conn,
                peer: PeerAddress([1, 2, 3, 4, 5, 6])
            }
        );
    }

    #[tokio::test]
    async fn full_tx_buffers_would_block() {
        let (mut radio, mut peer) = pair(2);
        radio.control.start_advertising("VibeMon").unwrap();
        let conn = peer.connect([0; 6]).await.unwrap();

        let frame = encode(&SensorSample::new(1));
        assert!(radio.transmit.notify(conn, TELEMETRY_CHANNEL, &frame).is_ok());
        assert!(radio.transmit.indicate(conn, TELEMETRY_CHANNEL, &frame).is_ok());
        assert_eq!(
            radio.transmit.notify(conn, TELEMETRY_CHANNEL, &frame),
            Err(nb::Error::WouldBlock)
        );

        let first = peer.try_recv_frame().unwrap();
        assert_eq!(first.delivery, Delivery::Notification);
        assert_eq!(first.decode().unwrap().timestamp, 1);
        assert_eq!(peer.try_recv_frame().unwrap().delivery, Delivery::Indication);
        assert!(peer.try_recv_frame().is_none());
    }

    #[tokio::test]
    async fn transmit_checks_connection_and_mtu() {
        let (mut radio, mut peer) = pair(4);
        let frame = [0u8; 20];
        assert_eq!(
            radio.transmit.notify(ConnectionId(1), TELEMETRY_CHANNEL, &frame),
            Err(nb::Error::Other(LinkError::NotConnected))
        );

        radio.control.start_advertising("VibeMon").unwrap();
        let conn = peer.connect([0; 6]).await.unwrap();

        let oversized = [0u8; 21];
        assert_eq!(
            radio.transmit.notify(conn, TELEMETRY_CHANNEL, &oversized),
            Err(nb::Error::Other(LinkError::PayloadTooLarge { len: 21, limit: 20 }))
        );

        peer.negotiate_mtu(64).unwrap();
        assert!(radio.transmit.notify(conn, TELEMETRY_CHANNEL, &oversized).is_ok());
    }

    #[tokio::test]
    async fn mtu_exchange_bounded_by_local_maximum() {
        let (mut radio, mut peer) = pair(4);
        radio.control.start_advertising("VibeMon").unwrap();
        let conn = peer.connect([0; 6]).await.unwrap();
        let _connected = radio.events.next_event().await;

        peer.negotiate_mtu(1024).unwrap();
        assert_eq!(
            radio.events.next_event().await,
            Some(SessionEvent::MtuChanged { mtu: LOCAL_MAX_MTU })
        );

        let limit = usize::from(LOCAL_MAX_MTU) - ATT_HEADER_LEN;
        let largest = vec![0u8; limit];
        assert!(radio.transmit.notify(conn, TELEMETRY_CHANNEL, &largest).is_ok());
        let oversized = vec![0u8; limit + 1];
        assert_eq!(
            radio.transmit.notify(conn, TELEMETRY_CHANNEL, &oversized),
            Err(nb::Error::Other(LinkError::PayloadTooLarge {
                len: limit + 1,
                limit
            }))
        );

        peer.negotiate_mtu(10).unwrap();
        assert_eq!(
            radio.events.next_event().await,
            Some(SessionEvent::MtuChanged { mtu: DEFAULT_MTU })
        );
    }

    #[tokio::test]
    async fn local_disconnect_reports_event() {
        let (mut radio, mut peer) = pair(1);
        radio.control.start_advertising("VibeMon").unwrap();
        let conn = peer.connect([0; 6]).await.unwrap();
        let _connected = radio.events.next_event().await;

        radio.control.disconnect(conn).unwrap();
        assert_eq!(peer.connection(), None);
        assert_eq!(
            radio.events.next_event().await,
            Some(SessionEvent::Disconnected {
                reason: DisconnectReason::LocalHost
            })
        );
        assert_eq!(radio.control.disconnect(conn), Err(LinkError::NotConnected));
    }

    #[tokio::test]
    async fn fault_injection() {
        let (mut radio, peer) = pair(1);
        peer.fail_advertising(true);
        assert!(radio.control.start_advertising("VibeMon").is_err());
        peer.fail_advertising(false);
        assert!(radio.control.start_advertising("VibeMon").is_ok());
        assert_eq!(peer.advertising_starts(), 1);
        assert_eq!(peer.advertised_name().as_deref(), Some("VibeMon"));

        peer.reject_link_params(true);
        assert!(radio
            .control
            .request_link_params(ConnectionId(1), &LinkParams::LOW_LATENCY)
            .is_err());
        assert!(peer.link_param_requests().is_empty());
    }

    #[tokio::test]
    async fn oversized_control_write_rejected() {
        let (mut radio, mut peer) = pair(1);
        radio.control.start_advertising("VibeMon").unwrap();
        peer.connect([0; 6]).await.unwrap();

        assert_eq!(
            peer.write(CONTROL_CHANNEL, &[0u8; 21]),
            Err(LinkError::PayloadTooLarge { len: 21, limit: 20 })
        );
        peer.send_command(ControlCommand::Recalibrate).unwrap();
    }
}
