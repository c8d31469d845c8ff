//! Wireless Session State Machine
//!
//! ## Overview
//!
//! The session manager owns the link lifecycle. The wireless stack reports
//! what happened as [`SessionEvent`]s; the manager updates the published
//! state and answers with an optional [`SessionNotice`] for the rest of the
//! application.
//!
//! ```text
//!            start()                 Connected
//!   ┌──────┐ ──────▶ ┌─────────────┐ ────────▶ ┌───────────┐
//!   │ Idle │         │ Advertising │           │ Connected │
//!   └──────┘ ◀────── └─────────────┘ ◀──────── └───────────┘
//!      ▲   (restart fails)        ▲  Disconnected   │ request_disconnect()
//!      │                          │  (auto-restart) ▼
//!      │                          │           ┌───────────────┐
//!      │                          └────────── │ Disconnecting │
//!      │                         Disconnected └───────────────┘
//!      │
//!   ┌─────────────┐  enter_service_mode() from any state
//!   │ ServiceMode │  exit_service_mode() back to Connected or Advertising
//!   └─────────────┘
//! ```
//!
//! ## Publication
//!
//! Only the manager writes the state. It is published through a
//! [`SessionCell`] so the dispatcher can read a snapshot every tick without
//! locking. Connection id and transfer unit are stored before the state
//! (Release), and loaded after it (Acquire). A reader can still observe a
//! state that changes right after its snapshot; the dispatcher tolerates that
//! because a send on a dead connection is just a dropped frame.
//!
//! ## Failure Semantics
//!
//! Failing to start advertising is fatal: the device can no longer be found.
//! It is returned as [`SessionError::AdvertisingFailed`] and the caller
//! decides how to restart. A rejected link parameter request is logged and
//! ignored; the stack's defaults still work, only with more latency.

use core::fmt;
use core::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

use heapless::Vec;

use crate::constants::buffers::MAX_CONTROL_PAYLOAD;
use crate::constants::link::{
    ATT_HEADER_LEN, CONN_INTERVAL_MAX_MS, CONN_INTERVAL_MIN_MS, CONN_LATENCY, DEFAULT_MTU,
    LOCAL_MAX_MTU, SUPERVISION_TIMEOUT_MS,
};
use crate::config::{default_name, DeviceName};
use crate::context::ControlRequests;
use crate::errors::SessionError;
use crate::traits::LinkControl;

/// Link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Not discoverable, no peer
    Idle = 0,
    /// Broadcasting for discovery
    Advertising = 1,
    /// Peer attached, telemetry flows
    Connected = 2,
    /// Local teardown requested, waiting for the stack
    Disconnecting = 3,
    /// Maintenance; telemetry distribution suspended
    ServiceMode = 4,
}

impl SessionState {
    pub const fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Advertising => "advertising",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
            SessionState::ServiceMode => "service mode",
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SessionState::Advertising,
            2 => SessionState::Connected,
            3 => SessionState::Disconnecting,
            4 => SessionState::ServiceMode,
            _ => SessionState::Idle,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Link-layer address of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerAddress(pub [u8; 6]);

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Stack-assigned connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u16);

/// Opaque handle of a channel (characteristic) in the stack's attribute table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u16);

/// Connection parameters requested from the stack
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParams {
    pub interval_min_ms: f32,
    pub interval_max_ms: f32,
    pub latency: u16,
    pub supervision_timeout_ms: u32,
}

impl LinkParams {
    /// Parameters requested on every new connection
    pub const LOW_LATENCY: Self = Self {
        interval_min_ms: CONN_INTERVAL_MIN_MS,
        interval_max_ms: CONN_INTERVAL_MAX_MS,
        latency: CONN_LATENCY,
        supervision_timeout_ms: SUPERVISION_TIMEOUT_MS,
    };
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the connection
    RemoteUser,
    /// Peer went silent for longer than the supervision timeout
    SupervisionTimeout,
    /// We closed the connection
    LocalHost,
    /// Any other stack status code
    Other(u8),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::RemoteUser => f.write_str("remote user"),
            DisconnectReason::SupervisionTimeout => f.write_str("supervision timeout"),
            DisconnectReason::LocalHost => f.write_str("local host"),
            DisconnectReason::Other(code) => write!(f, "status 0x{:02X}", code),
        }
    }
}

/// Command written by the client to the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Rebuild the gravity estimate (sensor re-mounted)
    Recalibrate,
    /// Restore default configuration
    ResetConfig,
    /// Restart the device
    Reboot,
}

impl ControlCommand {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ControlCommand::Recalibrate),
            0x02 => Some(ControlCommand::ResetConfig),
            0x03 => Some(ControlCommand::Reboot),
            _ => None,
        }
    }

    pub const fn as_byte(&self) -> u8 {
        match self {
            ControlCommand::Recalibrate => 0x01,
            ControlCommand::ResetConfig => 0x02,
            ControlCommand::Reboot => 0x03,
        }
    }
}

/// Something the wireless stack reported
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected {
        conn: ConnectionId,
        peer: PeerAddress,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    /// Transfer unit renegotiated
    MtuChanged {
        mtu: u16,
    },
    /// Client wrote to a channel
    DataReceived {
        channel: ChannelHandle,
        payload: Vec<u8, MAX_CONTROL_PAYLOAD>,
    },
}

/// Lifecycle notice for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    Connected {
        conn: ConnectionId,
        peer: PeerAddress,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    MtuChanged {
        mtu: u16,
        /// Largest notification payload now possible
        payload_limit: usize,
    },
    /// A control write arrived; `command` is `None` for unknown bytes
    DataReceived {
        channel: ChannelHandle,
        command: Option<ControlCommand>,
    },
}

const NO_CONNECTION: u32 = u32::MAX;

/// Lock-free publication of the session state
#[derive(Debug)]
pub struct SessionCell {
    state: AtomicU8,
    conn: AtomicU32,
    mtu: AtomicU16,
}

/// Consistent-enough view of a [`SessionCell`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub conn: Option<ConnectionId>,
    pub mtu: u16,
}

impl SessionSnapshot {
    /// Largest notification payload at the current transfer unit
    pub fn payload_limit(&self) -> usize {
        payload_limit(self.mtu)
    }
}

fn payload_limit(mtu: u16) -> usize {
    (mtu as usize).saturating_sub(ATT_HEADER_LEN)
}

impl SessionCell {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            conn: AtomicU32::new(NO_CONNECTION),
            mtu: AtomicU16::new(DEFAULT_MTU),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        let conn = match self.conn.load(Ordering::Relaxed) {
            NO_CONNECTION => None,
            raw => Some(ConnectionId(raw as u16)),
        };
        SessionSnapshot {
            state,
            conn,
            mtu: self.mtu.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn set_connection(&self, conn: Option<ConnectionId>) {
        let raw = conn.map_or(NO_CONNECTION, |c| c.0 as u32);
        self.conn.store(raw, Ordering::Relaxed);
        self.mtu.store(DEFAULT_MTU, Ordering::Relaxed);
    }

    pub(crate) fn set_mtu(&self, mtu: u16) {
        self.mtu.store(mtu, Ordering::Relaxed);
    }
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the link lifecycle from stack events
pub struct SessionManager<'a, L> {
    cell: &'a SessionCell,
    requests: &'a ControlRequests,
    link: L,
    control_channel: ChannelHandle,
    peer: Option<PeerAddress>,
    name: DeviceName,
}

impl<'a, L: LinkControl> SessionManager<'a, L> {
    /// Manager publishing to `cell`; control writes are accepted on `control_channel`
    pub fn new(
        cell: &'a SessionCell,
        requests: &'a ControlRequests,
        link: L,
        control_channel: ChannelHandle,
    ) -> Self {
        Self {
            cell,
            requests,
            link,
            control_channel,
            peer: None,
            name: default_name(),
        }
    }

    /// Advertise under `name` instead of the default
    pub fn with_name(mut self, name: DeviceName) -> Self {
        self.name = name;
        self
    }

    /// Name used from the next advertising start on
    pub fn set_name(&mut self, name: DeviceName) {
        self.name = name;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.cell.state()
    }

    pub fn peer(&self) -> Option<PeerAddress> {
        self.peer
    }

    /// Current transfer unit
    pub fn mtu(&self) -> u16 {
        self.cell.snapshot().mtu
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Start discovery (Idle → Advertising)
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Idle => self.advertise(),
            state => Err(SessionError::InvalidState { state }),
        }
    }

    /// Apply one stack event
    pub fn handle(&mut self, event: SessionEvent) -> Result<Option<SessionNotice>, SessionError> {
        match event {
            SessionEvent::Connected { conn, peer } => self.on_connected(conn, peer),
            SessionEvent::Disconnected { reason } => self.on_disconnected(reason),
            SessionEvent::MtuChanged { mtu } => self.on_mtu_changed(mtu),
            SessionEvent::DataReceived { channel, payload } => self.on_data(channel, &payload),
        }
    }

    /// Ask the stack to drop the current peer (Connected → Disconnecting)
    pub fn request_disconnect(&mut self) -> Result<(), SessionError> {
        let snapshot = self.cell.snapshot();
        match (snapshot.state, snapshot.conn) {
            (SessionState::Connected, Some(conn)) => {
                self.link.disconnect(conn).map_err(SessionError::Link)?;
                self.cell.set_state(SessionState::Disconnecting);
                log_info!("Disconnect requested for connection {}", conn.0);
                Ok(())
            }
            (state, _) => Err(SessionError::InvalidState { state }),
        }
    }

    /// Suspend telemetry distribution (any state → ServiceMode)
    ///
    /// An attached peer stays attached.
    pub fn enter_service_mode(&mut self) {
        let state = self.state();
        if state == SessionState::ServiceMode {
            return;
        }
        if state == SessionState::Advertising {
            if let Err(e) = self.link.stop_advertising() {
                log_warn!("Failed to stop advertising: {}", e);
            }
        }
        self.cell.set_state(SessionState::ServiceMode);
        log_info!("Entered service mode from {}", state);
    }

    /// Resume telemetry distribution
    ///
    /// Returns to Connected if a peer is still attached, otherwise restarts
    /// advertising.
    pub fn exit_service_mode(&mut self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::ServiceMode => {
                if self.cell.snapshot().conn.is_some() {
                    self.cell.set_state(SessionState::Connected);
                    log_info!("Left service mode, peer still connected");
                    Ok(())
                } else {
                    self.cell.set_state(SessionState::Idle);
                    log_info!("Left service mode");
                    self.advertise()
                }
            }
            state => Err(SessionError::InvalidState { state }),
        }
    }

    fn advertise(&mut self) -> Result<(), SessionError> {
        match self.link.start_advertising(&self.name) {
            Ok(()) => {
                self.cell.set_state(SessionState::Advertising);
                log_info!("Advertising as {}", self.name);
                Ok(())
            }
            Err(e) => {
                self.cell.set_state(SessionState::Idle);
                log_error!("Advertising failed to start: {}", e);
                Err(SessionError::AdvertisingFailed(e))
            }
        }
    }

    fn on_connected(
        &mut self,
        conn: ConnectionId,
        peer: PeerAddress,
    ) -> Result<Option<SessionNotice>, SessionError> {
        let state = self.state();
        match state {
            SessionState::Idle | SessionState::Advertising | SessionState::ServiceMode => {}
            SessionState::Connected | SessionState::Disconnecting => {
                return Err(SessionError::InvalidState { state });
            }
        }

        self.peer = Some(peer);
        self.cell.set_connection(Some(conn));
        if state != SessionState::ServiceMode {
            self.cell.set_state(SessionState::Connected);
        }
        log_info!("Client {} connected (connection {})", peer, conn.0);

        // Peak is tracked per session
        self.requests.request_peak_reset();

        if let Err(e) = self.link.request_link_params(conn, &LinkParams::LOW_LATENCY) {
            log_warn!("Link parameter request rejected: {}", e);
        }

        Ok(Some(SessionNotice::Connected { conn, peer }))
    }

    fn on_disconnected(
        &mut self,
        reason: DisconnectReason,
    ) -> Result<Option<SessionNotice>, SessionError> {
        let state = self.state();
        match state {
            SessionState::Connected | SessionState::Disconnecting => {
                self.clear_peer();
                self.cell.set_state(SessionState::Idle);
                log_info!("Client disconnected ({})", reason);
                self.advertise()?;
            }
            SessionState::ServiceMode => {
                self.clear_peer();
                log_info!("Client disconnected in service mode ({})", reason);
            }
            SessionState::Idle | SessionState::Advertising => {
                log_debug!("Ignoring disconnect in state {}", state);
                return Ok(None);
            }
        }

        Ok(Some(SessionNotice::Disconnected { reason }))
    }

    fn on_mtu_changed(&mut self, mtu: u16) -> Result<Option<SessionNotice>, SessionError> {
        let state = self.state();
        if state != SessionState::Connected {
            return Err(SessionError::InvalidState { state });
        }

        let mtu = mtu.clamp(DEFAULT_MTU, LOCAL_MAX_MTU);
        self.cell.set_mtu(mtu);
        log_info!("Transfer unit now {} bytes", mtu);

        Ok(Some(SessionNotice::MtuChanged {
            mtu,
            payload_limit: payload_limit(mtu),
        }))
    }

    fn on_data(
        &mut self,
        channel: ChannelHandle,
        payload: &[u8],
    ) -> Result<Option<SessionNotice>, SessionError> {
        let state = self.state();
        if self.peer.is_none() {
            return Err(SessionError::InvalidState { state });
        }

        if channel != self.control_channel {
            log_debug!("Ignoring write to channel {}", channel.0);
            return Ok(None);
        }

        let command = payload.first().copied().and_then(ControlCommand::from_byte);
        match command {
            Some(ControlCommand::Recalibrate) => {
                self.requests.request_recalibration();
                log_info!("Recalibration requested by client");
            }
            Some(other) => log_info!("Control command {:?} received", other),
            None => log_warn!("Unknown control payload {:?}", payload),
        }

        Ok(Some(SessionNotice::DataReceived { channel, command }))
    }

    fn clear_peer(&mut self) {
        self.peer = None;
        self.cell.set_connection(None);
    }
}
