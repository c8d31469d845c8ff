//! End-to-end runs of the device over the loopback radio
//!
//! Time is paused: tokio advances the clock whenever every task is idle, so
//! sampling periods cost nothing and runs are deterministic.

use std::future;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, timeout};

use vibemon_core::config::{DeviceConfig, SamplingPreset};
use vibemon_core::dispatcher::DeliveryMode;
use vibemon_core::errors::{LinkError, SessionError};
use vibemon_core::sample::AlertFlags;
use vibemon_core::session::{
    ControlCommand, DisconnectReason, LinkParams, SessionNotice, SessionState,
};
use vibemon_host::loopback::{self, Delivery, LoopbackPeer, CONTROL_CHANNEL, TELEMETRY_CHANNEL};
use vibemon_host::store::read_samples;
use vibemon_host::{
    Device, DeviceHandle, ExitReason, HostError, JsonLinesStore, SharedConfig, SimulatedSensor,
};

const CLIENT: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0xAB, 0xCD];

struct Rig {
    peer: LoopbackPeer,
    handle: DeviceHandle,
    config: SharedConfig,
    notices: broadcast::Receiver<SessionNotice>,
    run: JoinHandle<Result<ExitReason, HostError>>,
    store_path: PathBuf,
    _dir: TempDir,
}

fn rig_with(tx_buffers: usize, configure: impl FnOnce(&mut DeviceConfig)) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("offline.jsonl");

    let mut device_config = DeviceConfig::default();
    device_config.apply_preset(SamplingPreset::Fast);
    configure(&mut device_config);
    let config = SharedConfig::new(device_config);

    let (radio, peer) = loopback::pair(tx_buffers);
    let store = JsonLinesStore::open(&store_path).unwrap();
    let device = Device::new(config.clone(), SimulatedSensor::new(11), store, radio);
    let handle = device.handle();
    let notices = device.subscribe();
    let run = tokio::spawn(device.run(future::pending()));

    Rig {
        peer,
        handle,
        config,
        notices,
        run,
        store_path,
        _dir: dir,
    }
}

fn rig() -> Rig {
    rig_with(loopback::DEFAULT_TX_BUFFERS, |_| {})
}

async fn next_notice(notices: &mut broadcast::Receiver<SessionNotice>) -> SessionNotice {
    timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("no notice within 5 s")
        .expect("notice channel closed")
}

impl Rig {
    async fn connect(&mut self) -> vibemon_core::session::ConnectionId {
        let conn = self.peer.connect(CLIENT).await.unwrap();
        match next_notice(&mut self.notices).await {
            SessionNotice::Connected { conn: c, peer } => {
                assert_eq!(c, conn);
                assert_eq!(peer.0, CLIENT);
            }
            other => panic!("expected connect notice, got {:?}", other),
        }
        conn
    }

    async fn stop(self) -> ExitReason {
        self.handle.shutdown();
        self.run.await.unwrap().unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn frames_reach_connected_client() {
    let mut rig = rig();
    let conn = rig.connect().await;

    for _ in 0..3 {
        let frame = rig.peer.recv_frame().await.unwrap();
        assert_eq!(frame.conn, conn);
        assert_eq!(frame.channel, TELEMETRY_CHANNEL);
        assert_eq!(frame.delivery, Delivery::Notification);
        assert_eq!(frame.payload.len(), vibemon_core::packet::FRAME_LEN);

        let telemetry = frame.decode().unwrap();
        assert!((telemetry.accel[2] - 1.0).abs() < 0.05);
        assert_eq!(telemetry.battery_level, 100);
    }

    assert_eq!(
        rig.peer.link_param_requests(),
        vec![(conn, LinkParams::LOW_LATENCY)]
    );
    assert!(rig.handle.status().frames_sent >= 3);
    assert_eq!(rig.stop().await, ExitReason::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn samples_buffered_while_nobody_listens() {
    let rig = rig();
    time::sleep(Duration::from_millis(550)).await;

    // Every write is flushed, so the file can be read while the device runs
    let samples = read_samples(&rig.store_path).unwrap();
    let status = rig.handle.status();

    assert!(samples.len() >= 5, "only {} samples stored", samples.len());
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(status.offline_buffered as usize, samples.len());
    assert_eq!(status.frames_sent, 0);
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn remote_disconnect_restarts_advertising() {
    let mut rig = rig();
    let first = rig.connect().await;

    rig.peer.disconnect().unwrap();
    assert_eq!(
        next_notice(&mut rig.notices).await,
        SessionNotice::Disconnected {
            reason: DisconnectReason::RemoteUser
        }
    );

    let second = rig.connect().await;
    assert_ne!(first, second);
    assert_eq!(rig.peer.advertising_starts(), 2);
    assert!(rig.peer.recv_frame().await.is_some());
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn renamed_device_advertises_new_name() {
    let mut rig = rig();
    rig.connect().await;
    assert_eq!(rig.peer.advertised_name().as_deref(), Some("VibeMon"));

    rig.config
        .modify(|c| c.set_device_name("Pump 3 bearing").unwrap())
        .unwrap();
    rig.peer.disconnect().unwrap();
    next_notice(&mut rig.notices).await;

    rig.connect().await;
    assert_eq!(rig.peer.advertised_name().as_deref(), Some("Pump 3 bearing"));
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn oversized_mtu_request_settles_on_local_maximum() {
    let mut rig = rig();
    rig.connect().await;

    rig.peer.negotiate_mtu(1024).unwrap();
    assert_eq!(
        next_notice(&mut rig.notices).await,
        SessionNotice::MtuChanged {
            mtu: 517,
            payload_limit: 514
        }
    );
    assert_eq!(rig.handle.session().mtu, 517);
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn local_disconnect_and_mtu() {
    let mut rig = rig();
    rig.connect().await;

    rig.peer.negotiate_mtu(247).unwrap();
    assert_eq!(
        next_notice(&mut rig.notices).await,
        SessionNotice::MtuChanged {
            mtu: 247,
            payload_limit: 244
        }
    );
    assert_eq!(rig.handle.session().mtu, 247);

    rig.handle.disconnect();
    assert_eq!(
        next_notice(&mut rig.notices).await,
        SessionNotice::Disconnected {
            reason: DisconnectReason::LocalHost
        }
    );
    assert_eq!(rig.peer.connection(), None);

    rig.connect().await;
    assert_eq!(rig.handle.session().mtu, 23);
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn control_commands_from_client() {
    let mut rig = rig();
    rig.connect().await;

    rig.peer.send_command(ControlCommand::Recalibrate).unwrap();
    assert_eq!(
        next_notice(&mut rig.notices).await,
        SessionNotice::DataReceived {
            channel: CONTROL_CHANNEL,
            command: Some(ControlCommand::Recalibrate)
        }
    );

    rig.config.modify(|c| c.sample_interval_ms = 5000).unwrap();
    rig.peer.send_command(ControlCommand::ResetConfig).unwrap();
    assert_eq!(
        next_notice(&mut rig.notices).await,
        SessionNotice::DataReceived {
            channel: CONTROL_CHANNEL,
            command: Some(ControlCommand::ResetConfig)
        }
    );
    assert_eq!(rig.config.get().sample_interval_ms, 1000);

    rig.peer.write(CONTROL_CHANNEL, &[0x42]).unwrap();
    assert_eq!(
        next_notice(&mut rig.notices).await,
        SessionNotice::DataReceived {
            channel: CONTROL_CHANNEL,
            command: None
        }
    );

    rig.peer.send_command(ControlCommand::Reboot).unwrap();
    assert_eq!(rig.run.await.unwrap().unwrap(), ExitReason::Reboot);
}

#[tokio::test(start_paused = true)]
async fn service_mode_discards_and_resumes() {
    let mut rig = rig();
    rig.handle.enter_service_mode();
    time::sleep(Duration::from_millis(350)).await;

    assert_eq!(rig.handle.session().state, SessionState::ServiceMode);
    assert!(!rig.peer.is_advertising());
    assert!(rig.handle.status().samples_discarded >= 2);

    rig.handle.exit_service_mode();
    rig.connect().await;
    assert_eq!(rig.peer.advertising_starts(), 2);
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn indicate_mode_from_config() {
    let mut rig = rig_with(loopback::DEFAULT_TX_BUFFERS, |c| c.delivery = DeliveryMode::Indicate);
    rig.connect().await;

    let frame = rig.peer.recv_frame().await.unwrap();
    assert_eq!(frame.delivery, Delivery::Indication);

    rig.config.modify(|c| c.delivery = DeliveryMode::Notify).unwrap();
    let mut switched = false;
    for _ in 0..5 {
        if rig.peer.recv_frame().await.unwrap().delivery == Delivery::Notification {
            switched = true;
            break;
        }
    }
    assert!(switched);
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn threshold_change_applies_to_next_samples() {
    let mut rig = rig();
    rig.connect().await;

    let frame = rig.peer.recv_frame().await.unwrap().decode().unwrap();
    assert!(!frame.flags.intersects(AlertFlags::TEMP_WARN | AlertFlags::TEMP_CRIT));

    rig.config
        .modify(|c| {
            c.thresholds.temp_warning = 10.0;
            c.thresholds.temp_critical = 20.0;
        })
        .unwrap();

    let mut critical = false;
    for _ in 0..5 {
        let frame = rig.peer.recv_frame().await.unwrap().decode().unwrap();
        if frame.flags.contains(AlertFlags::TEMP_CRIT) {
            assert!(!frame.flags.contains(AlertFlags::TEMP_WARN));
            critical = true;
            break;
        }
    }
    assert!(critical);
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn slow_client_loses_frames_not_order() {
    let mut rig = rig_with(1, |_| {});
    rig.connect().await;

    time::sleep(Duration::from_millis(1050)).await;
    let status = rig.handle.status();
    assert!(status.frames_sent >= 1);
    assert!(status.send_failures >= 5, "{:?}", status);

    let first = rig.peer.recv_frame().await.unwrap().decode().unwrap();
    let second = rig.peer.recv_frame().await.unwrap().decode().unwrap();
    assert!(first.timestamp <= second.timestamp);
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn advertising_failure_stops_device() {
    let dir = tempfile::tempdir().unwrap();
    let (radio, peer) = loopback::pair(1);
    peer.fail_advertising(true);

    let store = JsonLinesStore::open(dir.path().join("offline.jsonl")).unwrap();
    let device = Device::new(
        SharedConfig::new(DeviceConfig::default()),
        SimulatedSensor::new(1),
        store,
        radio,
    );

    let result = device.run(future::pending()).await;
    assert!(matches!(
        result,
        Err(HostError::Session(SessionError::AdvertisingFailed(LinkError::Rejected { .. })))
    ));
}

#[tokio::test(start_paused = true)]
async fn readvertise_failure_after_disconnect_is_fatal() {
    let mut rig = rig();
    rig.connect().await;

    rig.peer.fail_advertising(true);
    rig.peer.drop_link(DisconnectReason::SupervisionTimeout).unwrap();

    let result = rig.run.await.unwrap();
    assert!(matches!(
        result,
        Err(HostError::Session(SessionError::AdvertisingFailed(_)))
    ));
}
