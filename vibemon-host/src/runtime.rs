//! Device runtime
//!
//! Wires the core pipeline to tokio. [`Device::run`] owns the session loop
//! and spawns two tasks:
//!
//! - **sampler**: one [`Sampler::sample_once`] per configured interval. The
//!   interval is re-read after every sample so configuration changes take
//!   effect on the next period.
//! - **dispatcher**: one [`Dispatcher::tick`] every
//!   [`DISPATCH_INTERVAL_MS`]. Missed ticks are skipped, never bunched.
//!
//! The session loop multiplexes stack events, local commands from
//! [`DeviceHandle`] and the caller's shutdown future. It returns when any of
//! them ends the run, stops both tasks and waits for them.
//!
//! ## Control commands
//!
//! `Recalibrate` is applied inside the core. The other two need the host:
//!
//! | Command | Host action |
//! |---------|-------------|
//! | `ResetConfig` | restore defaults (name kept) and persist |
//! | `Reboot` | end the run with [`ExitReason::Reboot`] |

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, MissedTickBehavior};

use vibemon_core::constants::buffers::TELEMETRY_QUEUE_CAPACITY;
use vibemon_core::constants::time::DISPATCH_INTERVAL_MS;
use vibemon_core::context::DeviceContext;
use vibemon_core::dispatcher::Dispatcher;
use vibemon_core::errors::SessionError;
use vibemon_core::sampler::Sampler;
use vibemon_core::session::{ControlCommand, SessionManager, SessionNotice, SessionSnapshot};
use vibemon_core::status::StatusSnapshot;
use vibemon_core::time::{SystemTime, TimeSource};
use vibemon_core::traits::{ConfigProvider, LinkControl, LinkTransmit, OfflineStore, SensorProducer};

use crate::config::SharedConfig;
use crate::loopback::{CONTROL_CHANNEL, TELEMETRY_CHANNEL};
use crate::{HostError, Radio, StackEvents};

/// Notices buffered per subscriber before the oldest are lost
const NOTICE_CAPACITY: usize = 16;

/// Why [`Device::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Shutdown future completed or [`DeviceHandle::shutdown`] was called
    Shutdown,
    /// Client sent the reboot command
    Reboot,
    /// Stack event source closed
    StackClosed,
}

/// Requests from the local side (buttons, maintenance console)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalCommand {
    EnterServiceMode,
    ExitServiceMode,
    Disconnect,
    Shutdown,
}

/// Cloneable remote control for a running [`Device`]
#[derive(Clone)]
pub struct DeviceHandle {
    commands: mpsc::UnboundedSender<LocalCommand>,
    context: &'static DeviceContext,
}

impl DeviceHandle {
    /// Stop distributing telemetry (queued samples are discarded)
    pub fn enter_service_mode(&self) {
        self.send(LocalCommand::EnterServiceMode);
    }

    pub fn exit_service_mode(&self) {
        self.send(LocalCommand::ExitServiceMode);
    }

    /// Drop the current client; advertising restarts once the link is down
    pub fn disconnect(&self) {
        self.send(LocalCommand::Disconnect);
    }

    pub fn shutdown(&self) {
        self.send(LocalCommand::Shutdown);
    }

    /// Pipeline counters
    pub fn status(&self) -> StatusSnapshot {
        self.context.status.snapshot()
    }

    /// Session state as the dispatcher sees it
    pub fn session(&self) -> SessionSnapshot {
        self.context.session.snapshot()
    }

    /// Samples waiting for the dispatcher
    pub fn queued(&self) -> usize {
        self.context.queue.len()
    }

    fn send(&self, command: LocalCommand) {
        if self.commands.send(command).is_err() {
            debug!("Device stopped, {:?} ignored", command);
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("session", &self.session())
            .field("queued", &self.queued())
            .finish()
    }
}

/// A complete device: sensor, configuration, offline store and radio
pub struct Device<P, S, L, T, E> {
    context: &'static DeviceContext,
    config: SharedConfig,
    sensor: P,
    store: S,
    radio: Radio<L, T, E>,
    notices: broadcast::Sender<SessionNotice>,
    commands: mpsc::UnboundedSender<LocalCommand>,
    command_rx: mpsc::UnboundedReceiver<LocalCommand>,
}

impl<P, S, L, T, E> Device<P, S, L, T, E>
where
    P: SensorProducer + Send + 'static,
    S: OfflineStore + Send + 'static,
    L: LinkControl,
    T: LinkTransmit + Send + 'static,
    E: StackEvents,
{
    /// Assemble a device
    ///
    /// The shared context is leaked: tasks need a `'static` reference, as
    /// they would to a `static` on the device. One context per device.
    pub fn new(config: SharedConfig, sensor: P, store: S, radio: Radio<L, T, E>) -> Self {
        let context: &'static DeviceContext = Box::leak(Box::new(DeviceContext::new()));
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (commands, command_rx) = mpsc::unbounded_channel();

        Self {
            context,
            config,
            sensor,
            store,
            radio,
            notices,
            commands,
            command_rx,
        }
    }

    pub fn context(&self) -> &'static DeviceContext {
        self.context
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            commands: self.commands.clone(),
            context: self.context,
        }
    }

    /// Receive session notices (connects, disconnects, commands)
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Run until `shutdown` completes, a reboot is requested or the session
    /// fails fatally
    pub async fn run<F>(self, shutdown: F) -> Result<ExitReason, HostError>
    where
        F: Future<Output = ()>,
    {
        let Device {
            context,
            config,
            sensor,
            store,
            radio,
            notices,
            commands,
            mut command_rx,
        } = self;

        let (producer, consumer) = context.queue.split().ok_or(HostError::QueueClaimed)?;
        let (stop_tx, stop_rx) = watch::channel(false);

        let sampler = Sampler::new(context, producer, sensor, SystemTime);
        let sampler_task = tokio::spawn(sample_loop(sampler, config.clone(), stop_rx.clone()));

        let dispatcher = Dispatcher::new(context, consumer, radio.transmit, store, TELEMETRY_CHANNEL)
            .with_mode(config.delivery());
        let dispatch_task = tokio::spawn(dispatch_loop(dispatcher, config.clone(), stop_rx));

        let mut session =
            SessionManager::new(&context.session, &context.requests, radio.control, CONTROL_CHANNEL)
                .with_name(config.device_name());
        let mut events = radio.events;

        info!("Device running, sampling every {} ms", config.sample_interval_ms());
        let result = match session.start() {
            Ok(()) => {
                session_loop(
                    &mut session,
                    &mut events,
                    &mut command_rx,
                    &config,
                    &notices,
                    shutdown,
                )
                .await
            }
            Err(e) => Err(e),
        };
        // Keeps the command channel open for the whole run
        drop(commands);

        let _ = stop_tx.send(true);
        sampler_task.await?;
        dispatch_task.await?;

        match result {
            Ok(reason) => {
                info!("Device stopped ({:?}), {:?}", reason, context.status.snapshot());
                Ok(reason)
            }
            Err(e) => {
                error!("Device stopped on fatal session error: {}", e);
                Err(e.into())
            }
        }
    }
}

async fn session_loop<L, E, F>(
    session: &mut SessionManager<'static, L>,
    events: &mut E,
    commands: &mut mpsc::UnboundedReceiver<LocalCommand>,
    config: &SharedConfig,
    notices: &broadcast::Sender<SessionNotice>,
    shutdown: F,
) -> Result<ExitReason, SessionError>
where
    L: LinkControl,
    E: StackEvents,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(ExitReason::Shutdown),

            command = commands.recv() => match command {
                Some(LocalCommand::Shutdown) | None => return Ok(ExitReason::Shutdown),
                Some(LocalCommand::EnterServiceMode) => session.enter_service_mode(),
                Some(LocalCommand::ExitServiceMode) => {
                    session.set_name(config.device_name());
                    session.exit_service_mode().or_else(non_fatal)?
                }
                Some(LocalCommand::Disconnect) => session.request_disconnect().or_else(non_fatal)?,
            },

            event = events.next_event() => {
                let Some(event) = event else {
                    warn!("Stack event source closed");
                    return Ok(ExitReason::StackClosed);
                };

                // Renames take effect at the next advertising start
                session.set_name(config.device_name());
                let notice = match session.handle(event) {
                    Ok(Some(notice)) => notice,
                    Ok(None) => continue,
                    Err(e) => {
                        non_fatal(e)?;
                        continue;
                    }
                };

                let reboot = apply_command(&notice, config);
                // No subscribers is fine
                let _ = notices.send(notice);
                if reboot {
                    return Ok(ExitReason::Reboot);
                }
            }
        }
    }
}

/// Log a rejected request unless it is fatal
fn non_fatal(e: SessionError) -> Result<(), SessionError> {
    if e.is_fatal() {
        return Err(e);
    }
    warn!("Session request rejected: {}", e);
    Ok(())
}

/// Host side of control commands; returns true on reboot
fn apply_command(notice: &SessionNotice, config: &SharedConfig) -> bool {
    match notice {
        SessionNotice::DataReceived {
            command: Some(ControlCommand::ResetConfig),
            ..
        } => {
            config.reset();
            if let Err(e) = config.persist() {
                warn!("Failed to persist reset configuration: {}", e);
            }
            false
        }
        SessionNotice::DataReceived {
            command: Some(ControlCommand::Reboot),
            ..
        } => {
            info!("Reboot requested by client");
            true
        }
        _ => false,
    }
}

async fn sample_loop<P, C>(
    mut sampler: Sampler<'static, P, C, TELEMETRY_QUEUE_CAPACITY>,
    config: SharedConfig,
    mut stop: watch::Receiver<bool>,
) where
    P: SensorProducer,
    C: TimeSource,
{
    loop {
        // Drops are logged and counted by the sampler
        let _ = sampler.sample_once(&config);

        let period = Duration::from_millis(u64::from(config.sample_interval_ms()));
        tokio::select! {
            _ = time::sleep(period) => {}
            _ = stop.changed() => break,
        }
    }
    debug!("Sampler stopped");
}

async fn dispatch_loop<T, S>(
    mut dispatcher: Dispatcher<'static, T, S, TELEMETRY_QUEUE_CAPACITY>,
    config: SharedConfig,
    mut stop: watch::Receiver<bool>,
) where
    T: LinkTransmit,
    S: OfflineStore,
{
    let mut ticker = time::interval(Duration::from_millis(u64::from(DISPATCH_INTERVAL_MS)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                dispatcher.set_mode(config.delivery());
                dispatcher.tick();
            }
            _ = stop.changed() => break,
        }
    }
    debug!("Dispatcher stopped");
}
