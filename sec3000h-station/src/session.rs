//! Station session runtime
//!
//! `StationSession` wires a [`SessionCore`] to a supervised link, a timer
//! scheduler and the outside world. Everything runs on a single task, so
//! the core never needs locking: frames, timer expiries, link state changes
//! and caller requests are all serialized through one `select!` loop.
//!
//! ```rust,no_run
//! use sec3000h_core::{Floor, StationId};
//! use sec3000h_station::{SessionConfig, StationSession};
//! use sec3000h_transport::{SerialSettings, SerialTransport};
//!
//! # async fn run() -> sec3000h_core::SecResult<()> {
//! let transport = SerialTransport::new(SerialSettings::new("/dev/ttyUSB0"));
//! let config = SessionConfig::controller(StationId::AUTO_PILOT, StationId::ELEVATOR);
//! let session = StationSession::new(transport, config)?.start();
//!
//! session.set_floor(Floor::Level(3)).await?;
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::config::SessionConfig;
use crate::error::{SecError, SecResult};
use crate::events::SessionEvent;
use crate::exchange::Ticket;
use crate::machine::{Action, Command, SessionCore};
use crate::sink::{StatusSink, StatusSnapshot};
use crate::timer::{Scheduler, TimerId};
use sec3000h_core::{DoorCommand, Floor};
use sec3000h_link::{AckKind, Frame, LinkHandle, LinkState, LinkStatistics, LinkSupervisor};
use sec3000h_transport::TransportLayer;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

struct Request {
    command: Command,
    reply: oneshot::Sender<SecResult<()>>,
}

/// A configured but not yet running session
pub struct StationSession<T: TransportLayer> {
    transport: T,
    config: SessionConfig,
    sink: Option<Arc<dyn StatusSink>>,
}

impl<T: TransportLayer + 'static> StationSession<T> {
    /// Create a session over `transport`
    ///
    /// # Errors
    ///
    /// `InvalidData` if the configuration does not validate.
    pub fn new(transport: T, config: SessionConfig) -> SecResult<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            sink: None,
        })
    }

    /// Also publish every status snapshot to `sink`
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn the link supervisor and the session task
    pub fn start(self) -> SessionHandle<T> {
        let station = self.config.station_id;
        let role = self.config.role;
        log::info!(
            "{}: starting {} session on {} ({} dialect)",
            station,
            role,
            self.transport.describe(),
            self.config.dialect.as_str()
        );

        let link = LinkSupervisor::new(self.transport, self.config.supervisor.clone()).spawn();
        let link_rx = link.handle.subscribe();
        let core = SessionCore::new(self.config);
        let (scheduler, timers) = Scheduler::new();
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(snapshot_of(&core));
        let cancel = CancellationToken::new();

        let task = SessionTask {
            core,
            link: link.handle.clone(),
            frames: link.frames,
            link_task: Some(link.task),
            link_rx,
            scheduler,
            timers,
            requests,
            pending: HashMap::new(),
            next_ticket: 0,
            events: events.clone(),
            status: status_tx,
            sink: self.sink,
            cancel: cancel.clone(),
        };

        SessionHandle {
            requests: requests_tx,
            status: status_rx,
            events,
            link: link.handle,
            cancel,
            task: Arc::new(parking_lot::Mutex::new(Some(tokio::spawn(task.run())))),
        }
    }
}

/// Cloneable handle to a running session
pub struct SessionHandle<T: TransportLayer> {
    requests: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<StatusSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    link: LinkHandle<T>,
    cancel: CancellationToken,
    task: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl<T: TransportLayer> Clone for SessionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            status: self.status.clone(),
            events: self.events.clone(),
            link: self.link.clone(),
            cancel: self.cancel.clone(),
            task: Arc::clone(&self.task),
        }
    }
}

impl<T: TransportLayer> SessionHandle<T> {
    /// Submit a command and wait until it is acknowledged or fails
    ///
    /// # Errors
    ///
    /// - `LinkNotReady`, `InvalidData` or `InvalidState` if the command is rejected up front
    /// - `RetryExhausted` if the peer never answered
    /// - `LinkNotReady` if the link dropped while the command was pending
    /// - `SessionClosed` if the session stopped
    pub async fn issue(&self, command: Command) -> SecResult<()> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .map_err(|_| SecError::SessionClosed)?;
        rx.await.map_err(|_| SecError::SessionClosed)?
    }

    /// Send the elevator to `floor` (controller)
    pub async fn set_floor(&self, floor: Floor) -> SecResult<()> {
        self.issue(Command::SetFloor(floor)).await
    }

    /// Command the door (controller)
    pub async fn control_door(&self, door: DoorCommand) -> SecResult<()> {
        self.issue(Command::Door(door)).await
    }

    /// Report the current floor (data source)
    pub async fn report_current_floor(&self, floor: Floor) -> SecResult<()> {
        self.issue(Command::ReportCurrentFloor(floor)).await
    }

    /// Report the target floor, `None` once it was reached (data source)
    pub async fn report_target_floor(&self, target: Option<Floor>) -> SecResult<()> {
        self.issue(Command::ReportTargetFloor(target)).await
    }

    /// Report the load in kilograms (data source)
    pub async fn report_load(&self, load: u16) -> SecResult<()> {
        self.issue(Command::ReportLoad(load)).await
    }

    /// Run the handshake up to control being granted (handshake dialect)
    pub async fn start_handshake(&self) -> SecResult<()> {
        self.issue(Command::Handshake).await
    }

    pub async fn send_raw(&self, data_number: u16, value: u16) -> SecResult<()> {
        self.issue(Command::Raw { data_number, value }).await
    }

    /// Latest status snapshot
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn link_statistics(&self) -> LinkStatistics {
        self.link.statistics()
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the session, fail pending commands and close the device
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("{}: session task ended abnormally: {}", self.link.name(), e);
            }
        }
    }
}

struct SessionTask<T: TransportLayer> {
    core: SessionCore,
    link: LinkHandle<T>,
    frames: mpsc::UnboundedReceiver<Frame>,
    link_task: Option<JoinHandle<SecResult<()>>>,
    link_rx: watch::Receiver<LinkState>,
    scheduler: Scheduler,
    timers: mpsc::UnboundedReceiver<TimerId>,
    requests: mpsc::UnboundedReceiver<Request>,
    pending: HashMap<Ticket, oneshot::Sender<SecResult<()>>>,
    next_ticket: u64,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Sender<StatusSnapshot>,
    sink: Option<Arc<dyn StatusSink>>,
    cancel: CancellationToken,
}

impl<T: TransportLayer> SessionTask<T> {
    async fn run(mut self) {
        // The link may have moved before we subscribed.
        self.link_changed().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                Some(frame) = self.frames.recv() => {
                    log::trace!("{}: RX {}", self.core.config().station_id, frame);
                    if let Frame::Ack(ack) = &frame {
                        if ack.kind == AckKind::Nak {
                            self.link.record_nak();
                        }
                    }
                    let actions = self.core.handle_frame(frame, Instant::now());
                    self.execute(actions).await;
                }
                Some(timer) = self.timers.recv() => {
                    let actions = self.core.handle_timeout(timer);
                    self.execute(actions).await;
                }
                Some(request) = self.requests.recv() => self.submit(request).await,
                Ok(()) = self.link_rx.changed() => self.link_changed().await,
                result = join_link(&mut self.link_task) => self.link_stopped(result),
            }
        }

        self.finish().await;
    }

    async fn submit(&mut self, request: Request) {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        match self.core.issue(request.command, ticket) {
            Ok(actions) => {
                self.pending.insert(ticket, request.reply);
                self.execute(actions).await;
            }
            Err(e) => {
                log::warn!(
                    "{}: rejected {:?}: {}",
                    self.core.config().station_id,
                    request.command,
                    e
                );
                let _ = request.reply.send(Err(e));
            }
        }
    }

    async fn link_changed(&mut self) {
        let state = *self.link_rx.borrow_and_update();
        let actions = self.core.handle_link_update(state, self.link.generation());
        self.execute(actions).await;
    }

    fn link_stopped(&mut self, result: SecResult<()>) {
        self.link_task = None;
        if let Err(e) = result {
            log::error!("{}: link supervisor stopped: {}", self.core.config().station_id, e);
            let _ = self.events.send(SessionEvent::LinkFailed {
                reason: e.to_string(),
            });
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(bytes) => {
                    if let Err(e) = self.link.send(&bytes).await {
                        log::warn!("{}: send failed: {}", self.core.config().station_id, e);
                    }
                }
                Action::StartTimer { timer, delay } => self.scheduler.schedule(timer, delay),
                Action::CancelTimer(timer) => self.scheduler.cancel(timer),
                Action::Emit(event) => {
                    // No subscribers is not an error.
                    let _ = self.events.send(event);
                }
                Action::Complete { ticket, outcome } => {
                    if let Some(reply) = self.pending.remove(&ticket) {
                        let _ = reply.send(outcome);
                    }
                }
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = snapshot_of(&self.core);
        let changed = self.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });
        if changed {
            if let Some(sink) = &self.sink {
                sink.publish(&snapshot);
            }
        }
    }

    async fn finish(mut self) {
        let station = self.core.config().station_id;
        log::info!("{}: stopping session", station);

        let actions = self.core.shutdown();
        self.execute(actions).await;
        self.scheduler.cancel_all();

        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            let _ = request.reply.send(Err(SecError::SessionClosed));
        }
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(SecError::SessionClosed));
        }

        self.link.shutdown();
        if let Some(task) = self.link_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("{}: link supervisor: {}", station, e),
                Err(e) => log::warn!("{}: link task ended abnormally: {}", station, e),
            }
        }
        let actions = self.core.handle_link_state(LinkState::Disconnected);
        self.execute(actions).await;
    }
}

/// Wait for the supervisor task; pending forever once it was reaped
async fn join_link(task: &mut Option<JoinHandle<SecResult<()>>>) -> SecResult<()> {
    match task {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(SecError::InvalidState(format!("link task failed: {}", e))),
        },
        None => std::future::pending().await,
    }
}

fn snapshot_of(core: &SessionCore) -> StatusSnapshot {
    StatusSnapshot {
        station: core.config().station_id,
        role: core.config().role,
        status: core.status().clone(),
        session_state: core.state(),
        link_state: core.link_state(),
    }
}
