//! Session state machine without I/O
//!
//! `SessionCore` consumes decoded frames, timer expiries, link state changes
//! and caller commands, and answers with a list of [`Action`]s for the
//! runtime to carry out (write bytes, arm or cancel a timer, publish an
//! event, resolve a caller). It never blocks and owns no tasks, which keeps
//! the protocol rules testable with plain function calls.

use crate::config::SessionConfig;
use crate::dedup::Deduplicator;
use crate::error::{SecError, SecResult};
use crate::events::SessionEvent;
use crate::exchange::{Exchange, Ticket};
use crate::state::SessionState;
use crate::status::ElevatorStatus;
use crate::timer::TimerId;
use sec3000h_core::{DataKind, Dialect, DoorCommand, Floor, HandshakeCode, Register};
use sec3000h_link::frame::hex_dump;
use sec3000h_link::{AckFrame, AckKind, CommandFrame, Frame, LinkState};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Something the runtime must do on behalf of the core
#[derive(Debug)]
pub enum Action {
    /// Write an encoded frame to the link
    Send(Vec<u8>),
    StartTimer { timer: TimerId, delay: Duration },
    CancelTimer(TimerId),
    Emit(SessionEvent),
    /// Resolve the caller holding `ticket`
    Complete { ticket: Ticket, outcome: SecResult<()> },
}

/// A request from the session's user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Send the elevator to a floor
    SetFloor(Floor),
    Door(DoorCommand),
    ReportCurrentFloor(Floor),
    ReportTargetFloor(Option<Floor>),
    ReportLoad(u16),
    /// Run PING, STATUS_REQ and CONTROL_REQ in sequence
    Handshake,
    Raw { data_number: u16, value: u16 },
}

pub struct SessionCore {
    config: SessionConfig,
    status: ElevatorStatus,
    state: SessionState,
    link_state: LinkState,
    link_generation: u64,
    dedup: Deduplicator,
    in_flight: Option<Exchange>,
    queue: VecDeque<Exchange>,
    next_timer: u64,
}

impl SessionCore {
    pub fn new(config: SessionConfig) -> Self {
        let dedup = Deduplicator::new(config.dedup_window);
        Self {
            config,
            status: ElevatorStatus::default(),
            state: SessionState::default(),
            link_state: LinkState::default(),
            link_generation: 0,
            dedup,
            in_flight: None,
            queue: VecDeque::new(),
            next_timer: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> &ElevatorStatus {
        &self.status
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    /// The exchange currently waiting for an answer
    pub fn in_flight(&self) -> Option<&Exchange> {
        self.in_flight.as_ref()
    }

    /// Exchanges waiting behind the one in flight
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queue a command; it is transmitted as soon as nothing else is in flight
    ///
    /// # Errors
    ///
    /// - `LinkNotReady` if the link cannot send
    /// - `InvalidData` if this station's role does not emit the data number
    /// - `InvalidState` for handshake floor/door commands before control was granted
    pub fn issue(&mut self, command: Command, ticket: Ticket) -> SecResult<Vec<Action>> {
        if !self.link_state.can_send() {
            return Err(SecError::LinkNotReady(format!("link is {}", self.link_state)));
        }

        let (kind, value) = self.resolve(command)?;
        let dialect = self.config.dialect;
        if !self.config.role.emits(dialect, kind) {
            return Err(SecError::InvalidData(format!(
                "A {} does not send {} in the {} dialect",
                self.config.role,
                kind,
                dialect.as_str()
            )));
        }
        if matches!(
            kind,
            DataKind::Handshake(HandshakeCode::FloorCommand | HandshakeCode::DoorCommand)
        ) && !self.state.can_control()
        {
            return Err(SecError::InvalidState(format!(
                "{} requires control, session is {}",
                kind, self.state
            )));
        }

        let mut actions = Vec::new();
        let events = match command {
            Command::ReportCurrentFloor(floor) => self.status.apply_current_floor(floor),
            Command::ReportTargetFloor(_) => {
                self.status.apply_target_value(value, self.config.arrival_policy)
            }
            Command::ReportLoad(load) => self.status.apply_load(load),
            _ => Vec::new(),
        };
        self.emit_all(events, &mut actions);

        log::debug!("{}: queueing {}", self.config.station_id, kind);
        self.queue.push_back(Exchange::new(
            self.config.peer_station_id,
            kind,
            value,
            Some(ticket),
        ));
        self.pump_queue(&mut actions);
        Ok(actions)
    }

    /// Process one decoded frame
    pub fn handle_frame(&mut self, frame: Frame, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        match frame {
            Frame::Ack(ack) => self.on_ack(ack, &mut actions),
            Frame::Command(cmd) => self.on_command(cmd, now, &mut actions),
        }
        actions
    }

    /// Process a timer expiry; stale timers are ignored
    pub fn handle_timeout(&mut self, timer: TimerId) -> Vec<Action> {
        let mut actions = Vec::new();
        match &self.in_flight {
            Some(exchange) if exchange.timer == Some(timer) => {
                log::warn!(
                    "{}: no answer to {} (attempt {})",
                    self.config.station_id,
                    exchange,
                    exchange.attempts()
                );
                self.retry_in_flight(&mut actions);
            }
            _ => log::trace!("{}: ignoring stale {}", self.config.station_id, timer),
        }
        actions
    }

    /// Track the link state; losing the link resets the session
    pub fn handle_link_state(&mut self, link_state: LinkState) -> Vec<Action> {
        let mut actions = Vec::new();
        let previous = std::mem::replace(&mut self.link_state, link_state);
        if previous == link_state {
            return actions;
        }
        actions.push(Action::Emit(SessionEvent::LinkStateChanged(link_state)));

        if link_state == LinkState::Disconnected {
            self.abort_all(
                || SecError::LinkNotReady("link lost".to_string()),
                true,
                &mut actions,
            );
            self.dedup.reset();
            self.set_state(SessionState::Idle, &mut actions);
        } else if link_state.can_send() {
            self.pump_queue(&mut actions);
        }
        actions
    }

    /// Track the link state along with the supervisor's connection generation
    ///
    /// A new generation while the link still looked open means the device
    /// was dropped and reopened between two observations. That counts as a
    /// disconnect before the new state is applied.
    pub fn handle_link_update(&mut self, link_state: LinkState, generation: u64) -> Vec<Action> {
        let mut actions = Vec::new();
        if generation != self.link_generation && self.link_state.is_open() {
            log::warn!(
                "{}: link was reopened (generation {} -> {}), resetting",
                self.config.station_id,
                self.link_generation,
                generation
            );
            actions.extend(self.handle_link_state(LinkState::Disconnected));
        }
        self.link_generation = generation;
        actions.extend(self.handle_link_state(link_state));
        actions
    }

    /// Drop every pending exchange; used when the session stops
    pub fn shutdown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.abort_all(|| SecError::SessionClosed, false, &mut actions);
        actions
    }

    fn resolve(&self, command: Command) -> SecResult<(DataKind, u16)> {
        let dialect = self.config.dialect;
        let pick = |standard: Register, handshake: HandshakeCode| match dialect {
            Dialect::Standard => DataKind::Register(standard),
            Dialect::Handshake => DataKind::Handshake(handshake),
        };
        let standard_only = |register: Register| match dialect {
            Dialect::Standard => Ok(DataKind::Register(register)),
            Dialect::Handshake => Err(SecError::InvalidData(format!(
                "{} reports are not part of the handshake dialect",
                register.as_str()
            ))),
        };

        Ok(match command {
            Command::SetFloor(floor) => (
                pick(Register::FloorSetting, HandshakeCode::FloorCommand),
                floor.value(),
            ),
            Command::Door(door) => (
                pick(Register::DoorControl, HandshakeCode::DoorCommand),
                door.value(),
            ),
            Command::ReportCurrentFloor(floor) => {
                (standard_only(Register::CurrentFloor)?, floor.value())
            }
            Command::ReportTargetFloor(target) => (
                standard_only(Register::TargetFloor)?,
                Floor::target_value(target),
            ),
            Command::ReportLoad(load) => (standard_only(Register::LoadWeight)?, load),
            Command::Handshake => match dialect {
                Dialect::Handshake => (DataKind::Handshake(HandshakeCode::Ping), 0),
                Dialect::Standard => {
                    return Err(SecError::InvalidData(
                        "The standard dialect has no handshake".to_string(),
                    ));
                }
            },
            Command::Raw { data_number, value } => (dialect.classify(data_number), value),
        })
    }

    fn on_ack(&mut self, ack: AckFrame, actions: &mut Vec<Action>) {
        let own = self.config.station_id;
        let from_peer = ack.station == self.config.peer_station_id
            || (self.config.accept_echoed_ack && ack.station == own);
        if !from_peer {
            log::debug!("{}: ignoring {}", own, ack);
            return;
        }

        match ack.kind {
            AckKind::Nak => {
                log::warn!("{}: {}", own, ack);
                actions.push(Action::Emit(SessionEvent::NakReceived {
                    station: ack.station,
                }));
                if self.in_flight.is_some() {
                    self.retry_in_flight(actions);
                }
            }
            AckKind::Ack => match &self.in_flight {
                Some(exchange) if exchange.completed_by_ack() => {
                    self.finish_in_flight(None, actions);
                }
                Some(exchange) => {
                    log::debug!("{}: {} while awaiting reply to {}", own, ack, exchange);
                }
                None => log::trace!("{}: unsolicited {}", own, ack),
            },
        }
    }

    fn on_command(&mut self, cmd: CommandFrame, now: Instant, actions: &mut Vec<Action>) {
        let own = self.config.station_id;
        let addressed = cmd.station == own;
        if !addressed && !self.config.promiscuous {
            log::trace!("{}: frame for {} ignored", own, cmd.station);
            return;
        }

        if addressed && self.config.send_acks {
            actions.push(Action::Send(AckFrame::ack(own).encode().to_vec()));
        }

        if self.dedup.is_duplicate(cmd.data_number, cmd.data_value, now) {
            log::debug!(
                "{}: duplicate {}",
                own,
                hex_dump(&cmd.encode())
            );
            return;
        }

        let dialect = self.config.dialect;
        let kind = dialect.classify(cmd.data_number);
        if !self.config.role.consumes(dialect, kind) {
            log::debug!("{}: {} is not consumed by a {}", own, kind, self.config.role);
            return;
        }

        let value = cmd.data_value;
        let policy = self.config.arrival_policy;
        match kind {
            DataKind::Register(Register::CurrentFloor) => {
                let events = self.status.apply_current_floor(Floor::from_value(value));
                self.emit_all(events, actions);
            }
            DataKind::Register(Register::TargetFloor | Register::FloorSetting) => {
                let events = self.status.apply_target_value(value, policy);
                self.emit_all(events, actions);
            }
            DataKind::Register(Register::LoadWeight) => {
                let events = self.status.apply_load(value);
                self.emit_all(events, actions);
            }
            DataKind::Register(Register::DoorControl) => self.on_door(value, actions),
            DataKind::Handshake(code) => self.on_handshake(code, value, addressed, actions),
            DataKind::Unknown(_) => {}
        }
    }

    fn on_door(&mut self, value: u16, actions: &mut Vec<Action>) {
        match DoorCommand::from_value(value) {
            Ok(door) => {
                let events = self.status.apply_door(door);
                self.emit_all(events, actions);
            }
            Err(e) => log::warn!("{}: {}", self.config.station_id, e),
        }
    }

    fn on_handshake(
        &mut self,
        code: HandshakeCode,
        value: u16,
        addressed: bool,
        actions: &mut Vec<Action>,
    ) {
        let own = self.config.station_id;
        match code {
            HandshakeCode::Ping | HandshakeCode::StatusRequest | HandshakeCode::ControlRequest => {
                if !addressed {
                    return;
                }
                if code == HandshakeCode::ControlRequest && !self.state.is_linked() {
                    log::warn!("{}: CONTROL_REQ before status exchange, ignored", own);
                    return;
                }
                let (reply, next) = match code {
                    HandshakeCode::Ping => (HandshakeCode::Pong, self.state.after_ping()),
                    HandshakeCode::StatusRequest => (
                        HandshakeCode::StatusResponse,
                        self.state.after_status(),
                    ),
                    _ => (HandshakeCode::ControlAck, self.state.after_control()),
                };
                let reply_value = match reply {
                    HandshakeCode::StatusResponse => match self.status.status_response_value() {
                        Ok(value) => value,
                        Err(e) => {
                            log::warn!("{}: cannot answer STATUS_REQ: {}", own, e);
                            return;
                        }
                    },
                    _ => 0,
                };
                log::debug!("{}: {} -> {}", own, code.as_str(), reply.as_str());
                actions.push(Action::Send(
                    CommandFrame::new(self.config.peer_station_id, reply.code(), reply_value)
                        .encode()
                        .to_vec(),
                ));
                self.set_state(next, actions);
            }
            HandshakeCode::FloorCommand | HandshakeCode::DoorCommand => {
                if !self.state.can_control() {
                    log::warn!(
                        "{}: {} while {}, ignored",
                        own,
                        code.as_str(),
                        self.state
                    );
                    return;
                }
                if code == HandshakeCode::FloorCommand {
                    let events = self
                        .status
                        .apply_target_value(value, self.config.arrival_policy);
                    self.emit_all(events, actions);
                } else {
                    self.on_door(value, actions);
                }
            }
            HandshakeCode::Pong | HandshakeCode::StatusResponse | HandshakeCode::ControlAck => {
                if code == HandshakeCode::StatusResponse {
                    let events = self.status.apply_status_response(value);
                    self.emit_all(events, actions);
                }
                let awaited = self
                    .in_flight
                    .as_ref()
                    .and_then(Exchange::expected_reply);
                if awaited != Some(code) {
                    log::debug!("{}: unsolicited {}", own, code.as_str());
                    return;
                }
                let (next_state, follow_up) = match code {
                    HandshakeCode::Pong => {
                        (self.state.after_ping(), Some(HandshakeCode::StatusRequest))
                    }
                    HandshakeCode::StatusResponse => (
                        self.state.after_status(),
                        Some(HandshakeCode::ControlRequest),
                    ),
                    _ => (self.state.after_control(), None),
                };
                self.set_state(next_state, actions);
                self.finish_in_flight(follow_up, actions);
            }
        }
    }

    /// Complete the in-flight exchange successfully
    ///
    /// With a `follow_up`, the caller's ticket moves to a new exchange at the
    /// head of the queue instead of being resolved.
    fn finish_in_flight(&mut self, follow_up: Option<HandshakeCode>, actions: &mut Vec<Action>) {
        let Some(exchange) = self.in_flight.take() else {
            return;
        };
        if let Some(timer) = exchange.timer {
            actions.push(Action::CancelTimer(timer));
        }
        log::info!(
            "{}: {} acknowledged after {} attempt(s)",
            self.config.station_id,
            exchange,
            exchange.attempts()
        );
        actions.push(Action::Emit(SessionEvent::CommandAcknowledged {
            data_number: exchange.data_number(),
            value: exchange.value,
            attempts: exchange.attempts(),
        }));

        match follow_up {
            Some(next) => self.queue.push_front(Exchange::new(
                self.config.peer_station_id,
                next.into(),
                0,
                exchange.ticket,
            )),
            None => {
                if let Some(ticket) = exchange.ticket {
                    actions.push(Action::Complete {
                        ticket,
                        outcome: Ok(()),
                    });
                }
            }
        }
        self.pump_queue(actions);
    }

    fn retry_in_flight(&mut self, actions: &mut Vec<Action>) {
        let max_retries = self.config.max_retries;
        let Some(exchange) = self.in_flight.as_mut() else {
            return;
        };

        if exchange.retries < max_retries {
            exchange.retries += 1;
            log::warn!(
                "{}: resending {} (retry {}/{})",
                self.config.station_id,
                exchange,
                exchange.retries,
                max_retries
            );
            self.transmit_in_flight(actions);
            return;
        }

        let Some(exchange) = self.in_flight.take() else {
            return;
        };
        if let Some(timer) = exchange.timer {
            actions.push(Action::CancelTimer(timer));
        }
        let attempts = exchange.attempts();
        log::error!(
            "{}: giving up on {} after {} attempts",
            self.config.station_id,
            exchange,
            attempts
        );
        actions.push(Action::Emit(SessionEvent::RetryExhausted {
            data_number: exchange.data_number(),
            value: exchange.value,
            attempts,
        }));
        if let Some(ticket) = exchange.ticket {
            actions.push(Action::Complete {
                ticket,
                outcome: Err(SecError::RetryExhausted {
                    data_number: exchange.data_number(),
                    value: exchange.value,
                    attempts,
                }),
            });
        }
        self.pump_queue(actions);
    }

    fn pump_queue(&mut self, actions: &mut Vec<Action>) {
        if self.in_flight.is_some() || !self.link_state.can_send() {
            return;
        }
        if let Some(exchange) = self.queue.pop_front() {
            self.in_flight = Some(exchange);
            self.transmit_in_flight(actions);
        }
    }

    /// (Re)send the in-flight frame and re-arm its answer timer
    fn transmit_in_flight(&mut self, actions: &mut Vec<Action>) {
        self.next_timer += 1;
        let timer = TimerId(self.next_timer);
        let delay = self.config.ack_timeout;
        let Some(exchange) = self.in_flight.as_mut() else {
            return;
        };
        if let Some(previous) = exchange.timer.replace(timer) {
            actions.push(Action::CancelTimer(previous));
        }
        actions.push(Action::Send(exchange.frame.to_vec()));
        actions.push(Action::StartTimer { timer, delay });
    }

    fn abort_all<F>(&mut self, error: F, report: bool, actions: &mut Vec<Action>)
    where
        F: Fn() -> SecError,
    {
        let pending = self.in_flight.take().into_iter().chain(self.queue.drain(..));
        for exchange in pending.collect::<Vec<_>>() {
            if let Some(timer) = exchange.timer {
                actions.push(Action::CancelTimer(timer));
            }
            if report {
                log::warn!("{}: aborting {}", self.config.station_id, exchange);
                actions.push(Action::Emit(SessionEvent::ExchangeAborted {
                    data_number: exchange.data_number(),
                    value: exchange.value,
                }));
            }
            if let Some(ticket) = exchange.ticket {
                actions.push(Action::Complete {
                    ticket,
                    outcome: Err(error()),
                });
            }
        }
    }

    fn set_state(&mut self, next: SessionState, actions: &mut Vec<Action>) {
        if next == self.state {
            return;
        }
        let previous = std::mem::replace(&mut self.state, next);
        log::info!(
            "{}: session {} -> {}",
            self.config.station_id,
            previous,
            next
        );
        actions.push(Action::Emit(SessionEvent::StateChanged {
            previous,
            current: next,
        }));
    }

    fn emit_all(&self, events: Vec<SessionEvent>, actions: &mut Vec<Action>) {
        for event in events {
            log::info!("{}: {}", self.config.station_id, event.description());
            actions.push(Action::Emit(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sec3000h_core::StationId;
    use sec3000h_link::encode_command;

    fn connected(config: SessionConfig) -> SessionCore {
        let mut core = SessionCore::new(config);
        core.handle_link_state(LinkState::Connected);
        core
    }

    fn source() -> SessionCore {
        connected(SessionConfig::data_source(StationId::ELEVATOR, StationId::AUTO_PILOT))
    }

    fn controller() -> SessionCore {
        connected(SessionConfig::controller(StationId::AUTO_PILOT, StationId::ELEVATOR))
    }

    fn command(to: StationId, data_number: u16, value: u16) -> Frame {
        Frame::Command(CommandFrame::new(to, data_number, value))
    }

    fn sent(actions: &[Action]) -> Vec<Vec<u8>> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    fn events(actions: &[Action]) -> Vec<SessionEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    fn started_timer(actions: &[Action]) -> Option<TimerId> {
        actions.iter().rev().find_map(|a| match a {
            Action::StartTimer { timer, .. } => Some(*timer),
            _ => None,
        })
    }

    fn outcome(actions: Vec<Action>) -> Option<(Ticket, SecResult<()>)> {
        actions.into_iter().find_map(|a| match a {
            Action::Complete { ticket, outcome } => Some((ticket, outcome)),
            _ => None,
        })
    }

    #[test]
    fn test_issue_requires_link() {
        let mut core = SessionCore::new(SessionConfig::default());
        let result = core.issue(Command::ReportLoad(10), Ticket(1));
        assert!(matches!(result, Err(SecError::LinkNotReady(_))));
    }

    #[test]
    fn test_role_capability_is_enforced() {
        let mut core = source();
        let result = core.issue(Command::SetFloor(Floor::Level(3)), Ticket(1));
        assert!(matches!(result, Err(SecError::InvalidData(_))));

        let mut core = controller();
        let result = core.issue(Command::ReportLoad(10), Ticket(1));
        assert!(matches!(result, Err(SecError::InvalidData(_))));
    }

    #[test]
    fn test_command_acknowledged() {
        let mut core = controller();
        let actions = core
            .issue(Command::SetFloor(Floor::Level(3)), Ticket(7))
            .unwrap();
        assert_eq!(
            sent(&actions),
            vec![encode_command(StationId::ELEVATOR, 0x0010, 0x0003).to_vec()]
        );
        assert!(started_timer(&actions).is_some());

        let actions = core.handle_frame(
            Frame::Ack(AckFrame::ack(StationId::ELEVATOR)),
            Instant::now(),
        );
        let (ticket, result) = outcome(actions).unwrap();
        assert_eq!(ticket, Ticket(7));
        assert!(result.is_ok());
        assert!(core.in_flight().is_none());
    }

    #[test]
    fn test_echoed_ack_accepted_unless_disabled() {
        let mut core = controller();
        core.issue(Command::Door(DoorCommand::Open), Ticket(1)).unwrap();
        let actions = core.handle_frame(
            Frame::Ack(AckFrame::ack(StationId::AUTO_PILOT)),
            Instant::now(),
        );
        assert!(outcome(actions).is_some());

        let mut core = connected(
            SessionConfig::controller(StationId::AUTO_PILOT, StationId::ELEVATOR)
                .with_accept_echoed_ack(false),
        );
        core.issue(Command::Door(DoorCommand::Open), Ticket(1)).unwrap();
        let actions = core.handle_frame(
            Frame::Ack(AckFrame::ack(StationId::AUTO_PILOT)),
            Instant::now(),
        );
        assert!(outcome(actions).is_none());
        assert!(core.in_flight().is_some());
    }

    #[test]
    fn test_retry_exhaustion_keeps_link() {
        let mut core = controller();
        let actions = core
            .issue(Command::SetFloor(Floor::Level(2)), Ticket(1))
            .unwrap();
        let mut timer = started_timer(&actions).unwrap();
        let mut resends = 0;

        loop {
            let actions = core.handle_timeout(timer);
            let resent = sent(&actions).len();
            let emitted = events(&actions);
            let next = started_timer(&actions);
            if let Some((ticket, result)) = outcome(actions) {
                assert_eq!(ticket, Ticket(1));
                match result {
                    Err(SecError::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 9),
                    other => panic!("unexpected outcome: {:?}", other),
                }
                assert!(emitted.contains(&SessionEvent::RetryExhausted {
                    data_number: 0x0010,
                    value: 2,
                    attempts: 9
                }));
                break;
            }
            resends += resent;
            timer = next.unwrap();
        }

        assert_eq!(resends, 8);
        assert!(core.in_flight().is_none());
        assert_eq!(core.link_state(), LinkState::Connected);

        // The link still processes unrelated frames.
        let actions = core.handle_frame(
            command(StationId::AUTO_PILOT, 0x0003, 0x0040),
            Instant::now(),
        );
        assert_eq!(
            events(&actions),
            vec![SessionEvent::LoadChanged {
                previous: 0,
                current: 0x40
            }]
        );
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut core = controller();
        let actions = core
            .issue(Command::SetFloor(Floor::Level(2)), Ticket(1))
            .unwrap();
        let timer = started_timer(&actions).unwrap();
        core.handle_frame(
            Frame::Ack(AckFrame::ack(StationId::ELEVATOR)),
            Instant::now(),
        );
        assert!(core.handle_timeout(timer).is_empty());
    }

    #[test]
    fn test_nak_resends_immediately() {
        let mut core = controller();
        core.issue(Command::SetFloor(Floor::Level(4)), Ticket(1))
            .unwrap();
        let actions = core.handle_frame(
            Frame::Ack(AckFrame::nak(StationId::ELEVATOR)),
            Instant::now(),
        );
        assert_eq!(sent(&actions).len(), 1);
        assert!(events(&actions).contains(&SessionEvent::NakReceived {
            station: StationId::ELEVATOR
        }));
        assert!(actions.iter().any(|a| matches!(a, Action::CancelTimer(_))));
        assert_eq!(core.in_flight().map(Exchange::attempts), Some(2));
    }

    #[test]
    fn test_commands_queue_fifo() {
        let mut core = controller();
        let first = core
            .issue(Command::SetFloor(Floor::Level(5)), Ticket(1))
            .unwrap();
        assert_eq!(sent(&first).len(), 1);
        let second = core
            .issue(Command::Door(DoorCommand::Close), Ticket(2))
            .unwrap();
        assert!(sent(&second).is_empty());
        assert_eq!(core.queued(), 1);

        let actions = core.handle_frame(
            Frame::Ack(AckFrame::ack(StationId::ELEVATOR)),
            Instant::now(),
        );
        assert_eq!(
            sent(&actions),
            vec![encode_command(StationId::ELEVATOR, 0x0011, 0x0002).to_vec()]
        );
        assert_eq!(outcome(actions).map(|(t, _)| t), Some(Ticket(1)));
    }

    #[test]
    fn test_duplicates_inside_window_are_acked_not_processed() {
        let mut core = connected(
            SessionConfig::data_source(StationId::ELEVATOR, StationId::AUTO_PILOT)
                .with_dialect(Dialect::Handshake),
        );
        let now = Instant::now();
        let ping = command(StationId::ELEVATOR, HandshakeCode::Ping.code(), 0);
        let ack = b"\x060002".to_vec();
        let pong = encode_command(StationId::AUTO_PILOT, HandshakeCode::Pong.code(), 0).to_vec();

        let first = core.handle_frame(ping, now);
        assert_eq!(sent(&first), vec![ack.clone(), pong.clone()]);

        let repeat = core.handle_frame(ping, now + Duration::from_millis(50));
        assert_eq!(sent(&repeat), vec![ack.clone()]);

        let later = core.handle_frame(ping, now + Duration::from_millis(400));
        assert_eq!(sent(&later), vec![ack.clone(), pong.clone()]);

        // Link loss forgets what was seen.
        core.handle_link_state(LinkState::Disconnected);
        core.handle_link_state(LinkState::Connected);
        let after_reset = core.handle_frame(ping, now + Duration::from_millis(450));
        assert_eq!(sent(&after_reset), vec![ack, pong]);
    }

    #[test]
    fn test_report_repeated_inside_window_is_dropped() {
        let mut core = controller();
        let now = Instant::now();
        let at = |ms| now + Duration::from_millis(ms);
        let current = |value| command(StationId::AUTO_PILOT, 0x0001, value);
        let target = |value| command(StationId::AUTO_PILOT, 0x0002, value);

        core.handle_frame(current(0x0002), at(0));
        core.handle_frame(target(0x0003), at(10));
        core.handle_frame(target(0x0000), at(20));
        assert_eq!(core.status().current_floor, Floor::Level(3));

        // Same value as 30 ms ago: a retransmission, not a new report.
        let repeat = core.handle_frame(current(0x0002), at(30));
        assert_eq!(sent(&repeat), vec![b"\x060001".to_vec()]);
        assert!(events(&repeat).is_empty());
        assert_eq!(core.status().current_floor, Floor::Level(3));

        let fresh = core.handle_frame(current(0x0002), at(300));
        assert_eq!(
            events(&fresh),
            vec![SessionEvent::CurrentFloorChanged {
                previous: Floor::Level(3),
                current: Floor::Level(2)
            }]
        );
    }

    #[test]
    fn test_arrival_sequence() {
        let mut core = controller();
        let now = Instant::now();
        let mut all = Vec::new();
        for (i, value) in [0x0000u16, 0x0003, 0x0000].into_iter().enumerate() {
            let actions = core.handle_frame(
                command(StationId::AUTO_PILOT, 0x0002, value),
                now + Duration::from_millis(300 * i as u64),
            );
            all.extend(events(&actions));
        }
        let arrivals: Vec<_> = all
            .iter()
            .filter(|e| matches!(e, SessionEvent::Arrived { .. }))
            .collect();
        assert_eq!(arrivals, vec![&SessionEvent::Arrived { floor: Floor::Level(3) }]);
        assert_eq!(core.status().current_floor, Floor::Level(3));
    }

    #[test]
    fn test_frames_for_other_stations() {
        let mut core = controller();
        let actions = core.handle_frame(
            command(StationId::ELEVATOR, 0x0003, 0x0010),
            Instant::now(),
        );
        assert!(actions.is_empty());

        let mut listener = connected(SessionConfig::listener(
            StationId::AUTO_PILOT,
            StationId::ELEVATOR,
        ));
        let actions = listener.handle_frame(
            command(StationId::ELEVATOR, 0x0003, 0x0010),
            Instant::now(),
        );
        assert!(sent(&actions).is_empty());
        assert_eq!(listener.status().load_weight, 0x10);
    }

    #[test]
    fn test_data_source_applies_floor_setting_and_door() {
        let mut core = source();
        let now = Instant::now();
        core.handle_frame(command(StationId::ELEVATOR, 0x0010, 0x0004), now);
        assert_eq!(core.status().target_floor, Some(Floor::Level(4)));
        assert!(core.status().moving);

        let actions = core.handle_frame(command(StationId::ELEVATOR, 0x0011, 0x0001), now);
        assert!(events(&actions).contains(&SessionEvent::Arrived {
            floor: Floor::Level(4)
        }));
        assert_eq!(core.status().current_floor, Floor::Level(4));
    }

    #[test]
    fn test_status_request_unanswered_for_unpackable_floor() {
        let mut elev = connected(
            SessionConfig::data_source(StationId::ELEVATOR, StationId::AUTO_PILOT)
                .with_dialect(Dialect::Handshake),
        );
        let now = Instant::now();
        let to_elev = |code: HandshakeCode, value| command(StationId::ELEVATOR, code.code(), value);
        let script = [
            (HandshakeCode::Ping, 0),
            (HandshakeCode::StatusRequest, 0),
            (HandshakeCode::ControlRequest, 0),
            (HandshakeCode::FloorCommand, 300),
            (HandshakeCode::DoorCommand, DoorCommand::Open.value()),
        ];
        for (i, (code, value)) in script.into_iter().enumerate() {
            elev.handle_frame(to_elev(code, value), now + Duration::from_millis(300 * i as u64));
        }
        assert_eq!(elev.status().current_floor, Floor::Level(300));

        let actions = elev.handle_frame(
            to_elev(HandshakeCode::StatusRequest, 0),
            now + Duration::from_secs(5),
        );
        assert_eq!(sent(&actions), vec![b"\x060002".to_vec()]);
        assert_eq!(elev.state(), SessionState::Controlling);
    }

    #[test]
    fn test_handshake_chain() {
        let handshake = |config: SessionConfig| connected(config.with_dialect(Dialect::Handshake));
        let mut ctrl = handshake(SessionConfig::controller(
            StationId::AUTO_PILOT,
            StationId::ELEVATOR,
        ));
        let mut elev = handshake(SessionConfig::data_source(
            StationId::ELEVATOR,
            StationId::AUTO_PILOT,
        ));
        let now = Instant::now();

        assert!(matches!(
            ctrl.issue(Command::SetFloor(Floor::Level(2)), Ticket(9)),
            Err(SecError::InvalidState(_))
        ));

        let mut to_elev = sent(&ctrl.issue(Command::Handshake, Ticket(1)).unwrap());
        let mut completed = None;
        for step in 0..10u64 {
            let t = now + Duration::from_millis(300 * step);
            let mut to_ctrl = Vec::new();
            for bytes in to_elev.drain(..) {
                let frame = Frame::decode(&bytes).unwrap();
                to_ctrl.extend(sent(&elev.handle_frame(frame, t)));
            }
            for bytes in to_ctrl {
                let frame = Frame::decode(&bytes).unwrap();
                let actions = ctrl.handle_frame(frame, t);
                to_elev.extend(sent(&actions));
                if let Some(done) = outcome(actions) {
                    completed = Some(done);
                }
            }
            if completed.is_some() {
                break;
            }
        }

        let (ticket, result) = completed.unwrap();
        assert_eq!(ticket, Ticket(1));
        assert!(result.is_ok());
        assert_eq!(ctrl.state(), SessionState::Controlling);
        assert_eq!(elev.state(), SessionState::Controlling);

        assert!(ctrl.issue(Command::SetFloor(Floor::Level(2)), Ticket(2)).is_ok());
    }

    #[test]
    fn test_unseen_reopen_resets_session() {
        let mut core = SessionCore::new(SessionConfig::controller(
            StationId::AUTO_PILOT,
            StationId::ELEVATOR,
        ));
        core.handle_link_update(LinkState::Connected, 1);
        let actions = core.issue(Command::SetFloor(Floor::Level(4)), Ticket(1)).unwrap();
        let timer = started_timer(&actions).unwrap();
        core.issue(Command::Door(DoorCommand::Open), Ticket(2)).unwrap();

        let same = core.handle_link_update(LinkState::Connected, 1);
        assert!(same.is_empty());

        // Disconnected and Connecting were never observed.
        let actions = core.handle_link_update(LinkState::Connected, 2);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::CancelTimer(t) if *t == timer)));
        let aborted: Vec<_> = events(&actions)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::ExchangeAborted { .. }))
            .collect();
        assert_eq!(aborted.len(), 2);
        let failed: Vec<_> = actions
            .into_iter()
            .filter_map(|a| match a {
                Action::Complete { ticket, outcome } => Some((ticket, outcome)),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed
            .iter()
            .all(|(_, outcome)| matches!(outcome, Err(SecError::LinkNotReady(_)))));

        assert!(core.in_flight().is_none());
        assert_eq!(core.queued(), 0);
        assert_eq!(core.link_state(), LinkState::Connected);
        assert_eq!(core.state(), SessionState::Idle);
        assert!(core.issue(Command::SetFloor(Floor::Level(1)), Ticket(3)).is_ok());
    }

    #[test]
    fn test_link_loss_resets_session() {
        let mut core = connected(
            SessionConfig::controller(StationId::AUTO_PILOT, StationId::ELEVATOR)
                .with_dialect(Dialect::Handshake),
        );
        core.issue(Command::Handshake, Ticket(1)).unwrap();
        core.handle_frame(
            command(StationId::AUTO_PILOT, HandshakeCode::Pong.code(), 0),
            Instant::now(),
        );
        assert_eq!(core.state(), SessionState::Handshaking);

        let actions = core.handle_link_state(LinkState::Disconnected);
        assert!(events(&actions).contains(&SessionEvent::StateChanged {
            previous: SessionState::Handshaking,
            current: SessionState::Idle
        }));
        let (ticket, result) = outcome(actions).unwrap();
        assert_eq!(ticket, Ticket(1));
        assert!(matches!(result, Err(SecError::LinkNotReady(_))));
        assert!(core.in_flight().is_none());
        assert_eq!(core.queued(), 0);
    }
}
