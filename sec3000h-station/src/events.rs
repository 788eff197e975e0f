//! Session events
//!
//! Semantic notifications produced by a session: status changes derived from
//! validated, non-duplicate frames, state machine transitions and outcomes of
//! command exchanges.

use crate::state::SessionState;
use crate::status::DoorStatus;
use sec3000h_core::{Floor, StationId};
use sec3000h_link::LinkState;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    CurrentFloorChanged {
        previous: Floor,
        current: Floor,
    },
    TargetFloorChanged {
        previous: Option<Floor>,
        target: Option<Floor>,
    },
    MovementStarted {
        from: Floor,
        to: Floor,
    },
    /// The elevator reached its target floor
    Arrived {
        floor: Floor,
    },
    LoadChanged {
        previous: u16,
        current: u16,
    },
    DoorChanged {
        door: DoorStatus,
    },
    StateChanged {
        previous: SessionState,
        current: SessionState,
    },
    LinkStateChanged(LinkState),
    /// The peer acknowledged (or answered) a command
    CommandAcknowledged {
        data_number: u16,
        value: u16,
        attempts: u32,
    },
    /// A command went unanswered through every retry
    RetryExhausted {
        data_number: u16,
        value: u16,
        attempts: u32,
    },
    /// A pending command was dropped because the link went down
    ExchangeAborted {
        data_number: u16,
        value: u16,
    },
    NakReceived {
        station: StationId,
    },
    /// The supervisor stopped trying to reopen the device
    LinkFailed {
        reason: String,
    },
}

impl SessionEvent {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::RetryExhausted { .. } | Self::ExchangeAborted { .. } | Self::LinkFailed { .. }
        )
    }

    /// Status-affecting events, as opposed to protocol bookkeeping
    #[must_use]
    pub fn is_status_change(&self) -> bool {
        matches!(
            self,
            Self::CurrentFloorChanged { .. }
                | Self::TargetFloorChanged { .. }
                | Self::MovementStarted { .. }
                | Self::Arrived { .. }
                | Self::LoadChanged { .. }
                | Self::DoorChanged { .. }
        )
    }

    pub fn description(&self) -> String {
        match self {
            Self::CurrentFloorChanged { previous, current } => {
                format!("Current floor {} -> {}", previous, current)
            }
            Self::TargetFloorChanged { previous, target } => format!(
                "Target floor {} -> {}",
                floor_or_none(previous),
                floor_or_none(target)
            ),
            Self::MovementStarted { from, to } => format!("Moving {} -> {}", from, to),
            Self::Arrived { floor } => format!("Arrived at {}", floor),
            Self::LoadChanged { previous, current } => {
                format!("Load {}kg -> {}kg", previous, current)
            }
            Self::DoorChanged { door } => format!("Door {}", door),
            Self::StateChanged { previous, current } => {
                format!("Session {} -> {}", previous, current)
            }
            Self::LinkStateChanged(state) => format!("Link {}", state),
            Self::CommandAcknowledged {
                data_number,
                value,
                attempts,
            } => format!(
                "Command 0x{:04X}=0x{:04X} acknowledged after {} attempt(s)",
                data_number, value, attempts
            ),
            Self::RetryExhausted {
                data_number,
                value,
                attempts,
            } => format!(
                "Command 0x{:04X}=0x{:04X} unanswered after {} attempts",
                data_number, value, attempts
            ),
            Self::ExchangeAborted { data_number, value } => format!(
                "Command 0x{:04X}=0x{:04X} aborted by link loss",
                data_number, value
            ),
            Self::NakReceived { station } => format!("NAK from {}", station),
            Self::LinkFailed { reason } => format!("Link failed: {}", reason),
        }
    }
}

fn floor_or_none(floor: &Option<Floor>) -> String {
    floor.map_or_else(|| "none".to_string(), |f| f.to_string())
}
