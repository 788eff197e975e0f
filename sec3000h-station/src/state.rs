//! Session state machine
//!
//! Only the handshake dialect moves through these states; a standard-dialect
//! session stays `Idle` and exchanges reports and commands directly.
//!
//! ```text
//!   PING seen / PONG received     STATUS exchange      CONTROL exchange
//! Idle ----------------> Handshaking -----------> Linked -----------> Controlling
//!   ^                                                                    |
//!   +------------------------- link disconnected ------------------------+
//! ```
//!
//! Timeouts never change the state; they only retry the pending exchange.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No handshake has happened
    #[default]
    Idle,
    /// PING/PONG done, status not yet exchanged
    Handshaking,
    /// Status exchanged
    Linked,
    /// Control granted; floor and door commands are accepted
    Controlling,
}

impl SessionState {
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        matches!(self, Self::Linked | Self::Controlling)
    }

    #[must_use]
    pub const fn can_control(&self) -> bool {
        matches!(self, Self::Controlling)
    }

    /// Next state after a PING/PONG exchange
    #[must_use]
    pub const fn after_ping(&self) -> Self {
        match self {
            Self::Idle => Self::Handshaking,
            _ => *self,
        }
    }

    /// Next state after a STATUS_REQ/STATUS_RSP exchange
    #[must_use]
    pub const fn after_status(&self) -> Self {
        match self {
            Self::Handshaking => Self::Linked,
            _ => *self,
        }
    }

    /// Next state after a CONTROL_REQ/CONTROL_ACK exchange
    #[must_use]
    pub const fn after_control(&self) -> Self {
        match self {
            Self::Linked => Self::Controlling,
            _ => *self,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Handshaking => "Handshaking",
            Self::Linked => "Linked",
            Self::Controlling => "Controlling",
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
