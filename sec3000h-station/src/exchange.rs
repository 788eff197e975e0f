//! Outgoing command exchanges
//!
//! An exchange is one command frame waiting to be answered: by an ACK for
//! plain writes, or by the matching reply for handshake requests.

use crate::timer::TimerId;
use sec3000h_core::{DataKind, HandshakeCode, StationId};
use sec3000h_link::frame::{COMMAND_FRAME_LEN, CommandFrame};
use std::fmt;

/// Identifies the caller waiting on an exchange (or a handshake chain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Exchange {
    pub ticket: Option<Ticket>,
    pub kind: DataKind,
    pub value: u16,
    pub frame: [u8; COMMAND_FRAME_LEN],
    /// Resends so far; the first transmission is not a retry
    pub retries: u32,
    pub timer: Option<TimerId>,
}

impl Exchange {
    pub fn new(destination: StationId, kind: DataKind, value: u16, ticket: Option<Ticket>) -> Self {
        Self {
            ticket,
            kind,
            value,
            frame: CommandFrame::new(destination, kind.code(), value).encode(),
            retries: 0,
            timer: None,
        }
    }

    pub fn data_number(&self) -> u16 {
        self.kind.code()
    }

    /// Transmissions so far, including the first
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    /// The handshake reply that completes this exchange, if any
    pub fn expected_reply(&self) -> Option<HandshakeCode> {
        match self.kind {
            DataKind::Handshake(code) => code.reply(),
            _ => None,
        }
    }

    /// Plain writes are completed by an ACK
    pub fn completed_by_ack(&self) -> bool {
        self.expected_reply().is_none()
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = 0x{:04X}", self.kind, self.value)
    }
}
