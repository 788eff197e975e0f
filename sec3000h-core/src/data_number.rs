//! Data-number registry
//!
//! A command frame carries a 16-bit data number selecting the field the
//! data value belongs to. Two registries exist on the wire:
//!
//! - the standard registry (floor / target / load reports, floor-set and
//!   door-control commands)
//! - the handshake sub-protocol (PING/PONG, STATUS, CONTROL, FLOOR, DOOR)
//!
//! The two overlap numerically (0x0001 is both "current floor" and "PONG"),
//! so a session picks exactly one [`Dialect`] to classify incoming numbers.

use crate::error::{SecError, SecResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard data-number registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    /// Current floor report (0x0001)
    CurrentFloor,
    /// Target floor report (0x0002), 0x0000 means no target
    TargetFloor,
    /// Load weight report (0x0003)
    LoadWeight,
    /// Floor-set command (0x0010)
    FloorSetting,
    /// Door-control command (0x0011)
    DoorControl,
}

impl Register {
    pub const ALL: [Register; 5] = [
        Register::CurrentFloor,
        Register::TargetFloor,
        Register::LoadWeight,
        Register::FloorSetting,
        Register::DoorControl,
    ];

    pub const fn code(&self) -> u16 {
        match self {
            Register::CurrentFloor => 0x0001,
            Register::TargetFloor => 0x0002,
            Register::LoadWeight => 0x0003,
            Register::FloorSetting => 0x0010,
            Register::DoorControl => 0x0011,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Register::CurrentFloor),
            0x0002 => Some(Register::TargetFloor),
            0x0003 => Some(Register::LoadWeight),
            0x0010 => Some(Register::FloorSetting),
            0x0011 => Some(Register::DoorControl),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Register::CurrentFloor => "current floor",
            Register::TargetFloor => "target floor",
            Register::LoadWeight => "load weight",
            Register::FloorSetting => "floor setting",
            Register::DoorControl => "door control",
        }
    }
}

/// Handshake sub-protocol codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeCode {
    Ping,
    Pong,
    StatusRequest,
    StatusResponse,
    ControlRequest,
    ControlAck,
    FloorCommand,
    DoorCommand,
}

impl HandshakeCode {
    pub const ALL: [HandshakeCode; 8] = [
        HandshakeCode::Ping,
        HandshakeCode::Pong,
        HandshakeCode::StatusRequest,
        HandshakeCode::StatusResponse,
        HandshakeCode::ControlRequest,
        HandshakeCode::ControlAck,
        HandshakeCode::FloorCommand,
        HandshakeCode::DoorCommand,
    ];

    pub const fn code(&self) -> u16 {
        match self {
            HandshakeCode::Ping => 0x0000,
            HandshakeCode::Pong => 0x0001,
            HandshakeCode::StatusRequest => 0x0010,
            HandshakeCode::StatusResponse => 0x0011,
            HandshakeCode::ControlRequest => 0x0020,
            HandshakeCode::ControlAck => 0x0021,
            HandshakeCode::FloorCommand => 0x0030,
            HandshakeCode::DoorCommand => 0x0031,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0000 => Some(HandshakeCode::Ping),
            0x0001 => Some(HandshakeCode::Pong),
            0x0010 => Some(HandshakeCode::StatusRequest),
            0x0011 => Some(HandshakeCode::StatusResponse),
            0x0020 => Some(HandshakeCode::ControlRequest),
            0x0021 => Some(HandshakeCode::ControlAck),
            0x0030 => Some(HandshakeCode::FloorCommand),
            0x0031 => Some(HandshakeCode::DoorCommand),
            _ => None,
        }
    }

    /// The reply a responder sends for this request, if it is a request
    pub const fn reply(&self) -> Option<HandshakeCode> {
        match self {
            HandshakeCode::Ping => Some(HandshakeCode::Pong),
            HandshakeCode::StatusRequest => Some(HandshakeCode::StatusResponse),
            HandshakeCode::ControlRequest => Some(HandshakeCode::ControlAck),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            HandshakeCode::Ping => "PING",
            HandshakeCode::Pong => "PONG",
            HandshakeCode::StatusRequest => "STATUS_REQ",
            HandshakeCode::StatusResponse => "STATUS_RSP",
            HandshakeCode::ControlRequest => "CONTROL_REQ",
            HandshakeCode::ControlAck => "CONTROL_ACK",
            HandshakeCode::FloorCommand => "FLOOR_CMD",
            HandshakeCode::DoorCommand => "DOOR_CMD",
        }
    }
}

/// Which registry a session uses to interpret data numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dialect {
    #[default]
    Standard,
    Handshake,
}

/// A data number classified under a dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Register(Register),
    Handshake(HandshakeCode),
    Unknown(u16),
}

impl DataKind {
    pub const fn code(&self) -> u16 {
        match self {
            DataKind::Register(r) => r.code(),
            DataKind::Handshake(h) => h.code(),
            DataKind::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Register(r) => write!(f, "{} (0x{:04X})", r.as_str(), r.code()),
            DataKind::Handshake(h) => write!(f, "{} (0x{:04X})", h.as_str(), h.code()),
            DataKind::Unknown(code) => write!(f, "unknown (0x{:04X})", code),
        }
    }
}

impl From<Register> for DataKind {
    fn from(r: Register) -> Self {
        DataKind::Register(r)
    }
}

impl From<HandshakeCode> for DataKind {
    fn from(h: HandshakeCode) -> Self {
        DataKind::Handshake(h)
    }
}

impl Dialect {
    /// Classify a raw data number
    pub const fn classify(&self, code: u16) -> DataKind {
        match self {
            Dialect::Standard => match Register::from_code(code) {
                Some(r) => DataKind::Register(r),
                None => DataKind::Unknown(code),
            },
            Dialect::Handshake => match HandshakeCode::from_code(code) {
                Some(h) => DataKind::Handshake(h),
                None => DataKind::Unknown(code),
            },
        }
    }

    /// Check that a kind belongs to this dialect
    pub fn accepts(&self, kind: DataKind) -> bool {
        matches!(
            (self, kind),
            (Dialect::Standard, DataKind::Register(_)) | (Dialect::Handshake, DataKind::Handshake(_))
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Dialect::Standard => "standard",
            Dialect::Handshake => "handshake",
        }
    }
}

/// Door-control command value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorCommand {
    Stop,
    Open,
    Close,
}

impl DoorCommand {
    pub const fn value(&self) -> u16 {
        match self {
            DoorCommand::Stop => 0x0000,
            DoorCommand::Open => 0x0001,
            DoorCommand::Close => 0x0002,
        }
    }

    pub fn from_value(value: u16) -> SecResult<Self> {
        match value {
            0x0000 => Ok(DoorCommand::Stop),
            0x0001 => Ok(DoorCommand::Open),
            0x0002 => Ok(DoorCommand::Close),
            other => Err(SecError::InvalidData(format!(
                "Unknown door command: 0x{:04X}",
                other
            ))),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            DoorCommand::Stop => "stop",
            DoorCommand::Open => "open",
            DoorCommand::Close => "close",
        }
    }
}

impl fmt::Display for DoorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
