//! Station roles and their capability table
//!
//! One session type serves both ends of the link. The role decides which
//! data numbers a station emits and which it consumes.

use sec3000h_core::{DataKind, Dialect, HandshakeCode, Register};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StationRole {
    /// Elevator side: reports floor, target and load; obeys commands
    #[default]
    DataSource,
    /// Auto-pilot side: consumes reports; issues floor and door commands
    Controller,
}

const SOURCE_STANDARD_EMITS: &[DataKind] = &[
    DataKind::Register(Register::CurrentFloor),
    DataKind::Register(Register::TargetFloor),
    DataKind::Register(Register::LoadWeight),
];

const CONTROLLER_STANDARD_EMITS: &[DataKind] = &[
    DataKind::Register(Register::FloorSetting),
    DataKind::Register(Register::DoorControl),
];

const SOURCE_HANDSHAKE_EMITS: &[DataKind] = &[
    DataKind::Handshake(HandshakeCode::Pong),
    DataKind::Handshake(HandshakeCode::StatusResponse),
    DataKind::Handshake(HandshakeCode::ControlAck),
];

const CONTROLLER_HANDSHAKE_EMITS: &[DataKind] = &[
    DataKind::Handshake(HandshakeCode::Ping),
    DataKind::Handshake(HandshakeCode::StatusRequest),
    DataKind::Handshake(HandshakeCode::ControlRequest),
    DataKind::Handshake(HandshakeCode::FloorCommand),
    DataKind::Handshake(HandshakeCode::DoorCommand),
];

impl StationRole {
    /// The role at the other end of the link
    pub const fn peer(&self) -> Self {
        match self {
            StationRole::DataSource => StationRole::Controller,
            StationRole::Controller => StationRole::DataSource,
        }
    }

    /// Data numbers this role sends under `dialect`
    pub const fn emitted(&self, dialect: Dialect) -> &'static [DataKind] {
        match (self, dialect) {
            (StationRole::DataSource, Dialect::Standard) => SOURCE_STANDARD_EMITS,
            (StationRole::Controller, Dialect::Standard) => CONTROLLER_STANDARD_EMITS,
            (StationRole::DataSource, Dialect::Handshake) => SOURCE_HANDSHAKE_EMITS,
            (StationRole::Controller, Dialect::Handshake) => CONTROLLER_HANDSHAKE_EMITS,
        }
    }

    /// Data numbers this role acts upon: whatever the peer role emits
    pub const fn consumed(&self, dialect: Dialect) -> &'static [DataKind] {
        self.peer().emitted(dialect)
    }

    pub fn emits(&self, dialect: Dialect, kind: DataKind) -> bool {
        self.emitted(dialect).contains(&kind)
    }

    pub fn consumes(&self, dialect: Dialect, kind: DataKind) -> bool {
        self.consumed(dialect).contains(&kind)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            StationRole::DataSource => "data source",
            StationRole::Controller => "controller",
        }
    }
}

impl fmt::Display for StationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
