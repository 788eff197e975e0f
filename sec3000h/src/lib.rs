//! sec3000h - Rust implementation of the SEC-3000H elevator link protocol
//!
//! The protocol connects an elevator controller and a supervising
//! auto-pilot over a half-duplex serial line using fixed-format ASCII-hex
//! frames with an additive checksum.
//!
//! # Architecture
//!
//! - `sec3000h-core`: error taxonomy, station ids, data-number registry, floors
//! - `sec3000h-transport`: serial, TCP and in-memory byte-stream transports
//! - `sec3000h-link`: checksum, frame codec, stream scanner, link supervisor
//! - `sec3000h-station`: dedup, elevator status, handshake state machine, sessions
//!
//! # Usage
//!
//! ```no_run
//! use sec3000h::{Floor, SessionBuilder, StationId};
//!
//! # async fn run() -> sec3000h::SecResult<()> {
//! let session = SessionBuilder::new()
//!     .serial("/dev/ttyUSB0", 9600)
//!     .controller(StationId::AUTO_PILOT, StationId::ELEVATOR)
//!     .build_serial()?
//!     .start();
//!
//! session.set_floor(Floor::Level(3)).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;

pub use builder::SessionBuilder;

// Re-export core types
pub use sec3000h_core::{
    DataKind, Dialect, DoorCommand, Floor, HandshakeCode, Register, SecError, SecResult, StationId,
};

// Re-export the session API
pub use sec3000h_station::{
    ArrivalPolicy, DoorStatus, ElevatorStatus, LogSink, SessionConfig, SessionEvent, SessionHandle,
    SessionState, StationRole, StationSession, StatusSink, StatusSnapshot,
};

pub mod transport {
    pub use sec3000h_transport::*;
}

pub mod link {
    pub use sec3000h_link::*;
}

pub mod station {
    pub use sec3000h_station::*;
}
