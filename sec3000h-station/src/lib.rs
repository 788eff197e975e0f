//! Station session layer for the SEC-3000H elevator link
//!
//! One session type serves both ends of the link; its [`StationRole`]
//! decides whether it reports elevator status (data source) or consumes
//! reports and issues commands (controller).
//!
//! - [x] Duplicate suppression within a time window
//! - [x] ACK/NAK handling with timeout driven retries
//! - [x] Arrival detection from target floor reports
//! - [x] PING / STATUS / CONTROL handshake dialect
//! - [x] Status snapshots via watch channel and pluggable sinks
//! - [ ] Multiple elevators behind one auto-pilot port

pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod exchange;
pub mod machine;
pub mod role;
pub mod session;
pub mod sink;
pub mod state;
pub mod status;
pub mod timer;

pub use config::SessionConfig;
pub use dedup::Deduplicator;
pub use error::{SecError, SecResult};
pub use events::SessionEvent;
pub use exchange::{Exchange, Ticket};
pub use machine::{Action, Command, SessionCore};
pub use role::StationRole;
pub use session::{SessionHandle, StationSession};
pub use sink::{LogSink, StatusSink, StatusSnapshot};
pub use state::SessionState;
pub use status::{ArrivalPolicy, DoorStatus, ElevatorStatus};
pub use timer::{Scheduler, TimerId};
