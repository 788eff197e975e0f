//! Link layer for the SEC-3000H protocol
//!
//! This crate provides:
//! - the additive checksum ([`checksum`])
//! - command / acknowledgement frame codec ([`frame`])
//! - a resynchronizing scanner that turns a noisy byte stream into frames
//! - the link supervisor that owns the device, reconnects with backoff and
//!   feeds decoded frames to the session layer

pub mod checksum;
pub mod error;
pub mod frame;
pub mod scanner;
pub mod state;
pub mod statistics;
pub mod supervisor;

pub use checksum::ChecksumCalc;
pub use error::{SecError, SecResult};
pub use frame::{AckFrame, AckKind, CommandFrame, Frame, encode_ack, encode_command};
pub use scanner::{FrameScanner, ScanCounters};
pub use state::LinkState;
pub use statistics::LinkStatistics;
pub use supervisor::{BackoffPolicy, LinkHandle, LinkSupervisor, SpawnedLink, SupervisorConfig};
