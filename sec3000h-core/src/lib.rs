//! Core types for the SEC-3000H elevator link protocol
//!
//! This crate provides the error taxonomy, station identifiers, the
//! data-number registry and floor encoding shared by every other layer.

pub mod data_number;
pub mod error;
pub mod floor;
pub mod station;

pub use data_number::{DataKind, Dialect, DoorCommand, HandshakeCode, Register};
pub use error::{SecError, SecResult};
pub use floor::Floor;
pub use station::StationId;
