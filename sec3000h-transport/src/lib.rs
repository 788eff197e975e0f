//! Transport layer for the SEC-3000H link
//!
//! This crate provides the byte-stream device handle the protocol layers
//! run on: a serial port, a LAN bridge over TCP, or an in-memory loopback
//! for simulators and tests. Nothing above this crate knows which one is in use.

pub mod error;
pub mod memory;
pub mod serial;
pub mod stream;
pub mod tcp;

pub use error::{SecError, SecResult};
pub use memory::MemoryTransport;
pub use serial::{SerialSettings, SerialTransport};
pub use stream::{StreamAccessor, TransportLayer};
pub use tcp::{TcpSettings, TcpTransport};
