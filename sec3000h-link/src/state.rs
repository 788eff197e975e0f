//! Link state machine

use crate::error::{SecError, SecResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical link state
///
/// Owned by the link supervisor and published to the session, which must
/// not send while the link is anything but `Connected`.
///
/// # State Transitions
/// ```text
/// Disconnected -> Connecting      (open attempt)
/// Connecting   -> Connected       (device opened)
/// Connecting   -> Disconnected    (open failed, backoff)
/// Connected    -> Degraded(1)     (I/O error)
/// Degraded(n)  -> Degraded(n+1)   (further consecutive I/O error)
/// Degraded(n)  -> Connected       (successful I/O)
/// Connected | Degraded(n) -> Disconnected (EOF, idle probe failed, error limit)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkState {
    /// No device handle (initial state)
    #[default]
    Disconnected,
    /// An open attempt is in progress
    Connecting,
    /// Device open and healthy
    Connected,
    /// Device open, with this many consecutive I/O errors
    Degraded(u32),
}

impl LinkState {
    /// Whether the device handle is open
    pub const fn is_open(&self) -> bool {
        matches!(self, LinkState::Connected | LinkState::Degraded(_))
    }

    /// Whether frames may be written
    pub const fn can_send(&self) -> bool {
        matches!(self, LinkState::Connected)
    }

    /// Consecutive error count, zero unless degraded
    pub const fn error_count(&self) -> u32 {
        match self {
            LinkState::Degraded(n) => *n,
            _ => 0,
        }
    }

    /// Validate state transition
    ///
    /// # Returns
    /// `Ok(())` if transition is valid, `Err(InvalidState)` otherwise
    pub fn validate_transition(&self, new_state: LinkState) -> SecResult<()> {
        let valid = match (*self, new_state) {
            (LinkState::Disconnected, LinkState::Connecting) => true,
            (LinkState::Connecting, LinkState::Connected) => true,
            (LinkState::Connecting, LinkState::Disconnected) => true,
            (LinkState::Connected, LinkState::Degraded(1)) => true,
            (LinkState::Degraded(n), LinkState::Degraded(m)) => m == n + 1,
            (LinkState::Degraded(_), LinkState::Connected) => true,
            (LinkState::Connected | LinkState::Degraded(_), LinkState::Disconnected) => true,
            (LinkState::Disconnected, LinkState::Disconnected) => true,
            (LinkState::Connected, LinkState::Connected) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(SecError::InvalidState(format!(
                "Invalid link transition: {} -> {}",
                self, new_state
            )))
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "Disconnected",
            LinkState::Connecting => "Connecting",
            LinkState::Connected => "Connected",
            LinkState::Degraded(_) => "Degraded",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Degraded(n) => write!(f, "Degraded({})", n),
            other => f.write_str(other.as_str()),
        }
    }
}
