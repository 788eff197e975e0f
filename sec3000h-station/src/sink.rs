//! Status publication
//!
//! A session publishes a [`StatusSnapshot`] whenever anything in it
//! changes. Besides the built-in watch channel, an application can plug in
//! its own [`StatusSink`], for example to forward status to a display or a
//! message bus.

use crate::role::StationRole;
use crate::state::SessionState;
use crate::status::ElevatorStatus;
use sec3000h_core::StationId;
use sec3000h_link::LinkState;
use serde::{Deserialize, Serialize};

/// Everything an observer needs to know about one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub station: StationId,
    pub role: StationRole,
    pub status: ElevatorStatus,
    pub session_state: SessionState,
    pub link_state: LinkState,
}

impl StatusSnapshot {
    /// True while the link accepts outgoing frames
    pub fn is_operational(&self) -> bool {
        self.link_state.can_send()
    }
}

/// Receiver of status snapshots
///
/// Called from the session task; implementations must not block.
#[cfg_attr(test, mockall::automock)]
pub trait StatusSink: Send + Sync {
    fn publish(&self, snapshot: &StatusSnapshot);
}

/// Sink that writes every snapshot to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, snapshot: &StatusSnapshot) {
        let status = &snapshot.status;
        log::info!(
            "{} [{}] floor={} target={} load={}kg moving={} door={} session={} link={}",
            snapshot.station,
            snapshot.role,
            status.current_floor,
            status
                .target_floor
                .map_or_else(|| "-".to_string(), |f| f.to_string()),
            status.load_weight,
            status.moving,
            status.door,
            snapshot.session_state,
            snapshot.link_state
        );
    }
}
