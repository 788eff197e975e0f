//! Session configuration
//!
//! A `SessionConfig` is the only place station identity and protocol timing
//! live; every session owns its own copy.
//!
//! ```rust,no_run
//! use sec3000h_core::{Dialect, StationId};
//! use sec3000h_station::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::controller(StationId::AUTO_PILOT, StationId::ELEVATOR)
//!     .with_dialect(Dialect::Handshake)
//!     .with_ack_timeout(Duration::from_secs(3))
//!     .with_max_retries(8);
//! ```

use crate::dedup::DEFAULT_DEDUP_WINDOW;
use crate::error::{SecError, SecResult};
use crate::role::StationRole;
use crate::status::ArrivalPolicy;
use sec3000h_core::{Dialect, StationId};
use sec3000h_link::SupervisorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wait for an ACK or handshake reply
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of resends after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// This station's id
    pub station_id: StationId,
    /// The other end of the link
    pub peer_station_id: StationId,
    pub role: StationRole,
    pub dialect: Dialect,
    pub ack_timeout: Duration,
    pub max_retries: u32,
    pub dedup_window: Duration,
    pub arrival_policy: ArrivalPolicy,
    /// Acknowledge command frames addressed to this station
    pub send_acks: bool,
    /// Treat an ACK carrying this station's own id as the peer's
    pub accept_echoed_ack: bool,
    /// Process command frames addressed to any station
    pub promiscuous: bool,
    pub supervisor: SupervisorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            station_id: StationId::ELEVATOR,
            peer_station_id: StationId::AUTO_PILOT,
            role: StationRole::DataSource,
            dialect: Dialect::Standard,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            arrival_policy: ArrivalPolicy::default(),
            send_acks: true,
            accept_echoed_ack: true,
            promiscuous: false,
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Elevator-side session
    pub fn data_source(station_id: StationId, peer_station_id: StationId) -> Self {
        Self {
            station_id,
            peer_station_id,
            role: StationRole::DataSource,
            ..Self::default()
        }
    }

    /// Auto-pilot-side session
    pub fn controller(station_id: StationId, peer_station_id: StationId) -> Self {
        Self {
            station_id,
            peer_station_id,
            role: StationRole::Controller,
            ..Self::default()
        }
    }

    /// Passive listener: processes every report on the line and never transmits ACKs
    pub fn listener(station_id: StationId, peer_station_id: StationId) -> Self {
        Self {
            station_id,
            peer_station_id,
            role: StationRole::Controller,
            send_acks: false,
            promiscuous: true,
            ..Self::default()
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn with_arrival_policy(mut self, policy: ArrivalPolicy) -> Self {
        self.arrival_policy = policy;
        self
    }

    pub fn with_send_acks(mut self, send_acks: bool) -> Self {
        self.send_acks = send_acks;
        self
    }

    pub fn with_accept_echoed_ack(mut self, accept: bool) -> Self {
        self.accept_echoed_ack = accept;
        self
    }

    pub fn with_promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    pub fn with_supervisor(mut self, supervisor: SupervisorConfig) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Check the configuration before a session is built from it
    ///
    /// # Errors
    ///
    /// `InvalidData` if both ends share one station id or the ACK timeout is zero.
    pub fn validate(&self) -> SecResult<()> {
        if self.station_id == self.peer_station_id {
            return Err(SecError::InvalidData(format!(
                "Station id {} is used for both ends of the link",
                self.station_id
            )));
        }
        if self.ack_timeout.is_zero() {
            return Err(SecError::InvalidData("ACK timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}
