//! Session builder
//!
//! Picks a transport and a station configuration, then builds a
//! [`StationSession`] ready to `start()`.
//!
//! ```rust,no_run
//! use sec3000h::{Dialect, SessionBuilder, StationId};
//!
//! // Elevator simulator on a LAN serial bridge
//! let session = SessionBuilder::new()
//!     .tcp("192.168.1.50:4001")
//!     .data_source(StationId::ELEVATOR, StationId::AUTO_PILOT)
//!     .build_tcp()?;
//!
//! // Handshake controller on a USB adapter without parity
//! let session = SessionBuilder::new()
//!     .serial("/dev/ttyUSB0", 9600)
//!     .no_parity()
//!     .controller(StationId::AUTO_PILOT, StationId::ELEVATOR)
//!     .dialect(Dialect::Handshake)
//!     .build_serial()?;
//! # Ok::<(), sec3000h::SecError>(())
//! ```

use sec3000h_core::{Dialect, SecError, SecResult, StationId};
use sec3000h_station::{SessionConfig, StationSession};
use sec3000h_transport::{SerialSettings, SerialTransport, TcpSettings, TcpTransport};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
enum TransportType {
    Tcp { address: String },
    Serial { settings: SerialSettings },
    None,
}

/// Builder for station sessions
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    transport_type: TransportType,
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a builder for an elevator-side session with default timing
    pub fn new() -> Self {
        Self {
            transport_type: TransportType::None,
            config: SessionConfig::default(),
        }
    }

    /// Use a TCP serial bridge at `address` ("host:port")
    pub fn tcp(mut self, address: &str) -> Self {
        self.transport_type = TransportType::Tcp {
            address: address.to_string(),
        };
        self
    }

    /// Use a local serial port (8E1)
    pub fn serial(mut self, port_name: &str, baud_rate: u32) -> Self {
        self.transport_type = TransportType::Serial {
            settings: SerialSettings::new(port_name).with_baud_rate(baud_rate),
        };
        self
    }

    /// Use a local serial port with explicit settings
    pub fn serial_settings(mut self, settings: SerialSettings) -> Self {
        self.transport_type = TransportType::Serial { settings };
        self
    }

    /// Switch a configured serial port to no parity (8N1)
    pub fn no_parity(mut self) -> Self {
        if let TransportType::Serial { settings } = &mut self.transport_type {
            *settings = SerialSettings::legacy_no_parity(settings.port_name.clone())
                .with_baud_rate(settings.baud_rate);
        }
        self
    }

    pub fn controller(mut self, station_id: StationId, peer_station_id: StationId) -> Self {
        self.config = keep_timing(
            SessionConfig::controller(station_id, peer_station_id),
            &self.config,
        );
        self
    }

    pub fn data_source(mut self, station_id: StationId, peer_station_id: StationId) -> Self {
        self.config = keep_timing(
            SessionConfig::data_source(station_id, peer_station_id),
            &self.config,
        );
        self
    }

    /// Receive-only listener that never acknowledges
    pub fn listener(mut self, station_id: StationId, peer_station_id: StationId) -> Self {
        self.config = keep_timing(
            SessionConfig::listener(station_id, peer_station_id),
            &self.config,
        );
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Replace the whole session configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    /// Build a session on the configured serial port
    ///
    /// # Errors
    ///
    /// `InvalidData` if no serial port was configured or the configuration is invalid.
    pub fn build_serial(self) -> SecResult<StationSession<SerialTransport>> {
        let TransportType::Serial { settings } = self.transport_type else {
            return Err(SecError::InvalidData(
                "Transport type must be configured as Serial".to_string(),
            ));
        };
        log::debug!("Building session on serial port {}", settings.port_name);
        StationSession::new(SerialTransport::new(settings), self.config)
    }

    /// Build a session on the configured TCP bridge
    ///
    /// # Errors
    ///
    /// `InvalidData` if no TCP address was configured, it does not parse,
    /// or the configuration is invalid.
    pub fn build_tcp(self) -> SecResult<StationSession<TcpTransport>> {
        let TransportType::Tcp { address } = self.transport_type else {
            return Err(SecError::InvalidData(
                "Transport type must be configured as TCP".to_string(),
            ));
        };
        let address: SocketAddr = address
            .parse()
            .map_err(|e| SecError::InvalidData(format!("Invalid address {}: {}", address, e)))?;
        log::debug!("Building session on TCP bridge {}", address);
        StationSession::new(TcpTransport::new(TcpSettings::new(address)), self.config)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Carry over protocol settings chosen before the role was picked
fn keep_timing(role_config: SessionConfig, previous: &SessionConfig) -> SessionConfig {
    SessionConfig {
        dialect: previous.dialect,
        ack_timeout: previous.ack_timeout,
        max_retries: previous.max_retries,
        dedup_window: previous.dedup_window,
        arrival_policy: previous.arrival_policy,
        supervisor: previous.supervisor.clone(),
        ..role_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sec3000h_station::StationRole;
    use tokio_test::assert_ok;

    #[test]
    fn test_build_requires_transport() {
        let result = SessionBuilder::new().build_serial();
        assert!(matches!(result, Err(SecError::InvalidData(_))));
        let result = SessionBuilder::new().serial("/dev/ttyUSB0", 9600).build_tcp();
        assert!(matches!(result, Err(SecError::InvalidData(_))));
    }

    #[test]
    fn test_bad_tcp_address() {
        let result = SessionBuilder::new().tcp("not an address").build_tcp();
        assert!(matches!(result, Err(SecError::InvalidData(_))));
    }

    #[test]
    fn test_timing_survives_role_selection() {
        let builder = SessionBuilder::new()
            .ack_timeout(Duration::from_secs(1))
            .max_retries(2)
            .dialect(Dialect::Handshake)
            .controller(StationId::AUTO_PILOT, StationId::ELEVATOR);
        let config = builder.session_config();
        assert_eq!(config.role, StationRole::Controller);
        assert_eq!(config.ack_timeout, Duration::from_secs(1));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.dialect, Dialect::Handshake);
    }

    #[test]
    fn test_build_serial_session() {
        let session = assert_ok!(
            SessionBuilder::new()
                .serial("/dev/ttyUSB0", 19200)
                .no_parity()
                .listener(StationId::AUTO_PILOT, StationId::ELEVATOR)
                .build_serial()
        );
        assert!(session.config().promiscuous);
    }

    #[test]
    fn test_build_tcp_session() {
        let session = assert_ok!(
            SessionBuilder::new()
                .tcp("127.0.0.1:4001")
                .data_source(StationId::ELEVATOR, StationId::AUTO_PILOT)
                .build_tcp()
        );
        assert_eq!(session.config().role, StationRole::DataSource);
    }
}
