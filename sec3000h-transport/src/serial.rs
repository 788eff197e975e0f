//! Serial port transport implementation

use crate::error::{SecError, SecResult};
use crate::stream::{already_open, not_connected, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Line speed used by every SEC-3000H installation
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Wrapper for SerialStream that implements Debug
struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

impl Deref for DebugSerialStream {
    type Target = SerialStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugSerialStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Serial port transport layer settings
///
/// Defaults to 9600 baud, 8 data bits, even parity, 1 stop bit.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
    pub timeout: Option<Duration>,
}

impl SerialSettings {
    /// Create serial settings for an RS-422/RS-485 adapter (9600 8E1)
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::Even,
            flow_control: tokio_serial::FlowControl::None,
            timeout: Some(Duration::from_millis(100)),
        }
    }

    /// Settings for the legacy receiver wiring (9600 8N1)
    pub fn legacy_no_parity(port_name: impl Into<String>) -> Self {
        Self::new(port_name).with_parity(tokio_serial::Parity::None)
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_parity(mut self, parity: tokio_serial::Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the per-read timeout used by the reader poll loop
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Serial port transport layer implementation
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<DebugSerialStream>,
    settings: SerialSettings,
    closed: bool,
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create serial transport with the default line settings
    pub fn new_simple(port_name: impl Into<String>) -> Self {
        Self::new(SerialSettings::new(port_name))
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> SecResult<()> {
        if !self.closed {
            return Err(already_open());
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);

        let stream = builder.open_native_async().map_err(|e| {
            SecError::Connection(std::io::Error::other(format!(
                "Failed to open serial port {}: {}",
                self.settings.port_name, e
            )))
        })?;

        log::debug!(
            "Opened serial port {} at {} baud ({:?} parity)",
            self.settings.port_name,
            self.settings.baud_rate,
            self.settings.parity
        );
        self.stream = Some(DebugSerialStream(stream));
        self.closed = false;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.settings.port_name)
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> SecResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> SecResult<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| not_connected("Serial stream"))?;

        let result = if let Some(timeout) = self.settings.timeout {
            tokio::time::timeout(timeout, stream.read(buf))
                .await
                .map_err(|_| SecError::Timeout)?
                .map_err(SecError::Connection)
        } else {
            stream.read(buf).await.map_err(SecError::Connection)
        };

        match result {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> SecResult<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| not_connected("Serial stream"))?;

        if let Some(timeout) = self.settings.timeout {
            tokio::time::timeout(timeout, stream.write(buf))
                .await
                .map_err(|_| SecError::Timeout)?
                .map_err(SecError::Connection)
        } else {
            stream.write(buf).await.map_err(SecError::Connection)
        }
    }

    async fn flush(&mut self) -> SecResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| not_connected("Serial stream"))?;

        stream.flush().await.map_err(SecError::Connection)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> SecResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.flush().await;
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_serial_settings_default_line() {
        let settings = SerialSettings::new("/dev/ttyUSB0");
        assert_eq!(settings.port_name, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.parity, tokio_serial::Parity::Even);
        assert_eq!(settings.data_bits, tokio_serial::DataBits::Eight);
        assert_eq!(settings.stop_bits, tokio_serial::StopBits::One);
    }

    #[test]
    fn test_legacy_no_parity() {
        let settings = SerialSettings::legacy_no_parity("/dev/ttyAMA0");
        assert_eq!(settings.parity, tokio_serial::Parity::None);
        assert_eq!(settings.baud_rate, 9600);
    }

    #[tokio::test]
    async fn test_io_before_open_fails() {
        let mut transport = SerialTransport::new_simple("/dev/does-not-exist");
        assert!(transport.is_closed());
        let mut buf = [0u8; 4];
        assert_err!(transport.read(&mut buf).await);
        assert_err!(transport.write(b"\x06").await);
        assert_eq!(transport.describe(), "serial:/dev/does-not-exist");
    }
}
