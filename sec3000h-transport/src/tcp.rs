//! TCP transport implementation
//!
//! Used when the RS-422 line is reached through a LAN serial bridge.

use crate::error::{SecError, SecResult};
use crate::stream::{already_open, not_connected, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Wrapper for TcpStream that implements Debug
struct DebugTcpStream(TcpStream);

impl fmt::Debug for DebugTcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpStream").finish()
    }
}

impl Deref for DebugTcpStream {
    type Target = TcpStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugTcpStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    /// Per-read/write timeout
    pub timeout: Option<Duration>,
    /// Bound on connection establishment
    pub connect_timeout: Duration,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: Some(Duration::from_millis(100)),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// TCP transport layer implementation
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<DebugTcpStream>,
    settings: TcpSettings,
    closed: bool,
}

impl TcpTransport {
    /// Create a new TCP transport layer
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create TCP transport from address string
    pub fn from_address(address: &str) -> SecResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| SecError::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(TcpSettings::new(addr)))
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> SecResult<()> {
        if !self.closed {
            return Err(already_open());
        }

        let stream = tokio::time::timeout(
            self.settings.connect_timeout,
            TcpStream::connect(self.settings.address),
        )
        .await
        .map_err(|_| SecError::Timeout)?
        .map_err(SecError::Connection)?;
        stream.set_nodelay(true).map_err(SecError::Connection)?;

        log::debug!("Connected to serial bridge at {}", self.settings.address);
        self.stream = Some(DebugTcpStream(stream));
        self.closed = false;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.settings.address)
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> SecResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> SecResult<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| not_connected("TCP stream"))?;

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
            .ok_or_else(|| not_connected("TCP stream"))?;

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
            .ok_or_else(|| not_connected("TCP stream"))?;

        stream.flush().await.map_err(SecError::Connection)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> SecResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}
