//! In-memory loopback transport
//!
//! Backed by `tokio::io::duplex`. Each successful `open` takes the next
//! queued stream, so a test can hand out a fresh connection per reconnect
//! and inject a number of failed open attempts or failed reads up front.

use crate::error::{SecError, SecResult};
use crate::stream::{already_open, not_connected, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Default buffer size of a loopback pair
pub const DEFAULT_DUPLEX_CAPACITY: usize = 1024;

/// In-memory transport layer implementation
#[derive(Debug)]
pub struct MemoryTransport {
    name: String,
    stream: Option<DuplexStream>,
    pending: VecDeque<DuplexStream>,
    open_failures: u32,
    open_attempts: u32,
    read_failures: u32,
    timeout: Option<Duration>,
    closed: bool,
}

impl MemoryTransport {
    /// Create a transport that yields `stream` on its first successful open
    pub fn new(name: impl Into<String>, stream: DuplexStream) -> Self {
        Self::from_streams(name, vec![stream])
    }

    /// Create a transport that yields one stream per successful open
    pub fn from_streams(name: impl Into<String>, streams: Vec<DuplexStream>) -> Self {
        Self {
            name: name.into(),
            stream: None,
            pending: streams.into(),
            open_failures: 0,
            open_attempts: 0,
            read_failures: 0,
            timeout: Some(Duration::from_millis(100)),
            closed: true,
        }
    }

    /// Create two transports wired to each other
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(capacity);
        (Self::new("memory:a", a), Self::new("memory:b", b))
    }

    /// Fail the next `failures` open attempts
    pub fn with_open_failures(mut self, failures: u32) -> Self {
        self.open_failures = failures;
        self
    }

    /// Fail the next `failures` reads with an I/O error, leaving the stream open
    pub fn with_read_failures(mut self, failures: u32) -> Self {
        self.read_failures = failures;
        self
    }

    /// Number of times `open` has been called
    pub fn open_attempts(&self) -> u32 {
        self.open_attempts
    }
}

#[async_trait]
impl TransportLayer for MemoryTransport {
    async fn open(&mut self) -> SecResult<()> {
        if !self.closed {
            return Err(already_open());
        }
        self.open_attempts += 1;

        if self.open_failures > 0 {
            self.open_failures -= 1;
            return Err(SecError::Connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{}: injected open failure", self.name),
            )));
        }

        let stream = self.pending.pop_front().ok_or_else(|| {
            SecError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: no device available", self.name),
            ))
        })?;
        self.stream = Some(stream);
        self.closed = false;
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[async_trait]
impl StreamAccessor for MemoryTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> SecResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> SecResult<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| not_connected("Memory stream"))?;

        if self.read_failures > 0 {
            self.read_failures -= 1;
            return Err(SecError::Connection(std::io::Error::other(format!(
                "{}: injected read failure",
                self.name
            ))));
        }

        let result = if let Some(timeout) = self.timeout {
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
            .ok_or_else(|| not_connected("Memory stream"))?;
        stream.write(buf).await.map_err(SecError::Connection)
    }

    async fn flush(&mut self) -> SecResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| not_connected("Memory stream"))?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_pair_loopback() {
        let (mut a, mut b) = MemoryTransport::pair(DEFAULT_DUPLEX_CAPACITY);
        assert_ok!(a.open().await);
        assert_ok!(b.open().await);

        assert_ok!(a.write_all(b"\x060002").await);
        let mut buf = [0u8; 5];
        let n = assert_ok!(b.read(&mut buf).await);
        assert_eq!(&buf[..n], b"\x060002");
    }

    #[tokio::test]
    async fn test_read_timeout_keeps_stream_open() {
        let (mut a, _b) = MemoryTransport::pair(64);
        assert_ok!(a.open().await);
        assert_ok!(a.set_timeout(Some(Duration::from_millis(10))).await);
        let mut buf = [0u8; 8];
        assert!(matches!(a.read(&mut buf).await, Err(SecError::Timeout)));
        assert!(!a.is_closed());
    }

    #[tokio::test]
    async fn test_injected_open_failures() {
        let (stream, _peer) = tokio::io::duplex(64);
        let mut transport = MemoryTransport::new("memory:test", stream).with_open_failures(2);
        assert_err!(transport.open().await);
        assert_err!(transport.open().await);
        assert_ok!(transport.open().await);
        assert_eq!(transport.open_attempts(), 3);
    }

    #[tokio::test]
    async fn test_injected_read_failures_keep_stream_open() {
        let (stream, mut peer) = tokio::io::duplex(64);
        let mut transport = MemoryTransport::new("memory:test", stream).with_read_failures(1);
        assert_ok!(transport.open().await);
        assert_ok!(peer.write_all(b"\x060002").await);

        let mut buf = [0u8; 8];
        assert!(matches!(transport.read(&mut buf).await, Err(SecError::Connection(_))));
        assert!(!transport.is_closed());
        let n = assert_ok!(transport.read(&mut buf).await);
        assert_eq!(&buf[..n], b"\x060002");
    }

    #[tokio::test]
    async fn test_peer_drop_reads_eof() {
        let (stream, peer) = tokio::io::duplex(64);
        let mut transport = MemoryTransport::new("memory:test", stream);
        assert_ok!(transport.open().await);
        drop(peer);
        let mut buf = [0u8; 8];
        assert_eq!(assert_ok!(transport.read(&mut buf).await), 0);
        assert!(transport.is_closed());

        assert_ok!(transport.close().await);
        // Only one device was queued.
        assert_err!(transport.open().await);
    }
}
