//! Stream accessor trait for the transport layer

use crate::error::{SecError, SecResult};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;

/// Size of the scratch buffer used by [`StreamAccessor::read_into`]
pub const READ_CHUNK_SIZE: usize = 256;

/// Stream accessor interface to the physical device handle of one station
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Set the read timeout
    ///
    /// # Arguments
    ///
    /// * `timeout` - The timeout duration. None means infinite timeout.
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> SecResult<()>;

    /// Read data from the stream
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if EOF. A read that sees no data within the
    /// configured timeout fails with `SecError::Timeout` and leaves the
    /// stream open.
    async fn read(&mut self, buf: &mut [u8]) -> SecResult<usize>;

    /// Read whatever is available and append it to `buf`
    ///
    /// # Returns
    ///
    /// Number of bytes appended, or 0 if EOF
    async fn read_into(&mut self, buf: &mut BytesMut) -> SecResult<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = self.read(&mut chunk).await?;
        buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Write data to the stream
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn write(&mut self, buf: &[u8]) -> SecResult<usize>;

    /// Write all data to the stream
    async fn write_all(&mut self, buf: &[u8]) -> SecResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(SecError::Connection(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&mut self) -> SecResult<()>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    async fn close(&mut self) -> SecResult<()>;
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection
    async fn open(&mut self) -> SecResult<()>;

    /// Short human-readable name of the device, used in log lines
    fn describe(&self) -> String;
}

pub(crate) fn not_connected(what: &str) -> SecError {
    SecError::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        format!("{} not connected", what),
    ))
}

pub(crate) fn already_open() -> SecError {
    SecError::Connection(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "Connection has already been opened",
    ))
}
