//! Resynchronizing byte-stream scanner
//!
//! Raw bytes from the device are appended to an internal buffer. The scanner
//! looks for the first control byte (ENQ, ACK or NAK), waits while the bytes
//! after it could still form a frame, and otherwise decodes. Any failure drops
//! exactly one byte and the search starts over, which recovers from line noise
//! and from attaching to the line in the middle of a frame.

use crate::error::SecError;
use crate::frame::{ACK, ENQ, Frame, NAK, hex_dump};
use bytes::{Buf, BytesMut};

/// Counters kept by the scanner across its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounters {
    pub frames: u64,
    pub bytes_discarded: u64,
    pub malformed_frames: u64,
    pub checksum_errors: u64,
}

/// Frame scanner over a growable byte buffer
#[derive(Debug, Default)]
pub struct FrameScanner {
    buffer: BytesMut,
    counters: ScanCounters,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Direct access to the buffer for transports that read into it
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of buffered bytes not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn counters(&self) -> ScanCounters {
        self.counters
    }

    /// Drop buffered bytes, e.g. after the device was reopened
    pub fn clear(&mut self) {
        if !self.buffer.is_empty() {
            log::trace!("Dropping {} buffered bytes", self.buffer.len());
            self.counters.bytes_discarded += self.buffer.len() as u64;
            self.buffer.clear();
        }
    }

    /// Extract the next valid frame, if the buffer holds one
    ///
    /// Returns `None` when more bytes are needed. Frames come out in the
    /// order their bytes arrived.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let start = self
                .buffer
                .iter()
                .position(|b| matches!(*b, ENQ | ACK | NAK));

            let Some(start) = start else {
                self.discard(self.buffer.len());
                return None;
            };
            self.discard(start);

            let len = Frame::expected_len(self.buffer[0])?;
            if self.buffer.len() < len {
                if Frame::is_plausible_prefix(&self.buffer) {
                    return None;
                }
                self.counters.malformed_frames += 1;
                self.discard(1);
                continue;
            }

            match Frame::decode(&self.buffer[..len]) {
                Ok(frame) => {
                    log::trace!("Scanned frame: {}", hex_dump(&self.buffer[..len]));
                    self.buffer.advance(len);
                    self.counters.frames += 1;
                    return Some(frame);
                }
                Err(e) => {
                    match e {
                        SecError::ChecksumMismatch { .. } => self.counters.checksum_errors += 1,
                        _ => self.counters.malformed_frames += 1,
                    }
                    log::debug!("Resynchronizing after {}", e);
                    self.discard(1);
                }
            }
        }
    }

    /// Extract every complete frame currently buffered
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    fn discard(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        log::trace!("Discarding {}", hex_dump(&self.buffer[..n]));
        self.buffer.advance(n);
        self.counters.bytes_discarded += n as u64;
    }
}
