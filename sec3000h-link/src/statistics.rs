//! Link statistics collection

use crate::scanner::ScanCounters;
use serde::{Deserialize, Serialize};

/// Link statistics
///
/// Updated by the supervisor while it runs; read through
/// [`LinkHandle::statistics`](crate::supervisor::LinkHandle::statistics),
/// which returns a copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatistics {
    /// Valid frames extracted by the scanner
    pub frames_received: u64,
    /// Frames written to the device
    pub frames_sent: u64,
    /// Raw bytes read from the device
    pub bytes_received: u64,
    /// Bytes dropped while resynchronizing
    pub bytes_discarded: u64,
    /// Structurally invalid frames skipped
    pub malformed_frames: u64,
    /// Well-formed command frames with a bad checksum
    pub checksum_errors: u64,
    /// NAK frames received
    pub naks_received: u64,
    /// Read or write failures
    pub io_errors: u64,
    /// Successful device opens after the first
    pub reconnects: u64,
    /// Failed open attempts
    pub failed_opens: u64,
    /// Idle periods that triggered a probe
    pub idle_probes: u64,
}

impl LinkStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_frames_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub fn increment_naks(&mut self) {
        self.naks_received += 1;
    }

    pub fn increment_io_errors(&mut self) {
        self.io_errors += 1;
    }

    pub fn increment_reconnects(&mut self) {
        self.reconnects += 1;
    }

    pub fn increment_failed_opens(&mut self) {
        self.failed_opens += 1;
    }

    pub fn increment_idle_probes(&mut self) {
        self.idle_probes += 1;
    }

    pub fn add_bytes_received(&mut self, n: usize) {
        self.bytes_received += n as u64;
    }

    /// Take over the scanner's running totals
    pub fn absorb_scan(&mut self, counters: ScanCounters) {
        self.frames_received = counters.frames;
        self.bytes_discarded = counters.bytes_discarded;
        self.malformed_frames = counters.malformed_frames;
        self.checksum_errors = counters.checksum_errors;
    }

    /// Share of received frame candidates that were rejected, in percent
    ///
    /// Returns 0.0 if nothing has been received.
    pub fn error_rate(&self) -> f64 {
        let rejected = self.malformed_frames + self.checksum_errors;
        let total = self.frames_received + rejected;
        if total == 0 {
            0.0
        } else {
            (rejected as f64 / total as f64) * 100.0
        }
    }
}
