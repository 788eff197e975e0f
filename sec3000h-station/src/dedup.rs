//! Duplicate suppression for data reports
//!
//! The line re-transmits identical status frames much faster than the
//! status changes. Per data number the last `(value, first seen)` pair is
//! kept; a repeat of the same value inside the window is a duplicate. The
//! timestamp is not refreshed by duplicates, so a value that keeps being
//! announced is reported again once the window has lapsed.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default suppression window
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(200);

/// Per-data-number duplicate filter
#[derive(Debug, Clone)]
pub struct Deduplicator {
    window: Duration,
    last: HashMap<u16, (u16, Instant)>,
}

impl Deduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check `(data_number, value)` seen at `now`, recording it unless it is a duplicate
    pub fn is_duplicate(&mut self, data_number: u16, value: u16, now: Instant) -> bool {
        match self.last.get(&data_number) {
            Some(&(last_value, seen))
                if last_value == value && now.saturating_duration_since(seen) <= self.window =>
            {
                true
            }
            _ => {
                self.last.insert(data_number, (value, now));
                false
            }
        }
    }

    /// Forget everything, e.g. after the link was lost
    pub fn reset(&mut self) {
        self.last.clear();
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
