use crate::error::{SecError, SecResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Width of a station identifier on the wire
pub const STATION_ID_LEN: usize = 4;

/// Station identifier
///
/// A fixed-width, 4-digit decimal ASCII string ("0001", "0002") naming one
/// endpoint of the link. It travels verbatim in both frame shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StationId {
    digits: [u8; STATION_ID_LEN],
}

impl StationId {
    /// Station id conventionally used by the supervising auto-pilot
    pub const AUTO_PILOT: StationId = StationId { digits: *b"0001" };

    /// Station id conventionally used by the elevator controller
    pub const ELEVATOR: StationId = StationId { digits: *b"0002" };

    /// Parse a station identifier from text
    ///
    /// # Errors
    /// Returns `SecError::InvalidData` unless `s` is exactly four ASCII digits.
    pub fn new(s: &str) -> SecResult<Self> {
        Self::from_bytes(s.as_bytes())
    }

    /// Build a station identifier from raw frame bytes
    pub fn from_bytes(bytes: &[u8]) -> SecResult<Self> {
        if bytes.len() != STATION_ID_LEN {
            return Err(SecError::InvalidData(format!(
                "Station id must be {} digits, got {} bytes",
                STATION_ID_LEN,
                bytes.len()
            )));
        }
        if !bytes.iter().all(u8::is_ascii_digit) {
            return Err(SecError::InvalidData(format!(
                "Station id must be ASCII digits: {:02X?}",
                bytes
            )));
        }
        let mut digits = [0u8; STATION_ID_LEN];
        digits.copy_from_slice(bytes);
        Ok(Self { digits })
    }

    /// Build a station identifier from a number in 0..=9999
    pub fn from_number(number: u16) -> SecResult<Self> {
        if number > 9999 {
            return Err(SecError::InvalidData(format!(
                "Station number out of range: {}",
                number
            )));
        }
        Self::new(&format!("{:04}", number))
    }

    /// Raw ASCII bytes as they appear on the wire
    pub fn as_bytes(&self) -> &[u8; STATION_ID_LEN] {
        &self.digits
    }

    /// Text form of the identifier
    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored.
        std::str::from_utf8(&self.digits).unwrap_or("????")
    }

    /// Numeric value of the identifier
    pub fn number(&self) -> u16 {
        self.digits
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'))
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StationId {
    type Err = SecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for StationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StationId::new(&s).map_err(serde::de::Error::custom)
    }
}
