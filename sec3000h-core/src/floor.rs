//! Floor values as carried in the data-value field

use crate::error::{SecError, SecResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire value for basement level B1
pub const BASEMENT_VALUE: u16 = 0xFFFF;

/// Wire value meaning "no pending target" in the target-floor field
pub const NO_TARGET_VALUE: u16 = 0x0000;

/// A floor reported or requested on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Floor {
    /// Basement level B1 (wire value 0xFFFF)
    Basement,
    /// Above-ground level, literal floor number
    Level(u16),
}

impl Floor {
    /// Ground floor, the status default at session start
    pub const GROUND: Floor = Floor::Level(1);

    /// Decode a floor from its 16-bit wire value
    pub const fn from_value(value: u16) -> Self {
        if value == BASEMENT_VALUE {
            Floor::Basement
        } else {
            Floor::Level(value)
        }
    }

    /// Decode a target-floor field, where 0x0000 means no target
    pub const fn target_from_value(value: u16) -> Option<Self> {
        if value == NO_TARGET_VALUE {
            None
        } else {
            Some(Self::from_value(value))
        }
    }

    /// Encode into the 16-bit wire value
    pub const fn value(&self) -> u16 {
        match self {
            Floor::Basement => BASEMENT_VALUE,
            Floor::Level(n) => *n,
        }
    }

    /// Encode an optional target, mapping `None` to 0x0000
    pub fn target_value(target: Option<Floor>) -> u16 {
        target.map_or(NO_TARGET_VALUE, |f| f.value())
    }

    /// One-byte form used by the packed STATUS_RSP payload
    ///
    /// 0xFF is reserved for the basement, so only levels below 255 fit.
    pub const fn status_byte(&self) -> Option<u8> {
        match self {
            Floor::Basement => Some(0xFF),
            Floor::Level(n) if *n < 0xFF => Some(*n as u8),
            Floor::Level(_) => None,
        }
    }
}

impl Default for Floor {
    fn default() -> Self {
        Self::GROUND
    }
}

impl fmt::Display for Floor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Floor::Basement => write!(f, "B1F"),
            Floor::Level(n) => write!(f, "{}F", n),
        }
    }
}

impl FromStr for Floor {
    type Err = SecError;

    /// Parses "B1", "B1F", "3" or "3F"
    fn from_str(s: &str) -> SecResult<Self> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_suffix('F')
            .or_else(|| trimmed.strip_suffix('f'))
            .unwrap_or(trimmed);
        if body.eq_ignore_ascii_case("B1") {
            return Ok(Floor::Basement);
        }
        body.parse::<u16>()
            .ok()
            .filter(|n| *n != BASEMENT_VALUE)
            .map(Floor::Level)
            .ok_or_else(|| SecError::InvalidData(format!("Invalid floor: {:?}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_basement_sentinel() {
        assert_eq!(Floor::from_value(0xFFFF), Floor::Basement);
        assert_eq!(Floor::Basement.value(), 0xFFFF);
        assert_eq!(Floor::Basement.to_string(), "B1F");
        assert_eq!(Floor::from_value(3).to_string(), "3F");
    }

    #[test]
    fn test_target_none_sentinel() {
        assert_eq!(Floor::target_from_value(0x0000), None);
        assert_eq!(Floor::target_from_value(0x0005), Some(Floor::Level(5)));
        assert_eq!(Floor::target_value(None), 0);
        assert_eq!(Floor::target_value(Some(Floor::Basement)), 0xFFFF);
    }

    #[test]
    fn test_status_byte_range() {
        assert_eq!(Floor::Basement.status_byte(), Some(0xFF));
        assert_eq!(Floor::Level(3).status_byte(), Some(3));
        assert_eq!(Floor::Level(254).status_byte(), Some(254));
        assert_eq!(Floor::Level(255).status_byte(), None);
        assert_eq!(Floor::Level(0x0103).status_byte(), None);
    }

    #[test]
    fn test_parse_floor_names() {
        assert_eq!("B1F".parse::<Floor>().ok(), Some(Floor::Basement));
        assert_eq!("b1".parse::<Floor>().ok(), Some(Floor::Basement));
        assert_eq!("12F".parse::<Floor>().ok(), Some(Floor::Level(12)));
        assert_eq!("7".parse::<Floor>().ok(), Some(Floor::Level(7)));
        assert_err!("roof".parse::<Floor>());
    }

    #[test]
    fn test_default_is_ground() {
        assert_eq!(Floor::default(), Floor::Level(1));
    }
}
