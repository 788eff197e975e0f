//! Additive checksum of the SEC-3000H command frame
//!
//! All bytes after the ENQ control byte and before the checksum field are
//! summed into a 16-bit accumulator. The high and low bytes of the sum are
//! then added and masked to 8 bits, and the result travels as two uppercase
//! hex digits.

use crate::error::{SecError, SecResult};

/// Checksum calculator
#[derive(Debug, Clone, Default)]
pub struct ChecksumCalc {
    accumulator: u16,
}

impl ChecksumCalc {
    /// Create a new checksum calculator
    pub fn new() -> Self {
        Self { accumulator: 0 }
    }

    /// Reset the accumulator
    pub fn reset(&mut self) {
        self.accumulator = 0;
    }

    /// Add a single byte
    pub fn update(&mut self, data: u8) {
        self.accumulator = self.accumulator.wrapping_add(u16::from(data));
    }

    /// Add multiple bytes
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Raw 16-bit sum
    pub fn sum(&self) -> u16 {
        self.accumulator
    }

    /// Folded 8-bit checksum value
    pub fn value(&self) -> u8 {
        let lo = self.accumulator & 0xFF;
        let hi = (self.accumulator >> 8) & 0xFF;
        ((lo + hi) & 0xFF) as u8
    }

    /// Checksum as two uppercase hex ASCII digits
    pub fn to_hex(&self) -> [u8; 2] {
        hex_byte(self.value())
    }
}

/// Compute the checksum over `bytes`
pub fn compute(bytes: &[u8]) -> u8 {
    let mut calc = ChecksumCalc::new();
    calc.update_bytes(bytes);
    calc.value()
}

/// Compute the checksum over `bytes` as the 2-character wire field
pub fn compute_hex(bytes: &[u8]) -> String {
    format!("{:02X}", compute(bytes))
}

/// Check a claimed checksum field against `bytes`, ignoring hex case
pub fn verify(bytes: &[u8], claimed: &[u8]) -> bool {
    let expected = hex_byte(compute(bytes));
    claimed.len() == 2 && claimed.eq_ignore_ascii_case(&expected)
}

/// Like [`verify`], but reports what was computed on mismatch
pub fn validate(bytes: &[u8], claimed: &[u8]) -> SecResult<()> {
    if verify(bytes, claimed) {
        Ok(())
    } else {
        Err(SecError::ChecksumMismatch {
            expected: compute_hex(bytes),
            actual: String::from_utf8_lossy(claimed).into_owned(),
        })
    }
}

fn hex_byte(value: u8) -> [u8; 2] {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    [DIGITS[usize::from(value >> 4)], DIGITS[usize::from(value & 0x0F)]]
}
