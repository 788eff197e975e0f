//! SEC-3000H frame encoding and decoding
//!
//! Two frame shapes exist on the wire:
//!
//! ```text
//! Command (16 bytes): [ENQ][station:4 digits]['W'][data_num:4 hex][value:4 hex][checksum:2 hex]
//! Ack     ( 5 bytes): [ACK|NAK][station:4 digits]
//! ```
//!
//! The checksum covers bytes 1..14 (everything after ENQ, before the checksum).

use crate::checksum;
use crate::error::{SecError, SecResult};
use sec3000h_core::StationId;
use std::fmt;

/// Start of a command frame
pub const ENQ: u8 = 0x05;
/// Positive acknowledgement
pub const ACK: u8 = 0x06;
/// Negative acknowledgement
pub const NAK: u8 = 0x15;
/// The only command byte observed on the link
pub const WRITE_COMMAND: u8 = b'W';

pub const COMMAND_FRAME_LEN: usize = 16;
pub const ACK_FRAME_LEN: usize = 5;

const STATION_RANGE: std::ops::Range<usize> = 1..5;
const COMMAND_INDEX: usize = 5;
const DATA_NUMBER_RANGE: std::ops::Range<usize> = 6..10;
const DATA_VALUE_RANGE: std::ops::Range<usize> = 10..14;
const CHECKSUM_RANGE: std::ops::Range<usize> = 14..16;

/// Command frame: a write of one data value to one station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    /// Destination station
    pub station: StationId,
    pub data_number: u16,
    pub data_value: u16,
}

impl CommandFrame {
    pub fn new(station: StationId, data_number: u16, data_value: u16) -> Self {
        Self {
            station,
            data_number,
            data_value,
        }
    }

    /// Encode into the 16-byte wire form
    pub fn encode(&self) -> [u8; COMMAND_FRAME_LEN] {
        let mut out = [0u8; COMMAND_FRAME_LEN];
        out[0] = ENQ;
        out[STATION_RANGE].copy_from_slice(self.station.as_bytes());
        out[COMMAND_INDEX] = WRITE_COMMAND;
        out[DATA_NUMBER_RANGE].copy_from_slice(format!("{:04X}", self.data_number).as_bytes());
        out[DATA_VALUE_RANGE].copy_from_slice(format!("{:04X}", self.data_value).as_bytes());
        let sum = checksum::compute_hex(&out[1..CHECKSUM_RANGE.start]);
        out[CHECKSUM_RANGE].copy_from_slice(sum.as_bytes());
        out
    }

    /// Decode a 16-byte command frame
    ///
    /// # Errors
    ///
    /// Returns `MalformedCommand` if the length, control byte, station digits,
    /// command byte or hex fields are wrong, and `ChecksumMismatch` if the
    /// frame is well formed but fails its checksum.
    pub fn decode(bytes: &[u8]) -> SecResult<Self> {
        if bytes.len() != COMMAND_FRAME_LEN {
            return Err(SecError::MalformedCommand(format!(
                "Expected {} bytes, got {}",
                COMMAND_FRAME_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != ENQ {
            return Err(SecError::MalformedCommand(format!(
                "Expected ENQ, got 0x{:02X}",
                bytes[0]
            )));
        }
        let station = StationId::from_bytes(&bytes[STATION_RANGE])
            .map_err(|e| SecError::MalformedCommand(e.to_string()))?;
        if bytes[COMMAND_INDEX] != WRITE_COMMAND {
            return Err(SecError::MalformedCommand(format!(
                "Unsupported command byte 0x{:02X}",
                bytes[COMMAND_INDEX]
            )));
        }
        let data_number = parse_hex_u16(&bytes[DATA_NUMBER_RANGE])
            .ok_or_else(|| SecError::MalformedCommand("Data number is not hex".to_string()))?;
        let data_value = parse_hex_u16(&bytes[DATA_VALUE_RANGE])
            .ok_or_else(|| SecError::MalformedCommand("Data value is not hex".to_string()))?;
        let claimed = &bytes[CHECKSUM_RANGE];
        if !claimed.iter().all(u8::is_ascii_hexdigit) {
            return Err(SecError::MalformedCommand(
                "Checksum is not hex".to_string(),
            ));
        }
        checksum::validate(&bytes[1..CHECKSUM_RANGE.start], claimed)?;

        Ok(Self {
            station,
            data_number,
            data_value,
        })
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "W to {} [0x{:04X}] = 0x{:04X}",
            self.station, self.data_number, self.data_value
        )
    }
}

/// Kind of acknowledgement frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    Ack,
    Nak,
}

impl AckKind {
    pub const fn control_byte(&self) -> u8 {
        match self {
            AckKind::Ack => ACK,
            AckKind::Nak => NAK,
        }
    }

    pub const fn from_control_byte(byte: u8) -> Option<Self> {
        match byte {
            ACK => Some(AckKind::Ack),
            NAK => Some(AckKind::Nak),
            _ => None,
        }
    }
}

/// Acknowledgement frame naming the acknowledging station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckFrame {
    pub kind: AckKind,
    pub station: StationId,
}

impl AckFrame {
    pub fn ack(station: StationId) -> Self {
        Self {
            kind: AckKind::Ack,
            station,
        }
    }

    pub fn nak(station: StationId) -> Self {
        Self {
            kind: AckKind::Nak,
            station,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.kind == AckKind::Ack
    }

    /// Encode into the 5-byte wire form
    pub fn encode(&self) -> [u8; ACK_FRAME_LEN] {
        let mut out = [0u8; ACK_FRAME_LEN];
        out[0] = self.kind.control_byte();
        out[STATION_RANGE].copy_from_slice(self.station.as_bytes());
        out
    }

    /// Decode a 5-byte ACK/NAK frame
    pub fn decode(bytes: &[u8]) -> SecResult<Self> {
        if bytes.len() != ACK_FRAME_LEN {
            return Err(SecError::MalformedAck(format!(
                "Expected {} bytes, got {}",
                ACK_FRAME_LEN,
                bytes.len()
            )));
        }
        let kind = AckKind::from_control_byte(bytes[0]).ok_or_else(|| {
            SecError::MalformedAck(format!("Expected ACK or NAK, got 0x{:02X}", bytes[0]))
        })?;
        let station = StationId::from_bytes(&bytes[STATION_RANGE])
            .map_err(|e| SecError::MalformedAck(e.to_string()))?;
        Ok(Self { kind, station })
    }
}

impl fmt::Display for AckFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AckKind::Ack => write!(f, "ACK from {}", self.station),
            AckKind::Nak => write!(f, "NAK from {}", self.station),
        }
    }
}

/// Any decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    Command(CommandFrame),
    Ack(AckFrame),
}

impl Frame {
    /// Decode a frame, dispatching on its first byte
    ///
    /// Never panics on arbitrary input; every failure is a typed error the
    /// caller can resynchronize on.
    pub fn decode(bytes: &[u8]) -> SecResult<Self> {
        match bytes.first() {
            Some(&ENQ) => CommandFrame::decode(bytes).map(Frame::Command),
            Some(&ACK) | Some(&NAK) => AckFrame::decode(bytes).map(Frame::Ack),
            Some(other) => Err(SecError::MalformedFrame(format!(
                "Unknown control byte 0x{:02X}",
                other
            ))),
            None => Err(SecError::MalformedFrame("Empty input".to_string())),
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Command(cmd) => cmd.encode().to_vec(),
            Frame::Ack(ack) => ack.encode().to_vec(),
        }
    }

    /// Wire length of the frame
    pub fn wire_len(&self) -> usize {
        match self {
            Frame::Command(_) => COMMAND_FRAME_LEN,
            Frame::Ack(_) => ACK_FRAME_LEN,
        }
    }

    pub fn station(&self) -> StationId {
        match self {
            Frame::Command(cmd) => cmd.station,
            Frame::Ack(ack) => ack.station,
        }
    }

    /// Wire length implied by a control byte, if it starts a frame
    pub const fn expected_len(control: u8) -> Option<usize> {
        match control {
            ENQ => Some(COMMAND_FRAME_LEN),
            ACK | NAK => Some(ACK_FRAME_LEN),
            _ => None,
        }
    }

    /// Whether `partial` could still grow into a well-formed frame
    ///
    /// Used by the scanner to decide between waiting for more bytes and
    /// dropping a byte to resynchronize. The checksum value itself is not
    /// checked here.
    pub fn is_plausible_prefix(partial: &[u8]) -> bool {
        let Some(&control) = partial.first() else {
            return false;
        };
        let Some(len) = Self::expected_len(control) else {
            return false;
        };
        partial.iter().take(len).enumerate().skip(1).all(|(i, b)| match i {
            1..=4 => b.is_ascii_digit(),
            COMMAND_INDEX => *b == WRITE_COMMAND,
            _ => b.is_ascii_hexdigit(),
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Command(cmd) => write!(f, "{}", cmd),
            Frame::Ack(ack) => write!(f, "{}", ack),
        }
    }
}

impl From<CommandFrame> for Frame {
    fn from(cmd: CommandFrame) -> Self {
        Frame::Command(cmd)
    }
}

impl From<AckFrame> for Frame {
    fn from(ack: AckFrame) -> Self {
        Frame::Ack(ack)
    }
}

/// Build the 16-byte command frame for `(station, data_number, data_value)`
pub fn encode_command(station: StationId, data_number: u16, data_value: u16) -> [u8; COMMAND_FRAME_LEN] {
    CommandFrame::new(station, data_number, data_value).encode()
}

/// Build the 5-byte positive acknowledgement for `station`
pub fn encode_ack(station: StationId) -> [u8; ACK_FRAME_LEN] {
    AckFrame::ack(station).encode()
}

/// Space-separated hex dump for debug logging
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_hex_u16(field: &[u8]) -> Option<u16> {
    if field.len() != 4 || !field.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(field).ok()?;
    u16::from_str_radix(text, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn station(s: &str) -> StationId {
        StationId::new(s).unwrap()
    }

    #[test]
    fn test_encode_reference_frame() {
        let bytes = encode_command(station("0001"), 0x0010, 0x0001);
        assert_eq!(&bytes, b"\x050001W001000019C");
        assert_eq!(bytes.len(), COMMAND_FRAME_LEN);
    }

    #[test]
    fn test_encode_uses_uppercase_hex() {
        let bytes = encode_command(station("0002"), 0x0003, 0xABCD);
        assert_eq!(&bytes[6..14], b"0003ABCD");
        let decoded = assert_ok!(CommandFrame::decode(&bytes));
        assert_eq!(decoded.data_value, 0xABCD);
        assert_eq!(decoded.station, station("0002"));
        assert_eq!(Frame::Command(decoded).wire_len(), COMMAND_FRAME_LEN);
    }

    #[test]
    fn test_decode_accepts_lowercase_hex() {
        let mut bytes = *b"\x050002W0003abcd00";
        let sum = checksum::compute_hex(&bytes[1..14]).to_lowercase();
        bytes[14..16].copy_from_slice(sum.as_bytes());
        let frame = assert_ok!(Frame::decode(&bytes));
        match frame {
            Frame::Command(cmd) => assert_eq!(cmd.data_value, 0xABCD),
            other => panic!("unexpected frame: {other}"),
        }
    }

    #[test]
    fn test_decode_basement_value() {
        let bytes = encode_command(station("0001"), 0x0001, 0xFFFF);
        let cmd = assert_ok!(CommandFrame::decode(&bytes));
        assert_eq!(cmd.data_value, 0xFFFF);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = encode_command(station("0001"), 0x0002, 0x0003);
        bytes[15] = if bytes[15] == b'0' { b'1' } else { b'0' };
        let err = assert_err!(Frame::decode(&bytes));
        assert!(matches!(err, SecError::ChecksumMismatch { .. }));
        assert!(err.is_frame_error());
    }

    #[test]
    fn test_malformed_command_fields() {
        let good = encode_command(station("0001"), 0x0002, 0x0003);

        let mut bad_station = good;
        bad_station[2] = b'X';
        assert!(matches!(
            Frame::decode(&bad_station),
            Err(SecError::MalformedCommand(_))
        ));

        let mut bad_cmd = good;
        bad_cmd[5] = b'R';
        assert!(matches!(
            Frame::decode(&bad_cmd),
            Err(SecError::MalformedCommand(_))
        ));

        let mut bad_hex = good;
        bad_hex[8] = b'G';
        assert!(matches!(
            Frame::decode(&bad_hex),
            Err(SecError::MalformedCommand(_))
        ));

        assert!(matches!(
            Frame::decode(&good[..15]),
            Err(SecError::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_ack_and_nak() {
        let ack = encode_ack(station("0002"));
        assert_eq!(&ack, b"\x060002");
        let frame = assert_ok!(Frame::decode(&ack));
        assert_eq!(frame, Frame::Ack(AckFrame::ack(station("0002"))));
        assert_eq!(frame.wire_len(), ACK_FRAME_LEN);

        let nak = AckFrame::nak(station("0001")).encode();
        let decoded = assert_ok!(AckFrame::decode(&nak));
        assert!(!decoded.is_ack());

        assert!(matches!(
            Frame::decode(b"\x0600A2"),
            Err(SecError::MalformedAck(_))
        ));
        assert!(matches!(
            Frame::decode(b"\x06000"),
            Err(SecError::MalformedAck(_))
        ));
    }

    #[test]
    fn test_garbage_is_typed_error() {
        assert!(matches!(Frame::decode(&[]), Err(SecError::MalformedFrame(_))));
        assert!(matches!(
            Frame::decode(&[0xAA, 0xBB]),
            Err(SecError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_plausible_prefix() {
        assert!(Frame::is_plausible_prefix(b"\x05"));
        assert!(Frame::is_plausible_prefix(b"\x050001W00"));
        assert!(!Frame::is_plausible_prefix(b"\x0500X"));
        assert!(!Frame::is_plausible_prefix(b"\x050001R"));
        assert!(Frame::is_plausible_prefix(b"\x0600"));
        assert!(!Frame::is_plausible_prefix(b"\x06\x05"));
        assert!(!Frame::is_plausible_prefix(b"\xAA"));
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x06, 0x30, 0xFF]), "06 30 FF");
    }
}
