use thiserror::Error;

/// Main error type for SEC-3000H link operations
#[derive(Error, Debug)]
pub enum SecError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Bytes at the scan position match neither frame shape
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Malformed command frame: {0}")]
    MalformedCommand(String),

    #[error("Malformed ack frame: {0}")]
    MalformedAck(String),

    #[error("Checksum mismatch: computed {expected}, frame carries {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Link not ready: {0}")]
    LinkNotReady(String),

    #[error("Timeout")]
    Timeout,

    #[error("No acknowledgement for data number 0x{data_number:04X} (attempt {attempt})")]
    AckTimeout { data_number: u16, attempt: u32 },

    #[error(
        "Retries exhausted for data number 0x{data_number:04X} value 0x{value:04X} after {attempts} attempts"
    )]
    RetryExhausted {
        data_number: u16,
        value: u16,
        attempts: u32,
    },

    #[error("Maximum reconnect attempts ({attempts}) exceeded")]
    ReconnectExhausted { attempts: u32 },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session closed")]
    SessionClosed,
}

impl SecError {
    /// Errors raised while decoding bytes at a scan position.
    ///
    /// These never abort the link: the scanner drops one byte and continues.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            SecError::MalformedFrame(_)
                | SecError::MalformedCommand(_)
                | SecError::MalformedAck(_)
                | SecError::ChecksumMismatch { .. }
        )
    }

    /// Errors that are handled and retried locally instead of being surfaced.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SecError::RetryExhausted { .. }
            | SecError::ReconnectExhausted { .. }
            | SecError::SessionClosed => false,
            SecError::InvalidData(_) | SecError::InvalidState(_) => false,
            _ => true,
        }
    }
}

/// Result type alias for SEC-3000H operations
pub type SecResult<T> = Result<T, SecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_errors_are_recoverable() {
        let err = SecError::ChecksumMismatch {
            expected: "9C".to_string(),
            actual: "00".to_string(),
        };
        assert!(err.is_frame_error());
        assert!(err.is_recoverable());
        assert!(SecError::MalformedFrame("noise".into()).is_frame_error());
    }

    #[test]
    fn test_surfaced_errors() {
        let err = SecError::RetryExhausted {
            data_number: 0x0010,
            value: 3,
            attempts: 9,
        };
        assert!(!err.is_recoverable());
        assert!(!err.is_frame_error());
        assert_eq!(
            err.to_string(),
            "Retries exhausted for data number 0x0010 value 0x0003 after 9 attempts"
        );
        assert!(!SecError::ReconnectExhausted { attempts: 10 }.is_recoverable());
        assert!(SecError::Timeout.is_recoverable());
    }
}
