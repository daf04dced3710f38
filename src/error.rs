//! Error types for the esp8266tool library.

use thiserror::Error;

/// The main error type for bootloader operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Response could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// No complete frame arrived before the read deadline.
    #[error("read timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Response opcode does not match the outstanding command.
    #[error("opcode mismatch: expected 0x{expected:02x}, got 0x{got:02x}")]
    ProtocolMismatch { expected: u8, got: u8 },

    /// The whole exchange exceeded its configured deadline.
    #[error("exchange gave up after {timeout_ms}ms")]
    ExchangeTimeout { timeout_ms: u64 },

    /// Command payload does not fit the 16-bit length field.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,
}

impl Error {
    /// Returns true for protocol-level noise that the exchange loop absorbs.
    ///
    /// Transport failures and configuration errors are never recoverable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Frame(_) | Self::Parse(_) | Self::Timeout { .. } | Self::ProtocolMismatch { .. }
        )
    }

    pub(crate) fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Frame-specific errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Escape byte followed by something other than an escape code.
    #[error("malformed escape sequence: 0xdb 0x{0:02x}")]
    MalformedEscape(u8),

    /// Frame body exceeds the decoder's limit.
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },
}

/// Response parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Frame too short to hold the response header and status.
    #[error("response too short: need at least {min} bytes, got {len}")]
    TooShort { len: usize, min: usize },

    /// Direction marker is not the response marker.
    #[error("unexpected direction marker 0x{0:02x}")]
    Direction(u8),
}

/// Result type alias for esp8266tool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Frame(FrameError::MalformedEscape(0x00)).is_recoverable());
        assert!(Error::Parse(ParseError::Direction(0x00)).is_recoverable());
        assert!(Error::Timeout { timeout_ms: 3000 }.is_recoverable());
        assert!(
            Error::ProtocolMismatch {
                expected: 0x08,
                got: 0x0a
            }
            .is_recoverable()
        );

        assert!(!Error::NotConnected.is_recoverable());
        assert!(!Error::ExchangeTimeout { timeout_ms: 1 }.is_recoverable());
        assert!(
            !Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "gone"
            ))
            .is_recoverable()
        );
    }

    #[test]
    fn test_mismatch_message() {
        let err = Error::ProtocolMismatch {
            expected: 0x08,
            got: 0x0a,
        };
        assert_eq!(err.to_string(), "opcode mismatch: expected 0x08, got 0x0a");
    }
}
