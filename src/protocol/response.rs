//! Bootloader response parsing.
//!
//! Responses have the wire form (before framing):
//! ```text
//! [direction=0x01:1] [opcode:1] [len:2LE] [value:4] [data...] [status:1] [error:1]
//! ```

use bytes::{Buf, Bytes};

use crate::error::ParseError;
use crate::protocol::command::Direction;

/// Response header size (direction, opcode, length, value).
pub const RESPONSE_HEADER_SIZE: usize = 8;

/// Number of trailing status bytes sent by the ESP8266 ROM.
pub const STATUS_SIZE: usize = 2;

/// Smallest frame that parses as a response.
pub const MIN_RESPONSE_SIZE: usize = RESPONSE_HEADER_SIZE + STATUS_SIZE;

/// A parsed bootloader reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Opcode of the command this replies to.
    pub opcode: u8,
    /// Body length as declared in the header.
    pub declared_len: u16,
    /// The 4-byte value field, as sent.
    pub value: [u8; 4],
    /// Body bytes between the value field and the status bytes.
    pub data: Bytes,
    /// Status byte (0 on success).
    pub status: u8,
    /// Error code, meaningful when `status` is non-zero.
    pub error: u8,
    /// The unframed bytes this response was parsed from.
    pub raw: Bytes,
}

impl Response {
    /// Parses a response from an unframed packet.
    ///
    /// Only structure is checked; `value` and `status` are not interpreted.
    pub fn parse(frame: Bytes) -> Result<Self, ParseError> {
        if frame.len() < MIN_RESPONSE_SIZE {
            return Err(ParseError::TooShort {
                len: frame.len(),
                min: MIN_RESPONSE_SIZE,
            });
        }

        let mut cursor = frame.clone();
        let direction = cursor.get_u8();
        if direction != u8::from(Direction::Response) {
            return Err(ParseError::Direction(direction));
        }

        let opcode = cursor.get_u8();
        let declared_len = cursor.get_u16_le();
        let mut value = [0u8; 4];
        cursor.copy_to_slice(&mut value);

        let data = cursor.split_to(cursor.len() - STATUS_SIZE);
        let status = cursor.get_u8();
        let error = cursor.get_u8();

        Ok(Self {
            opcode,
            declared_len,
            value,
            data,
            status,
            error,
            raw: frame,
        })
    }

    /// Returns the value field as a little-endian word.
    #[must_use]
    pub const fn value_u32(&self) -> u32 {
        u32::from_le_bytes(self.value)
    }

    /// Returns true if the target reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read_register_reply() {
        let frame = Bytes::from_static(&[
            0x01, 0x0a, 0x02, 0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00,
        ]);
        let response = Response::parse(frame.clone()).unwrap();

        assert_eq!(response.opcode, 0x0a);
        assert_eq!(response.declared_len, 2);
        assert_eq!(response.value, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(response.value_u32(), 0x0403_0201);
        assert!(response.data.is_empty());
        assert!(response.is_success());
        assert_eq!(response.raw, frame);
    }

    #[test]
    fn test_parse_with_data_and_failure_status() {
        let frame = Bytes::from_static(&[
            0x01, 0x08, 0x04, 0x00, 0, 0, 0, 0, 0xaa, 0xbb, 0x01, 0x05,
        ]);
        let response = Response::parse(frame).unwrap();

        assert_eq!(response.opcode, 0x08);
        assert_eq!(&response.data[..], &[0xaa, 0xbb]);
        assert_eq!(response.status, 0x01);
        assert_eq!(response.error, 0x05);
        assert!(!response.is_success());
    }

    #[test]
    fn test_parse_too_short() {
        let frame = Bytes::from_static(&[0x01, 0x0a, 0x02, 0x00, 0x01]);
        assert_eq!(
            Response::parse(frame),
            Err(ParseError::TooShort {
                len: 5,
                min: MIN_RESPONSE_SIZE
            })
        );
    }

    #[test]
    fn test_parse_rejects_request_direction() {
        let frame = Bytes::from_static(&[0x00, 0x0a, 0x02, 0x00, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Response::parse(frame), Err(ParseError::Direction(0x00)));
    }
}
