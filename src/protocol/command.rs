//! Bootloader commands for the ESP8266 serial protocol.
//!
//! A command is an opcode-tagged request. Its wire form (before framing) is:
//! ```text
//! [direction=0x00:1] [opcode:1] [len:2LE] [checksum:4LE] [payload:len]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Request header size (direction, opcode, length, checksum).
pub const REQUEST_HEADER_SIZE: usize = 8;

/// Maximum payload size representable in the 16-bit length field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Synchronization payload: `07 07 12 20` followed by 32 bytes of `0x55`.
pub const SYNC_MAGIC: [u8; 36] = {
    let mut magic = [0x55; 36];
    magic[0] = 0x07;
    magic[1] = 0x07;
    magic[2] = 0x12;
    magic[3] = 0x20;
    magic
};

/// Packet direction marker (first byte of every packet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Host to target.
    Request = 0x00,
    /// Target to host.
    Response = 0x01,
}

impl From<Direction> for u8 {
    fn from(dir: Direction) -> Self {
        dir as Self
    }
}

/// Command opcodes understood by the ESP8266 ROM loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandOpcode {
    /// Begin a flash download.
    FlashBegin = 0x02,
    /// Flash data block.
    FlashData = 0x03,
    /// Finish a flash download.
    FlashEnd = 0x04,
    /// Begin a RAM download.
    MemBegin = 0x05,
    /// Finish a RAM download and optionally jump.
    MemEnd = 0x06,
    /// RAM data block.
    MemData = 0x07,
    /// Synchronize with the bootloader.
    Sync = 0x08,
    /// Write a 32-bit register.
    WriteReg = 0x09,
    /// Read a 32-bit register.
    ReadReg = 0x0a,
}

impl From<CommandOpcode> for u8 {
    fn from(cmd: CommandOpcode) -> Self {
        cmd as Self
    }
}

/// An immutable bootloader request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: CommandOpcode,
    checksum: u32,
    payload: Bytes,
}

impl Command {
    /// Creates a command with an arbitrary payload and a zero checksum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the payload does not fit the
    /// 16-bit length field.
    pub fn new(opcode: CommandOpcode, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            opcode,
            checksum: 0,
            payload,
        })
    }

    /// Sets the checksum field (used by data-carrying commands).
    #[must_use]
    pub const fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = checksum;
        self
    }

    /// The synchronization command.
    #[must_use]
    pub fn sync() -> Self {
        Self {
            opcode: CommandOpcode::Sync,
            checksum: 0,
            payload: Bytes::from_static(&SYNC_MAGIC),
        }
    }

    /// Reads the 32-bit register at `address`.
    #[must_use]
    pub fn read_register(address: u32) -> Self {
        Self {
            opcode: CommandOpcode::ReadReg,
            checksum: 0,
            payload: Bytes::copy_from_slice(&address.to_le_bytes()),
        }
    }

    /// Writes `value` to the register at `address` under `mask`, then waits
    /// `delay_us` microseconds on the target.
    #[must_use]
    pub fn write_register(address: u32, value: u32, mask: u32, delay_us: u32) -> Self {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u32_le(address);
        buf.put_u32_le(value);
        buf.put_u32_le(mask);
        buf.put_u32_le(delay_us);
        Self {
            opcode: CommandOpcode::WriteReg,
            checksum: 0,
            payload: buf.freeze(),
        }
    }

    /// Returns the opcode.
    #[must_use]
    pub const fn opcode(&self) -> CommandOpcode {
        self.opcode
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serializes the command into its unframed wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE + self.payload.len());
        buf.put_u8(Direction::Request.into());
        buf.put_u8(self.opcode.into());
        // Length checked at construction
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_u32_le(self.checksum);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
