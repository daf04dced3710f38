//! Factory MAC address assembly from OTP registers.
//!
//! The ESP8266 keeps its station MAC split across three one-time-programmable
//! registers. [`MAC_LAYOUT`] says which byte of which register lands in each
//! MAC position.

use std::fmt;

/// OTP word holding the lowest MAC byte.
pub const MAC0_REG: u32 = 0x3ff0_0050;

/// OTP word holding the middle MAC bytes.
pub const MAC1_REG: u32 = 0x3ff0_0054;

/// OTP word holding the vendor (OUI) bytes.
pub const MAC3_REG: u32 = 0x3ff0_005c;

/// Registers read to assemble a MAC, in the order [`assemble`] expects.
pub const MAC_REGISTERS: [u32; 3] = [MAC0_REG, MAC1_REG, MAC3_REG];

/// Where one MAC byte comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacField {
    /// Register address the byte is read from.
    pub register: u32,
    /// Byte offset within the register value as sent on the wire.
    pub byte_offset: usize,
    /// Position in the MAC address (0 is the first, most significant, byte).
    pub position: usize,
}

impl MacField {
    const fn new(register: u32, byte_offset: usize, position: usize) -> Self {
        Self {
            register,
            byte_offset,
            position,
        }
    }
}

/// Byte-role table for the station MAC.
pub const MAC_LAYOUT: [MacField; 6] = [
    MacField::new(MAC3_REG, 2, 0),
    MacField::new(MAC3_REG, 1, 1),
    MacField::new(MAC3_REG, 0, 2),
    MacField::new(MAC1_REG, 1, 3),
    MacField::new(MAC1_REG, 0, 4),
    MacField::new(MAC0_REG, 3, 5),
];

/// A 6-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Assembles a MAC from register values read at [`MAC_REGISTERS`].
///
/// `values` pairs each register address with its 4-byte value.
#[must_use]
pub fn assemble(values: &[(u32, [u8; 4])]) -> Option<MacAddress> {
    let mut mac = [0u8; 6];
    for field in &MAC_LAYOUT {
        let (_, value) = values.iter().find(|(reg, _)| *reg == field.register)?;
        mac[field.position] = value[field.byte_offset];
    }
    Some(MacAddress(mac))
}
