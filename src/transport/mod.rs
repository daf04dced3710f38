//! Transport layer for bootloader communication.
//!
//! The session only needs a byte stream it can split into concurrent read
//! and write halves, plus a way to drive the DTR/RTS control lines.

pub mod serial;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::lines::LineState;

/// Trait for ports a [`Session`](crate::Session) can drive.
pub trait Port: AsyncRead + AsyncWrite + Unpin + Send {
    /// Applies both control lines in one call.
    fn apply_line_state(&mut self, state: LineState) -> Result<()>;
}

pub use serial::{SerialConfig, SerialPort};
