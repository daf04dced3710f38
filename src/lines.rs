//! DTR/RTS control line handling.
//!
//! On common ESP8266 boards DTR drives GPIO0 and RTS drives the chip enable
//! pin, so the two lines together select reset and boot mode.

use crate::error::Result;
use crate::transport::Port;

/// Desired levels of the two control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LineState {
    /// Data Terminal Ready.
    pub dtr: bool,
    /// Request To Send.
    pub rts: bool,
}

impl LineState {
    /// Creates a line state.
    #[must_use]
    pub const fn new(dtr: bool, rts: bool) -> Self {
        Self { dtr, rts }
    }
}

/// Tracks and applies the control line state of a port.
#[derive(Debug, Default)]
pub struct LineController {
    current: Option<LineState>,
}

impl LineController {
    /// Creates a controller with unknown line state.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Sets both lines with a single apply on the port.
    ///
    /// The recorded state only changes once the port accepted it.
    pub fn set_lines<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        dtr: bool,
        rts: bool,
    ) -> Result<()> {
        let desired = LineState::new(dtr, rts);
        tracing::debug!("setting lines: dtr={} rts={}", dtr, rts);
        port.apply_line_state(desired)?;
        self.current = Some(desired);
        Ok(())
    }

    /// Returns the last state applied, if any.
    #[must_use]
    pub const fn current(&self) -> Option<LineState> {
        self.current
    }
}
