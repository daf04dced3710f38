//! # esp8266tool
//!
//! A Rust client for the ESP8266 ROM serial bootloader.
//!
//! This library resets a target into its bootloader over the USB-UART
//! control lines, synchronizes with it, and exchanges SLIP-framed commands,
//! retransmitting over the lossy link until a matching reply arrives.
//!
//! ## Quick Start
//!
//! ```no_run
//! use esp8266tool::{SerialConfig, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), esp8266tool::Error> {
//!     let serial = SerialConfig::new("/dev/ttyUSB0");
//!     let mut session = Session::serial(&serial, SessionConfig::default())?;
//!
//!     session.sync().await?;
//!     let mac = session.read_mac().await?;
//!     println!("MAC address is: {mac}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - SLIP framing, command serialization, response parsing
//! - [`transport`] - The [`Port`] capability and its serial implementation
//! - [`lines`] - DTR/RTS control for the reset sequence
//! - [`session`] - Connect, sync and the retrying command exchange
//! - [`mac`] - OTP register layout of the factory MAC address

pub mod error;
pub mod lines;
pub mod mac;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use error::{Error, FrameError, ParseError, Result};
pub use lines::{LineController, LineState};
pub use mac::MacAddress;
pub use protocol::{Command, CommandOpcode, Response};
pub use session::{Session, SessionConfig, SessionState};
pub use transport::{Port, SerialConfig, SerialPort, serial::list_ports};
