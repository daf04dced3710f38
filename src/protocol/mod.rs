//! Protocol definitions for the ESP8266 serial bootloader.
//!
//! This module contains the low-level protocol types including:
//! - SLIP frame encoding/decoding
//! - Command opcodes and request serialization
//! - Response parsing

pub mod command;
pub mod frame;
pub mod response;

pub use command::{Command, CommandOpcode, Direction, SYNC_MAGIC};
pub use frame::{FrameDecoder, MAX_FRAME_SIZE, encode as encode_frame, read_frame};
pub use response::{MIN_RESPONSE_SIZE, Response};
