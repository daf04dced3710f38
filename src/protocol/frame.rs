//! SLIP frame encoding and decoding for the ESP8266 bootloader link.
//!
//! Every packet on the wire is wrapped in delimiter bytes, with literal
//! delimiter and escape bytes inside the body replaced by two-byte sequences:
//! ```text
//! ┌──────┬──────────────────────────────┬──────┐
//! │ 0xc0 │  body (0xc0 → 0xdb 0xdc,     │ 0xc0 │
//! │      │        0xdb → 0xdb 0xdd)     │      │
//! └──────┴──────────────────────────────┴──────┘
//! ```

use std::io;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, FrameError, Result};

/// Frame delimiter byte.
pub const END: u8 = 0xc0;

/// Escape introducer byte.
pub const ESC: u8 = 0xdb;

/// Escaped form of [`END`] (follows [`ESC`]).
pub const ESC_END: u8 = 0xdc;

/// Escaped form of [`ESC`] (follows [`ESC`]).
pub const ESC_ESC: u8 = 0xdd;

/// Maximum decoded frame body size.
pub const MAX_FRAME_SIZE: usize = 0x4000;

/// Encodes a payload into a delimited, escaped frame.
#[must_use]
pub fn encode(payload: &[u8]) -> Bytes {
    let escapes = payload.iter().filter(|&&b| b == END || b == ESC).count();
    let mut buf = BytesMut::with_capacity(payload.len() + escapes + 2);

    buf.put_u8(END);
    for &byte in payload {
        match byte {
            END => buf.put_slice(&[ESC, ESC_END]),
            ESC => buf.put_slice(&[ESC, ESC_ESC]),
            _ => buf.put_u8(byte),
        }
    }
    buf.put_u8(END);
    buf.freeze()
}

/// Frame decoder that handles partial data.
///
/// Bytes that arrive before an opening delimiter are discarded. A frame with
/// an empty body is returned like any other, and its closing delimiter also
/// opens the next frame, so a decoder that lost track of frame boundaries
/// realigns on the next pair of back-to-back delimiters.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    frame: BytesMut,
    in_frame: bool,
    escaped: bool,
    discarding: bool,
}

impl FrameDecoder {
    /// Creates a new frame decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    ///
    /// Returns `Ok(Some(body))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or an error if the frame in
    /// progress was malformed. A malformed frame is dropped and decoding
    /// can continue with the next call.
    pub fn decode(&mut self) -> std::result::Result<Option<Bytes>, FrameError> {
        while self.buffer.has_remaining() {
            let byte = self.buffer.get_u8();

            if self.discarding {
                // Rest of a dropped frame, up to its closing delimiter
                if byte == END {
                    self.discarding = false;
                }
                continue;
            }

            if !self.in_frame {
                // Noise before a frame starts
                if byte == END {
                    self.in_frame = true;
                }
                continue;
            }

            if self.escaped {
                self.escaped = false;
                match byte {
                    ESC_END => self.frame.put_u8(END),
                    ESC_ESC => self.frame.put_u8(ESC),
                    other => {
                        self.drop_frame();
                        // An escaped delimiter still closes the frame
                        self.discarding = other != END;
                        return Err(FrameError::MalformedEscape(other));
                    }
                }
            } else {
                match byte {
                    END => {
                        let body = self.frame.split().freeze();
                        // Back-to-back delimiters: the second one opens a frame
                        self.in_frame = body.is_empty();
                        return Ok(Some(body));
                    }
                    ESC => self.escaped = true,
                    _ => self.frame.put_u8(byte),
                }
            }

            if self.frame.len() > MAX_FRAME_SIZE {
                let size = self.frame.len();
                self.drop_frame();
                self.discarding = true;
                return Err(FrameError::TooLarge {
                    size,
                    max: MAX_FRAME_SIZE,
                });
            }
        }

        Ok(None)
    }

    fn drop_frame(&mut self) {
        self.frame.clear();
        self.in_frame = false;
        self.escaped = false;
    }

    /// Returns the number of raw bytes not yet examined.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer and any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.drop_frame();
        self.discarding = false;
    }
}

/// Reads from `reader` until the decoder yields a frame or `timeout` elapses.
///
/// Bytes left over after the returned frame stay in the decoder for the next
/// call.
///
/// # Errors
///
/// - [`Error::Timeout`] if no complete frame arrives in time.
/// - [`Error::Frame`] if a malformed frame was dropped.
/// - [`Error::Io`] if the reader fails or reaches end of stream.
pub async fn read_frame<R>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    timeout: Duration,
) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = [0u8; 256];

    loop {
        if let Some(frame) = decoder.decode()? {
            tracing::trace!("decoded frame: {} bytes", frame.len());
            return Ok(frame);
        }

        let n = match tokio::time::timeout_at(deadline, reader.read(&mut buf)).await {
            Err(_) => return Err(Error::timeout(timeout)),
            Ok(Ok(0)) => {
                tracing::debug!("serial port closed");
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial port closed",
                )));
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::error!("serial read error: {}", e);
                return Err(Error::Io(e));
            }
        };

        tracing::trace!("received {} bytes", n);
        decoder.feed(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple() {
        let frame = encode(b"hello");

        assert_eq!(frame[0], END);
        assert_eq!(&frame[1..6], b"hello");
        assert_eq!(frame[6], END);
    }

    #[test]
    fn test_encode_escapes_reserved_bytes() {
        let frame = encode(&[0x01, END, 0x02, ESC, 0x03]);
        assert_eq!(
            &frame[..],
            &[END, 0x01, ESC, ESC_END, 0x02, ESC, ESC_ESC, 0x03, END]
        );

        // Body never carries a bare delimiter
        assert!(!frame[1..frame.len() - 1].contains(&END));
    }

    #[test]
    fn test_encode_body_has_no_bare_escape() {
        let payload: Vec<u8> = (0..=255).collect();
        let frame = encode(&payload);
        let body = &frame[1..frame.len() - 1];

        assert!(!body.contains(&END));
        let mut i = 0;
        while i < body.len() {
            if body[i] == ESC {
                assert!(matches!(body.get(i + 1), Some(&ESC_END | &ESC_ESC)));
                i += 2;
            } else {
                i += 1;
            }
        }
    }

    #[test]
    fn test_round_trip_all_bytes() {
        let payload: Vec<u8> = (0..=255).rev().chain(0..=255).collect();
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode(&payload));

        let result = decoder.decode().unwrap();
        assert_eq!(result.as_deref(), Some(&payload[..]));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_round_trip_reserved_only() {
        let payload = [END, END, ESC, ESC, END];
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode(&payload));

        assert_eq!(decoder.decode().unwrap().as_deref(), Some(&payload[..]));
    }

    #[test]
    fn test_decode_partial_frame() {
        let mut decoder = FrameDecoder::new();

        decoder.feed(&[END, b'h', b'e', ESC]);
        assert_eq!(decoder.decode().unwrap(), None);

        decoder.feed(&[ESC_ESC, b'l', b'o', END]);
        let result = decoder.decode().unwrap();
        assert_eq!(result, Some(Bytes::from_static(&[b'h', b'e', ESC, b'l', b'o'])));
    }

    #[test]
    fn test_decode_discards_leading_garbage() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"ets Jan  8 2013,rst cause:2\r\n");
        decoder.feed(&[END, b'o', b'k', END]);

        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"ok")));
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode(&[]));

        assert_eq!(decoder.decode().unwrap().as_deref(), Some(&[][..]));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_decode_yields_empty_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[END, END, END, b'x', END]);

        assert_eq!(decoder.decode().unwrap(), Some(Bytes::new()));
        assert_eq!(decoder.decode().unwrap(), Some(Bytes::new()));
        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"x")));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[END, b'h', b'i', END, END, b'b', b'y', b'e', END]);

        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"hi")));
        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"bye")));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_decode_malformed_escape_drops_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[END, b'a', ESC, 0x42, b'b', END, END, b'o', b'k', END]);

        assert_eq!(
            decoder.decode().unwrap_err(),
            FrameError::MalformedEscape(0x42)
        );
        // The closing delimiter of the bad frame resynchronizes the decoder
        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"ok")));
    }

    #[test]
    fn test_decode_too_large() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[END]);
        decoder.feed(&vec![0x11; MAX_FRAME_SIZE + 1]);

        assert!(matches!(
            decoder.decode(),
            Err(FrameError::TooLarge { .. })
        ));

        // The rest of the oversized frame is skipped up to its delimiter
        decoder.feed(&[0x11, 0x11, END, END, b'o', b'k', END]);
        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"ok")));
    }

    #[test]
    fn test_decode_realigns_after_stray_delimiter() {
        let mut decoder = FrameDecoder::new();
        // A stray delimiter in the noise puts the decoder out of step
        decoder.feed(b"boot");
        decoder.feed(&[END, b'n', b'o', b'i', b's', b'e']);
        decoder.feed(&[END, b'a', END, END, b'b', END, END, b'c', END]);

        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"noise")));
        assert_eq!(decoder.decode().unwrap(), Some(Bytes::new()));
        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"b")));
        assert_eq!(decoder.decode().unwrap(), Some(Bytes::from_static(b"c")));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let (mut reader, mut writer) = tokio::io::duplex(64);
        let mut decoder = FrameDecoder::new();

        tokio::io::AsyncWriteExt::write_all(&mut writer, &[0xaa, 0x55, END, 0x01, END])
            .await
            .unwrap();

        let frame = read_frame(&mut reader, &mut decoder, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame, Bytes::from_static(&[0x01]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_frame_timeout() {
        let (mut reader, _writer) = tokio::io::duplex(64);
        let mut decoder = FrameDecoder::new();

        let err = read_frame(&mut reader, &mut decoder, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 3000 }));
    }

    #[tokio::test]
    async fn test_read_frame_closed_stream() {
        let (mut reader, writer) = tokio::io::duplex(64);
        drop(writer);
        let mut decoder = FrameDecoder::new();

        let err = read_frame(&mut reader, &mut decoder, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_recoverable());
    }
}
