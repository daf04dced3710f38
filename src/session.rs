//! Bootloader session: connect, sync, and command exchange.
//!
//! A [`Session`] owns the port exclusively. Each exchange runs two
//! activities against it at once: a transmitter that resends the encoded
//! command on a fixed interval, and a receiver that reads frames until one
//! carries the command's opcode. Only the receiver completes the exchange;
//! the transmitter watches a one-shot signal and stops when it fires.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};
use crate::lines::{LineController, LineState};
use crate::mac::{self, MAC_REGISTERS, MacAddress};
use crate::protocol::{Command, FrameDecoder, Response, encode_frame, read_frame};
use crate::transport::serial::{self, SerialConfig, SerialPort};
use crate::transport::Port;

/// Default interval between retransmissions of an outstanding command.
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Default deadline for a single frame read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Default settle time between reset line changes.
pub const DEFAULT_RESET_SETTLE: Duration = Duration::from_millis(100);

/// Timing configuration for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Interval between retransmissions.
    pub retransmit_interval: Duration,
    /// Deadline for each frame read attempt.
    pub read_timeout: Duration,
    /// Wait after each step of the reset sequence.
    pub reset_settle: Duration,
    /// Overall limit for one exchange; `None` retries until a reply matches.
    pub exchange_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reset_settle: DEFAULT_RESET_SETTLE,
            exchange_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Sets the retransmit interval.
    #[must_use]
    pub const fn retransmit_interval(mut self, interval: Duration) -> Self {
        self.retransmit_interval = interval;
        self
    }

    /// Sets the per-read deadline.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the reset settle time.
    #[must_use]
    pub const fn reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    /// Bounds every exchange (sync, exec, register reads) by `timeout`.
    #[must_use]
    pub const fn exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = Some(timeout);
        self
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No port attached.
    Disconnected,
    /// Port open, bootloader not yet confirmed.
    Connected,
    /// Bootloader answered the sync command.
    Synced,
}

/// A session with an ESP8266 ROM bootloader.
///
/// Only one command may be in flight at a time; `&mut self` on every
/// exchange enforces this.
pub struct Session<P> {
    port: Option<P>,
    decoder: FrameDecoder,
    lines: LineController,
    state: SessionState,
    config: SessionConfig,
}

impl Session<SerialPort> {
    /// Opens a serial port and returns a connected session.
    pub fn serial(serial: &SerialConfig, config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.connect(serial)?;
        Ok(session)
    }

    /// Opens the serial port described by `serial`.
    ///
    /// Any previously attached port is closed first.
    pub fn connect(&mut self, serial: &SerialConfig) -> Result<()> {
        let port = serial::open(serial)?;
        self.attach(port);
        tracing::info!(
            "connection established with {}, baud rate is {}",
            serial.port,
            serial.baud_rate
        );
        Ok(())
    }
}

impl<P: Port> Session<P> {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            port: None,
            decoder: FrameDecoder::new(),
            lines: LineController::new(),
            state: SessionState::Disconnected,
            config,
        }
    }

    /// Attaches an already open port and moves to [`SessionState::Connected`].
    pub fn attach(&mut self, port: P) {
        self.port = Some(port);
        self.decoder.clear();
        self.lines = LineController::new();
        self.state = SessionState::Connected;
    }

    /// Closes the port.
    pub fn disconnect(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("disconnecting from serial port");
        }
        self.decoder.clear();
        self.state = SessionState::Disconnected;
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the last control line state applied to the port.
    #[must_use]
    pub const fn line_state(&self) -> Option<LineState> {
        self.lines.current()
    }

    /// Resets the target into its bootloader and synchronizes with it.
    ///
    /// On success the session is [`SessionState::Synced`].
    pub async fn sync(&mut self) -> Result<Response> {
        let limit = self.config.exchange_timeout;
        bounded(limit, self.reset_and_sync()).await
    }

    /// Sends `command` until a reply with the same opcode arrives.
    ///
    /// Timeouts, malformed frames and replies to other commands are logged
    /// and ignored. Without an `exchange_timeout` this waits indefinitely.
    pub async fn exec(&mut self, command: &Command) -> Result<Response> {
        let limit = self.config.exchange_timeout;
        bounded(limit, self.exchange(command)).await
    }

    /// Reads the 32-bit register at `address`, returning its value bytes as
    /// sent by the target.
    pub async fn read_register(&mut self, address: u32) -> Result<[u8; 4]> {
        let response = self.exec(&Command::read_register(address)).await?;
        tracing::debug!(
            "register 0x{:08x} = {}",
            address,
            hex::encode(response.value)
        );
        Ok(response.value)
    }

    /// Reads the OTP registers and assembles the factory MAC address.
    ///
    /// The three reads share one opcode, so a late reply to a retransmitted
    /// read can be taken as the answer to the next register.
    pub async fn read_mac(&mut self) -> Result<MacAddress> {
        let mut values = Vec::with_capacity(MAC_REGISTERS.len());
        for register in MAC_REGISTERS {
            values.push((register, self.read_register(register).await?));
        }
        // Every register in the layout was read above
        Ok(mac::assemble(&values).expect("all MAC registers read"))
    }

    async fn reset_and_sync(&mut self) -> Result<Response> {
        self.enter_bootloader().await?;

        let response = self.exchange(&Command::sync()).await?;
        self.state = SessionState::Synced;
        tracing::info!("sync ok");
        Ok(response)
    }

    /// Pulses the control lines so the target restarts into its ROM loader.
    async fn enter_bootloader(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        let settle = self.config.reset_settle;

        self.lines.set_lines(port, false, true)?;
        tokio::time::sleep(settle).await;
        self.lines.set_lines(port, true, false)?;
        tokio::time::sleep(settle).await;

        // Drops only bytes already read from the port; anything still queued
        // in the OS buffer is filtered later by framing and opcode
        self.decoder.clear();
        Ok(())
    }

    async fn exchange(&mut self, command: &Command) -> Result<Response> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        let expected = u8::from(command.opcode());
        let frame = encode_frame(&command.to_bytes());

        tracing::debug!("exec {:?} ({} byte frame)", command.opcode(), frame.len());

        let (mut reader, mut writer) = tokio::io::split(port);
        let (done_tx, done_rx) = oneshot::channel();

        let (sent, response) = tokio::try_join!(
            transmit(&mut writer, &frame, self.config.retransmit_interval, done_rx),
            receive(
                &mut reader,
                &mut self.decoder,
                expected,
                self.config.read_timeout,
                done_tx
            ),
        )?;

        tracing::debug!("{:?} answered after {} transmissions", command.opcode(), sent);
        if !response.is_success() {
            tracing::warn!(
                "{:?} returned status 0x{:02x} error 0x{:02x}",
                command.opcode(),
                response.status,
                response.error
            );
        }
        Ok(response)
    }
}

/// Resends `frame` every `interval` until `done` fires or is dropped.
///
/// Returns the number of transmissions.
async fn transmit<W>(
    writer: &mut W,
    frame: &[u8],
    interval: Duration,
    mut done: oneshot::Receiver<()>,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = &mut done => return Ok(sent),
            _ = ticker.tick() => {
                writer.write_all(frame).await?;
                writer.flush().await?;
                sent += 1;
                tracing::trace!("sent frame #{}: {} bytes", sent, frame.len());
            }
        }
    }
}

/// Reads until a response with opcode `expected` arrives, then fires `done`.
async fn receive<R>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    expected: u8,
    read_timeout: Duration,
    done: oneshot::Sender<()>,
) -> Result<Response>
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_response(reader, decoder, expected, read_timeout).await {
            Ok(response) => {
                // The transmitter may already be gone after a write failure
                let _ = done.send(());
                return Ok(response);
            }
            Err(e) if e.is_recoverable() => tracing::debug!("discarding: {}", e),
            Err(e) => return Err(e),
        }
    }
}

async fn read_response<R>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    expected: u8,
    read_timeout: Duration,
) -> Result<Response>
where
    R: AsyncRead + Unpin,
{
    let frame = read_frame(reader, decoder, read_timeout).await?;
    let response = Response::parse(frame)?;
    if response.opcode != expected {
        return Err(Error::ProtocolMismatch {
            expected,
            got: response.opcode,
        });
    }
    Ok(response)
}

/// Runs `fut`, failing with [`Error::ExchangeTimeout`] once `limit` passes.
async fn bounded<T>(limit: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::ExchangeTimeout {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })?,
    }
}
