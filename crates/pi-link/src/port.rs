//! Serial transport
//!
//! [`SerialPort`] owns one [`Line`] and turns it into a request/response
//! channel: a command is framed (checksum plus CR), written in small paced
//! chunks, and answered by exactly one CR-terminated frame whose checksum is
//! verified before the payload is handed back.
//!
//! The whole send/receive/retry cycle runs under one mutex, so a polling
//! thread and an interactive thread may share a port without interleaving
//! frames.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use pi_protocol::checksum::{ChecksumKind, CR};
use tracing::{debug, trace, warn};

use crate::error::{LinkError, Result};
use crate::line::Line;

/// Extra attempts after a checksum mismatch
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// How long a reply may take to arrive
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pacing and size limits of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Largest single write; USB-serial bridges drop bytes beyond this
    pub chunk_size: usize,
    /// Pause after every chunk
    pub chunk_delay: Duration,
    /// Longest single blocking read inside `receive`
    pub read_slice: Duration,
    /// Upper bound on one reply frame
    pub max_frame: usize,
    /// Timeout used by [`SerialPort::query`]
    pub read_timeout: Duration,
    /// Checksum retries for [`SerialPort::raw_query`]
    pub max_retries: u32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8,
            chunk_delay: Duration::from_millis(50),
            read_slice: Duration::from_millis(50),
            max_frame: 1024,
            read_timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// How commands are framed and replies verified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    /// Append a checksum to the outgoing command
    pub append_checksum: bool,
    /// Checksum carried by both directions
    pub checksum: ChecksumKind,
}

impl Framing {
    pub fn new(append_checksum: bool) -> Self {
        Self {
            append_checksum,
            checksum: ChecksumKind::XModem,
        }
    }
}

/// Whether a query currently holds the port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Idle,
    Busy,
}

/// An open, exclusively locked connection to one inverter
pub struct SerialPort<L: Line> {
    path: String,
    line: Mutex<L>,
    config: PortConfig,
    released: bool,
}

#[cfg(unix)]
impl SerialPort<serialport::TTYPort> {
    /// Open, configure and lock the device at `path`
    pub fn open(path: &str) -> Result<Self> {
        let tty = crate::tty::open_device(path)?;
        Ok(Self::from_line(path, tty))
    }
}

impl<L: Line> SerialPort<L> {
    /// Wrap an already opened line
    pub fn from_line(path: impl Into<String>, line: L) -> Self {
        Self {
            path: path.into(),
            line: Mutex::new(line),
            config: PortConfig::default(),
            released: false,
        }
    }

    pub fn with_config(mut self, config: PortConfig) -> Self {
        self.config = config;
        self
    }

    /// Device path this port was opened from
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn state(&self) -> PortState {
        match self.line.try_lock() {
            Ok(_) | Err(TryLockError::Poisoned(_)) => PortState::Idle,
            Err(TryLockError::WouldBlock) => PortState::Busy,
        }
    }

    /// Frame and write one command
    pub fn send(&self, command: &str, append_checksum: bool) -> Result<()> {
        let mut line = self.lock();
        self.send_on(&mut *line, command.as_bytes(), Framing::new(append_checksum))
    }

    /// Read one verified reply frame, returning its payload
    pub fn receive(&self, timeout: Duration) -> Result<Vec<u8>> {
        let mut line = self.lock();
        self.receive_on(&mut *line, ChecksumKind::XModem, timeout)
    }

    /// Send `command` and return the verified reply payload
    ///
    /// A checksum mismatch re-runs the whole cycle up to `max_retries` more
    /// times; every other error is returned immediately.
    pub fn query(&self, command: &str, append_checksum: bool, max_retries: u32) -> Result<String> {
        self.exchange(
            command,
            Framing::new(append_checksum),
            max_retries,
            self.config.read_timeout,
        )
    }

    /// [`query`](Self::query) with explicit framing and timeout
    pub fn exchange(
        &self,
        command: &str,
        framing: Framing,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<String> {
        let mut line = self.lock();
        let mut attempt = 0;
        loop {
            let result = self
                .send_on(&mut *line, command.as_bytes(), framing)
                .and_then(|()| self.receive_on(&mut *line, framing.checksum, timeout));

            match result {
                Ok(payload) => {
                    let reply = String::from_utf8_lossy(&payload).into_owned();
                    debug!("{} -> {}", command, reply);
                    return Ok(reply);
                }
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    warn!("{}: {} (retry {}/{})", command, e, attempt, max_retries);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Diagnostic passthrough: the reply payload as received
    pub fn raw_query(&self, command: &str, append_checksum: bool) -> Result<String> {
        self.query(command, append_checksum, self.config.max_retries)
    }

    /// Release the device lock and close the handle
    pub fn close(mut self) -> Result<()> {
        self.released = true;
        let line = self.line.get_mut().unwrap_or_else(PoisonError::into_inner);
        line.release()?;
        debug!("Closed {}", self.path);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, L> {
        self.line.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_on(&self, line: &mut L, command: &[u8], framing: Framing) -> Result<()> {
        let mut frame = if framing.append_checksum {
            framing.checksum.append(command)
        } else {
            command.to_vec()
        };
        frame.push(CR);

        line.discard_input()?;
        trace!("TX {:02X?}", frame);

        for chunk in frame.chunks(self.config.chunk_size.max(1)) {
            let written = line.write(chunk)?;
            if written != chunk.len() {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", written, chunk.len()),
                )
                .into());
            }
            if !self.config.chunk_delay.is_zero() {
                thread::sleep(self.config.chunk_delay);
            }
        }
        Ok(())
    }

    fn receive_on(&self, line: &mut L, checksum: ChecksumKind, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut frame = Vec::with_capacity(128);
        let mut buf = [0u8; 128];

        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!("Timed out with {} bytes buffered: {:02X?}", frame.len(), frame);
                return Err(LinkError::Timeout(timeout));
            }

            let read = line.read(&mut buf, (deadline - now).min(self.config.read_slice))?;
            if read == 0 {
                continue;
            }
            if frame.len() + read > self.config.max_frame {
                return Err(LinkError::Protocol(format!(
                    "reply exceeds {} bytes",
                    self.config.max_frame
                )));
            }
            frame.extend_from_slice(&buf[..read]);

            if buf[read - 1] == CR {
                break;
            }
        }
        trace!("RX {:02X?}", frame);

        let pending = line.bytes_pending()?;
        if pending > 0 {
            return Err(LinkError::Protocol(format!(
                "{} bytes still available after carriage return",
                pending
            )));
        }

        let payload = checksum
            .payload(&frame)
            .ok_or_else(|| LinkError::Protocol(format!("frame too short: {:02X?}", frame)))?;
        if !checksum.verify(&frame) {
            return Err(LinkError::ChecksumMismatch {
                frame: String::from_utf8_lossy(&frame).into_owned(),
            });
        }
        Ok(payload.to_vec())
    }
}

impl<L: Line> Drop for SerialPort<L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let line = self.line.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = line.release() {
            warn!("Failed to release {}: {}", self.path, e);
        }
    }
}
