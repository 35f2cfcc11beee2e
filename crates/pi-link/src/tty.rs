//! Serial device access
//!
//! Opens the device at 2400 baud 8N1 in raw mode, takes an advisory
//! exclusive lock so two pollers never share one inverter, and adapts
//! `serialport`'s TTY handle to [`Line`].

use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort as _, StopBits, TTYPort};
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::line::Line;

/// Fixed line rate of every supported inverter
pub const BAUD_RATE: u32 = 2400;

/// Open and lock a serial device
pub fn open_device(path: &str) -> Result<TTYPort> {
    let unavailable = |e: serialport::Error| LinkError::DeviceUnavailable {
        path: path.to_string(),
        reason: e.to_string(),
    };

    let mut port = serialport::new(path, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native()
        .map_err(unavailable)?;

    // TIOCEXCL would make a second open fail with EBUSY before the lock
    // could report who holds the device
    port.set_exclusive(false).map_err(unavailable)?;

    match flock(port.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => {}
        Err(e) if e == Errno::EWOULDBLOCK => return Err(LinkError::DeviceLocked(path.to_string())),
        Err(e) => return Err(io::Error::from(e).into()),
    }

    port.clear(ClearBuffer::Output).map_err(io::Error::from)?;
    debug!("Opened {} at {} baud", path, BAUD_RATE);
    Ok(port)
}

impl Line for TTYPort {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        io::Write::write(self, bytes)
    }

    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        self.set_timeout(wait.max(Duration::from_millis(1)))
            .map_err(io::Error::from)?;
        match io::Read::read(self, buf) {
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            other => other,
        }
    }

    fn bytes_pending(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read().map_err(io::Error::from)? as usize)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn release(&mut self) -> io::Result<()> {
        flock(self.as_raw_fd(), FlockArg::Unlock).map_err(io::Error::from)
    }
}
