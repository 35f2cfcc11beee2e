//! Byte-level device seam
//!
//! [`Line`] is the minimal set of blocking operations the transport needs
//! from a device. The TTY implementation lives in [`crate::tty`]; tests and
//! the simulator provide their own.

use std::io;
use std::time::Duration;

/// A half-duplex byte channel to an inverter
pub trait Line: Send {
    /// Write one chunk, returning how many bytes were accepted
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Read whatever is available, waiting at most `wait` for the first byte
    ///
    /// Returns `Ok(0)` if nothing arrived in time.
    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize>;

    /// Number of received bytes not yet read
    fn bytes_pending(&mut self) -> io::Result<usize>;

    /// Drop any received bytes not yet read
    fn discard_input(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 64];
        while self.bytes_pending()? > 0 {
            if self.read(&mut buf, Duration::ZERO)? == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Release OS resources held beyond the handle itself (locks)
    fn release(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<L: Line + ?Sized> Line for Box<L> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        (**self).write(bytes)
    }

    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        (**self).read(buf, wait)
    }

    fn bytes_pending(&mut self) -> io::Result<usize> {
        (**self).bytes_pending()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }

    fn release(&mut self) -> io::Result<()> {
        (**self).release()
    }
}
