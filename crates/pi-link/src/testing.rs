//! Line double shared by the unit tests

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pi_protocol::checksum::{append_frame_checksum, CR};

use crate::line::Line;
use crate::port::PortConfig;

/// Answers each CR-terminated command with the next scripted frame
#[derive(Default)]
pub(crate) struct ScriptedLine {
    script: VecDeque<Vec<u8>>,
    pending: VecDeque<u8>,
    partial: Vec<u8>,
    pub(crate) chunks: Arc<Mutex<Vec<Vec<u8>>>>,
    pub(crate) commands: Arc<Mutex<Vec<String>>>,
    pub(crate) releases: Arc<Mutex<u32>>,
}

impl ScriptedLine {
    pub(crate) fn new(script: Vec<Vec<u8>>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    /// Checksummed replies for `payloads`, in order
    pub(crate) fn replying(payloads: &[&str]) -> Self {
        Self::new(payloads.iter().map(|p| frame(p)).collect())
    }
}

impl Line for ScriptedLine {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.chunks.lock().unwrap().push(bytes.to_vec());
        self.partial.extend_from_slice(bytes);
        if bytes.last() == Some(&CR) {
            // command text without CRC and CR
            let body = self.partial.len().saturating_sub(3);
            let command = String::from_utf8_lossy(&self.partial[..body]).into_owned();
            self.commands.lock().unwrap().push(command);
            self.partial.clear();
            if let Some(reply) = self.script.pop_front() {
                self.pending.extend(reply);
            }
        }
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        if self.pending.is_empty() {
            thread::sleep(wait);
            return Ok(0);
        }
        let mut n = 0;
        while n < buf.len() {
            let Some(byte) = self.pending.pop_front() else {
                break;
            };
            buf[n] = byte;
            n += 1;
            if byte == CR {
                break;
            }
        }
        Ok(n)
    }

    fn bytes_pending(&mut self) -> io::Result<usize> {
        Ok(self.pending.len())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        *self.releases.lock().unwrap() += 1;
        Ok(())
    }
}

pub(crate) fn fast() -> PortConfig {
    PortConfig {
        chunk_delay: Duration::ZERO,
        read_slice: Duration::from_millis(5),
        read_timeout: Duration::from_millis(300),
        ..PortConfig::default()
    }
}

pub(crate) fn frame(payload: &str) -> Vec<u8> {
    let mut frame = append_frame_checksum(payload.as_bytes());
    frame.push(CR);
    frame
}

/// A frame whose first CRC byte matches neither accepted encoding
pub(crate) fn corrupted(payload: &str) -> Vec<u8> {
    let mut frame = frame(payload);
    let at = frame.len() - 3;
    frame[at] ^= 0x55;
    if matches!(frame[at], b'(' | b'\r' | b'\n') {
        frame[at] ^= 0x80;
    }
    frame
}
