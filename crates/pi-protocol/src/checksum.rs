//! Frame checksums
//!
//! # Format
//!
//! A checksummed frame is `<payload><checksum><CR>`. Current protocol
//! generations use CRC-16/XMODEM (polynomial 0x1021, initial value 0)
//! appended big-endian. Some legacy PI30 firmware uses a single additive
//! byte instead.
//!
//! The device never emits a CRC byte that collides with a frame delimiter:
//! a checksum byte equal to `(`, CR or LF is sent incremented by one.
//! Verification accepts both the substituted and the plain encoding.

use crc::{Crc, CRC_16_XMODEM};

/// Frame terminator
pub const CR: u8 = b'\r';

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Checksum algorithm protecting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChecksumKind {
    /// Two-byte CRC-16/XMODEM
    #[default]
    XModem,
    /// One-byte sum of the payload plus one
    Additive,
}

impl ChecksumKind {
    /// Number of checksum bytes this kind appends
    pub fn len(self) -> usize {
        match self {
            ChecksumKind::XModem => 2,
            ChecksumKind::Additive => 1,
        }
    }

    /// Checksum bytes for `payload` as they appear on the wire
    pub fn compute(self, payload: &[u8]) -> Vec<u8> {
        match self {
            ChecksumKind::XModem => frame_checksum(payload).to_vec(),
            ChecksumKind::Additive => vec![additive(payload)],
        }
    }

    /// Append the checksum to `payload` (no terminator)
    pub fn append(self, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(payload.len() + self.len() + 1);
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&self.compute(payload));
        frame
    }

    /// Verify a complete frame, terminator included
    pub fn verify(self, frame: &[u8]) -> bool {
        match self {
            ChecksumKind::XModem => verify_frame_checksum(frame),
            ChecksumKind::Additive => {
                if frame.len() < 2 {
                    return false;
                }
                let split = frame.len() - 2;
                additive(&frame[..split]) == frame[split]
            }
        }
    }

    /// Payload of a complete frame, with checksum and terminator removed
    ///
    /// Returns `None` if the frame is too short to carry a checksum.
    pub fn payload(self, frame: &[u8]) -> Option<&[u8]> {
        let trailer = self.len() + 1;
        (frame.len() >= trailer).then(|| &frame[..frame.len() - trailer])
    }
}

/// Plain CRC-16/XMODEM
pub fn xmodem(bytes: &[u8]) -> u16 {
    XMODEM.checksum(bytes)
}

fn substitute(byte: u8) -> u8 {
    match byte {
        b'(' | b'\r' | b'\n' => byte + 1,
        _ => byte,
    }
}

/// CRC bytes for `payload` in wire order, delimiter bytes substituted
pub fn frame_checksum(payload: &[u8]) -> [u8; 2] {
    let [hi, lo] = xmodem(payload).to_be_bytes();
    [substitute(hi), substitute(lo)]
}

/// `payload` followed by its CRC bytes
pub fn append_frame_checksum(payload: &[u8]) -> Vec<u8> {
    ChecksumKind::XModem.append(payload)
}

/// Check the CRC of a complete frame
///
/// The checksum covers `frame[..len - 3]` and sits at `frame[len - 3]`,
/// `frame[len - 2]`; the last byte is the terminator and is not covered.
pub fn verify_frame_checksum(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let split = frame.len() - 3;
    let payload = &frame[..split];
    let received = [frame[split], frame[split + 1]];
    received == frame_checksum(payload) || received == xmodem(payload).to_be_bytes()
}

/// Legacy 8-bit checksum: sum of all bytes plus one, modulo 256
pub fn additive(bytes: &[u8]) -> u8 {
    bytes.iter().fold(1u8, |acc, b| acc.wrapping_add(*b))
}
