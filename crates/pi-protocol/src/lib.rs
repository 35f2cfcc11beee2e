//! Inverter Protocol Library
//!
//! This crate provides framing, checksums and reply parsing for the ASCII
//! query protocols spoken by Voltronic-family solar inverters:
//!
//! - **PI30**: `QPIGS`-style mnemonics, space-separated replies starting with `(`
//! - **PI18**: `^P005GS`-style length-prefixed inquiries, comma-separated `^D` replies
//!
//! # Architecture
//!
//! Everything here is pure: no I/O, no shared state. Each protocol module
//! provides:
//! - Command builders producing a [`Query`] (command text plus the reply
//!   envelope it expects)
//! - Reply parsers decoding the stripped payload into the shared
//!   [`models`] types, failing as a unit on any malformed field
//!
//! The transport that sends queries and the adapters that pick a parser
//! live in `pi-link`.
//!
//! # Example
//!
//! ```rust
//! use pi_protocol::checksum::{append_frame_checksum, verify_frame_checksum, CR};
//! use pi_protocol::pi30::{self, Pi30Query};
//!
//! let query = Pi30Query::Mode.query();
//! let mut frame = append_frame_checksum(query.command.as_bytes());
//! frame.push(CR);
//! assert!(verify_frame_checksum(&frame));
//!
//! let payload = query.strip("(B").unwrap();
//! assert_eq!(pi30::parse_mode(payload).unwrap().label(), "Battery");
//! ```

pub mod checksum;
pub mod display;
pub mod error;
pub mod fields;
pub mod models;
pub mod pi18;
pub mod pi30;

use std::fmt;
use std::str::FromStr;

pub use checksum::ChecksumKind;
pub use error::ParseError;
pub use models::{
    BatteryType, ChargerPriority, DeviceMode, DeviceStatusFlags, FaultCode, InputVoltageRange,
    MachineType, OutputMode, OutputSourcePriority, PvOkCondition, PvPowerBalance,
    RatedInformation, StatusInfo, Topology, Warning, Warnings,
};

/// Identifies which inverter protocol generation a device speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    /// PI17 (recognized, no adapter)
    #[cfg_attr(feature = "serde", serde(rename = "PI17"))]
    Pi17,
    /// PI18 (InfiniSolar / MAX series)
    #[cfg_attr(feature = "serde", serde(rename = "PI18"))]
    Pi18,
    /// PI30 (Axpert / PIP series)
    #[cfg_attr(feature = "serde", serde(rename = "PI30"))]
    Pi30,
}

impl Protocol {
    /// Returns the protocol ID as reported by the device
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Pi17 => "PI17",
            Protocol::Pi18 => "PI18",
            Protocol::Pi30 => "PI30",
        }
    }

    /// Checksum used on frames of this protocol
    pub fn checksum(&self) -> ChecksumKind {
        ChecksumKind::XModem
    }

    /// Whether outgoing commands carry a checksum
    pub fn uses_checksum(&self) -> bool {
        true
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a protocol name is not recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProtocol(pub String);

impl fmt::Display for UnknownProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown protocol: {:?}", self.0)
    }
}

impl std::error::Error for UnknownProtocol {}

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PI17" => Ok(Protocol::Pi17),
            "PI18" => Ok(Protocol::Pi18),
            "PI30" => Ok(Protocol::Pi30),
            _ => Err(UnknownProtocol(s.to_string())),
        }
    }
}

/// A command and the envelope its reply must carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Command text, without checksum or terminator
    pub command: String,
    /// Required start of the reply payload
    pub prefix: &'static str,
    /// Characters after the prefix that carry no data
    pub skip: usize,
}

impl Query {
    pub fn new(command: impl Into<String>, prefix: &'static str) -> Self {
        Self {
            command: command.into(),
            prefix,
            skip: 0,
        }
    }

    /// Also discard `n` characters following the prefix
    pub fn skipping(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Strip the envelope from a reply payload
    ///
    /// Returns `None` if the prefix is missing or the reply ends inside the
    /// skipped characters.
    pub fn strip<'r>(&self, reply: &'r str) -> Option<&'r str> {
        reply.strip_prefix(self.prefix)?.get(self.skip..)
    }
}
