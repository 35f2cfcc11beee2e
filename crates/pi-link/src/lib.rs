//! Inverter Link Library
//!
//! This crate talks to Voltronic-family inverters over a serial or
//! HID-serial device node. It provides:
//!
//! - **SerialPort**: exclusive, checksummed request/response transport
//! - **ProtocolAdapter**: typed queries and settings for PI30 and PI18
//! - **ProtocolDetector**: picks the adapter a device answers to
//!
//! All I/O is blocking; run polling on its own thread.
//!
//! # Example
//!
//! ```rust,no_run
//! use pi_link::{detect_protocol, AdapterConfig, SerialPort};
//!
//! let port = SerialPort::open("/dev/hidraw0").unwrap();
//! let adapter = detect_protocol(&port, AdapterConfig::default()).unwrap();
//!
//! let status = adapter.status_info().unwrap();
//! println!("Battery: {} V", status.battery_voltage);
//! ```

pub mod adapter;
pub mod detect;
pub mod error;
pub mod line;
pub mod port;
#[cfg(unix)]
pub mod tty;

#[cfg(test)]
mod testing;

pub use adapter::{AdapterConfig, Pi18Adapter, Pi30Adapter, ProtocolAdapter};
pub use detect::{detect_protocol, DetectConfig, ProtocolDetector, DETECTION_ORDER};
pub use error::{LinkError, Result};
pub use line::Line;
pub use port::{
    Framing, PortConfig, PortState, SerialPort, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT,
};
