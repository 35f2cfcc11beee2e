//! Inverter Simulation Library
//!
//! This crate provides a simulated inverter for exercising the transport,
//! the protocol adapters and detection without hardware:
//!
//! - **VirtualInverter**: answers PI30 or PI18 frames from a typed device
//!   state, with injectable line faults
//! - **reply**: renders that state in each protocol's reply grammar
//!
//! # Example
//!
//! ```rust
//! use pi_link::{detect_protocol, AdapterConfig, SerialPort};
//! use pi_protocol::Protocol;
//! use pi_sim::VirtualInverter;
//!
//! let inverter = VirtualInverter::new(Protocol::Pi18);
//! let port = SerialPort::from_line("sim", inverter.clone());
//!
//! let adapter = detect_protocol(&port, AdapterConfig::default()).unwrap();
//! assert_eq!(adapter.protocol(), Protocol::Pi18);
//! assert_eq!(adapter.status_info().unwrap(), inverter.status());
//! ```

pub mod inverter;
pub mod reply;

pub use inverter::{Faults, VirtualInverter, VirtualInverterConfig};
