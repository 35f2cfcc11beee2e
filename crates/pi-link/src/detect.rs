//! Protocol detection
//!
//! Each supported protocol's identification command is tried in a fixed
//! order. The first one answered with a valid, correctly enveloped frame
//! wins and no further probes are sent.

use std::time::Duration;

use pi_protocol::Protocol;
use tracing::{debug, info};

use crate::adapter::{AdapterConfig, ProtocolAdapter};
use crate::error::{LinkError, Result};
use crate::line::Line;
use crate::port::SerialPort;

/// Probe order
pub const DETECTION_ORDER: [Protocol; 2] = [Protocol::Pi30, Protocol::Pi18];

/// Configuration for probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectConfig {
    /// Reply timeout for each identification query
    pub probe_timeout: Duration,
    /// Checksum retries for each identification query
    pub probe_retries: u32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            probe_retries: 1,
        }
    }
}

/// Finds the protocol an inverter speaks
#[derive(Debug, Clone, Default)]
pub struct ProtocolDetector {
    config: DetectConfig,
}

impl ProtocolDetector {
    /// Create a detector with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector with custom configuration
    pub fn with_config(config: DetectConfig) -> Self {
        Self { config }
    }

    /// Probe `port` and return an adapter using `session` for later queries
    pub fn detect<'p, L: Line>(
        &self,
        port: &'p SerialPort<L>,
        session: AdapterConfig,
    ) -> Result<ProtocolAdapter<'p, L>> {
        let probe_config = AdapterConfig {
            max_retries: self.config.probe_retries,
            read_timeout: self.config.probe_timeout,
        };

        for protocol in DETECTION_ORDER {
            let probe = ProtocolAdapter::new(protocol, port, probe_config)?;
            match probe.query_protocol_id() {
                Ok(id) => {
                    info!("Detected {} on {} (id {:?})", protocol, port.path(), id);
                    return ProtocolAdapter::new(protocol, port, session);
                }
                Err(e) => debug!("{} probe on {} failed: {}", protocol, port.path(), e),
            }
        }

        Err(LinkError::UnsupportedProtocol(format!(
            "no supported protocol answered on {}",
            port.path()
        )))
    }
}

/// Detect with default probe settings
pub fn detect_protocol<L: Line>(
    port: &SerialPort<L>,
    session: AdapterConfig,
) -> Result<ProtocolAdapter<'_, L>> {
    ProtocolDetector::new().detect(port, session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{corrupted, fast, frame, ScriptedLine};

    fn detector() -> ProtocolDetector {
        ProtocolDetector::with_config(DetectConfig {
            probe_timeout: Duration::from_millis(100),
            probe_retries: 0,
        })
    }

    #[test]
    fn pi30_answers_first_probe() {
        let line = ScriptedLine::replying(&["(PI30"]);
        let commands = line.commands.clone();
        let port = SerialPort::from_line("test", line).with_config(fast());

        let adapter = detector().detect(&port, AdapterConfig::default()).unwrap();
        assert_eq!(adapter.protocol(), Protocol::Pi30);
        assert_eq!(adapter.config(), AdapterConfig::default());
        assert_eq!(*commands.lock().unwrap(), ["QPI"]);
    }

    #[test]
    fn pi18_after_pi30_rejected() {
        let line = ScriptedLine::replying(&["^0", "^D00518"]);
        let commands = line.commands.clone();
        let port = SerialPort::from_line("test", line).with_config(fast());

        let adapter = detector().detect(&port, AdapterConfig::default()).unwrap();
        assert_eq!(adapter.protocol(), Protocol::Pi18);
        assert_eq!(*commands.lock().unwrap(), ["QPI", "^P005PI"]);
    }

    #[test]
    fn corrupted_probe_does_not_count() {
        let line = ScriptedLine::new(vec![corrupted("(PI30"), frame("^D00518")]);
        let port = SerialPort::from_line("test", line).with_config(fast());

        let adapter = detector().detect(&port, AdapterConfig::default()).unwrap();
        assert_eq!(adapter.protocol(), Protocol::Pi18);
    }

    #[test]
    fn silent_device_is_unsupported() {
        let line = ScriptedLine::new(vec![]);
        let commands = line.commands.clone();
        let port = SerialPort::from_line("silent", line).with_config(fast());

        let err = detector().detect(&port, AdapterConfig::default()).unwrap_err();
        assert!(matches!(err, LinkError::UnsupportedProtocol(msg) if msg.contains("silent")));
        assert_eq!(commands.lock().unwrap().len(), DETECTION_ORDER.len());
    }
}
