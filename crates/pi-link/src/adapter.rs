//! Protocol adapters
//!
//! An adapter borrows a [`SerialPort`] and speaks one protocol grammar over
//! it: it sends that protocol's commands, checks the reply envelope and
//! hands the payload to the matching `pi_protocol` parser. Every successful
//! call returns a freshly decoded value; a decode failure returns an error
//! and nothing else.
//!
//! [`ProtocolAdapter`] is the closed set of supported protocols. Callers
//! that do not care which one they have use it directly.

use std::fmt;
use std::time::Duration;

use pi_protocol::pi18::{self, Pi18Query};
use pi_protocol::pi30::{self, Pi30Query};
use pi_protocol::{
    ChargerPriority, DeviceMode, OutputSourcePriority, ParseError, Protocol, Query,
    RatedInformation, StatusInfo, Warnings,
};
use tracing::{info, warn};

use crate::error::{LinkError, Result};
use crate::line::Line;
use crate::port::{Framing, SerialPort, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};

/// Per-session query settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Extra attempts after a checksum mismatch
    pub max_retries: u32,
    /// How long each reply may take
    pub read_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            read_timeout: DEFAULT_TIMEOUT,
        }
    }
}

type AckParser = fn(&str) -> std::result::Result<bool, ParseError>;

/// What every adapter shares: the port, its protocol and session settings
struct Session<'p, L: Line> {
    port: &'p SerialPort<L>,
    protocol: Protocol,
    config: AdapterConfig,
}

impl<'p, L: Line> Session<'p, L> {
    fn framing(&self) -> Framing {
        Framing {
            append_checksum: self.protocol.uses_checksum(),
            checksum: self.protocol.checksum(),
        }
    }

    /// Run `query` and return its payload with the envelope stripped
    fn query(&self, query: &Query) -> Result<String> {
        let reply = self.port.exchange(
            &query.command,
            self.framing(),
            self.config.max_retries,
            self.config.read_timeout,
        )?;
        match query.strip(&reply) {
            Some(payload) => Ok(payload.to_string()),
            None => Err(LinkError::UnexpectedResponse {
                command: query.command.clone(),
                expected: query.prefix.to_string(),
                reply,
            }),
        }
    }

    /// Issue a setting and report whether the inverter accepted it
    fn set_param(
        &self,
        name: &str,
        value: &dyn fmt::Display,
        query: &Query,
        ack: AckParser,
    ) -> Result<bool> {
        let reply = self.query(query)?;
        let accepted = ack(&reply)?;
        if accepted {
            info!("{} set to {}", name, value);
        } else {
            warn!("Inverter rejected {} = {} ({})", name, value, query.command);
        }
        Ok(accepted)
    }
}

/// PI30 (Axpert / PIP series) adapter
pub struct Pi30Adapter<'p, L: Line> {
    session: Session<'p, L>,
}

impl<'p, L: Line> Pi30Adapter<'p, L> {
    pub fn new(port: &'p SerialPort<L>, config: AdapterConfig) -> Self {
        Self {
            session: Session {
                port,
                protocol: Protocol::Pi30,
                config,
            },
        }
    }

    fn ask(&self, query: Pi30Query) -> Result<String> {
        self.session.query(&query.query())
    }

    /// QPI; the payload is the protocol number (`30`)
    pub fn query_protocol_id(&self) -> Result<String> {
        self.ask(Pi30Query::ProtocolId)
    }

    pub fn serial_number(&self) -> Result<String> {
        Ok(pi30::parse_serial_number(&self.ask(Pi30Query::SerialNumber)?)?)
    }

    pub fn firmware_version(&self) -> Result<String> {
        Ok(self.ask(Pi30Query::FirmwareVersion)?.trim().to_string())
    }

    pub fn rated_info(&self) -> Result<RatedInformation> {
        Ok(pi30::parse_rated_information(&self.ask(Pi30Query::RatedInformation)?)?)
    }

    pub fn status_info(&self) -> Result<StatusInfo> {
        Ok(pi30::parse_status_info(&self.ask(Pi30Query::GeneralStatus)?)?)
    }

    pub fn warnings(&self) -> Result<Warnings> {
        Ok(pi30::parse_warnings(&self.ask(Pi30Query::Warnings)?)?)
    }

    pub fn mode(&self) -> Result<DeviceMode> {
        Ok(pi30::parse_mode(&self.ask(Pi30Query::Mode)?)?)
    }

    pub fn set_param(&self, name: &str, value: &dyn fmt::Display, query: &Query) -> Result<bool> {
        self.session.set_param(name, value, query, pi30::parse_ack)
    }

    pub fn set_charger_priority(&self, priority: ChargerPriority) -> Result<bool> {
        let query = pi30::set_charger_priority(priority);
        self.set_param("charger priority", &priority, &query)
    }

    pub fn set_output_source_priority(&self, priority: OutputSourcePriority) -> Result<bool> {
        let query = pi30::set_output_source_priority(priority);
        self.set_param("output source priority", &priority, &query)
    }
}

/// PI18 (InfiniSolar / MAX series) adapter
pub struct Pi18Adapter<'p, L: Line> {
    session: Session<'p, L>,
}

impl<'p, L: Line> Pi18Adapter<'p, L> {
    pub fn new(port: &'p SerialPort<L>, config: AdapterConfig) -> Self {
        Self {
            session: Session {
                port,
                protocol: Protocol::Pi18,
                config,
            },
        }
    }

    fn ask(&self, query: Pi18Query) -> Result<String> {
        self.session.query(&query.query())
    }

    /// `^P005PI`; an empty payload once `^D00518` is stripped
    pub fn query_protocol_id(&self) -> Result<String> {
        self.ask(Pi18Query::ProtocolId)
    }

    pub fn serial_number(&self) -> Result<String> {
        Ok(pi18::parse_serial_number(&self.ask(Pi18Query::SerialNumber)?)?)
    }

    pub fn firmware_version(&self) -> Result<String> {
        Ok(self.ask(Pi18Query::FirmwareVersion)?.trim().to_string())
    }

    pub fn rated_info(&self) -> Result<RatedInformation> {
        Ok(pi18::parse_rated_information(&self.ask(Pi18Query::RatedInformation)?)?)
    }

    pub fn status_info(&self) -> Result<StatusInfo> {
        Ok(pi18::parse_status_info(&self.ask(Pi18Query::GeneralStatus)?)?)
    }

    pub fn warnings(&self) -> Result<Warnings> {
        Ok(pi18::parse_warnings(&self.ask(Pi18Query::FaultsAndWarnings)?)?)
    }

    pub fn mode(&self) -> Result<DeviceMode> {
        Ok(pi18::parse_mode(&self.ask(Pi18Query::Mode)?)?)
    }

    /// Lifetime PV generation in kWh
    pub fn total_generated_energy(&self) -> Result<u32> {
        Ok(pi18::parse_total_energy(&self.ask(Pi18Query::TotalEnergy)?)?)
    }

    pub fn set_param(&self, name: &str, value: &dyn fmt::Display, query: &Query) -> Result<bool> {
        self.session.set_param(name, value, query, pi18::parse_ack)
    }

    pub fn set_charger_priority(&self, priority: ChargerPriority) -> Result<bool> {
        let query = pi18::set_charger_priority(priority).ok_or(LinkError::UnsupportedSetting {
            protocol: Protocol::Pi18,
            setting: "charger priority",
            value: priority.to_string(),
        })?;
        self.set_param("charger priority", &priority, &query)
    }

    pub fn set_output_source_priority(&self, priority: OutputSourcePriority) -> Result<bool> {
        let query = pi18::set_output_source_priority(priority).ok_or(
            LinkError::UnsupportedSetting {
                protocol: Protocol::Pi18,
                setting: "output source priority",
                value: priority.to_string(),
            },
        )?;
        self.set_param("output source priority", &priority, &query)
    }
}

/// One query surface over every supported protocol
pub enum ProtocolAdapter<'p, L: Line> {
    Pi30(Pi30Adapter<'p, L>),
    Pi18(Pi18Adapter<'p, L>),
}

/// Forward a call to whichever adapter is inside
macro_rules! dispatch {
    ($self:ident, $adapter:ident => $call:expr) => {
        match $self {
            ProtocolAdapter::Pi30($adapter) => $call,
            ProtocolAdapter::Pi18($adapter) => $call,
        }
    };
}

impl<'p, L: Line> ProtocolAdapter<'p, L> {
    /// Adapter for an explicitly chosen protocol
    pub fn new(protocol: Protocol, port: &'p SerialPort<L>, config: AdapterConfig) -> Result<Self> {
        match protocol {
            Protocol::Pi30 => Ok(ProtocolAdapter::Pi30(Pi30Adapter::new(port, config))),
            Protocol::Pi18 => Ok(ProtocolAdapter::Pi18(Pi18Adapter::new(port, config))),
            Protocol::Pi17 => Err(LinkError::UnsupportedProtocol(format!(
                "{} is recognized but has no adapter",
                protocol
            ))),
        }
    }

    pub fn protocol(&self) -> Protocol {
        dispatch!(self, a => a.session.protocol)
    }

    pub fn config(&self) -> AdapterConfig {
        dispatch!(self, a => a.session.config)
    }

    pub fn port(&self) -> &'p SerialPort<L> {
        dispatch!(self, a => a.session.port)
    }

    /// Send `query` and return the payload after its envelope
    pub fn query(&self, query: &Query) -> Result<String> {
        dispatch!(self, a => a.session.query(query))
    }

    /// Identification probe; only success matters for detection
    pub fn query_protocol_id(&self) -> Result<String> {
        dispatch!(self, a => a.query_protocol_id())
    }

    pub fn serial_number(&self) -> Result<String> {
        dispatch!(self, a => a.serial_number())
    }

    pub fn firmware_version(&self) -> Result<String> {
        dispatch!(self, a => a.firmware_version())
    }

    pub fn rated_info(&self) -> Result<RatedInformation> {
        dispatch!(self, a => a.rated_info())
    }

    pub fn status_info(&self) -> Result<StatusInfo> {
        dispatch!(self, a => a.status_info())
    }

    pub fn warnings(&self) -> Result<Warnings> {
        dispatch!(self, a => a.warnings())
    }

    pub fn mode(&self) -> Result<DeviceMode> {
        dispatch!(self, a => a.mode())
    }

    /// Issue a prepared setting command
    ///
    /// A well-formed rejection is `Ok(false)`; only a missing or unreadable
    /// acknowledgement is an error.
    pub fn set_param(&self, name: &str, value: &dyn fmt::Display, query: &Query) -> Result<bool> {
        dispatch!(self, a => a.set_param(name, value, query))
    }

    pub fn set_charger_priority(&self, priority: ChargerPriority) -> Result<bool> {
        dispatch!(self, a => a.set_charger_priority(priority))
    }

    pub fn set_output_source_priority(&self, priority: OutputSourcePriority) -> Result<bool> {
        dispatch!(self, a => a.set_output_source_priority(priority))
    }

    /// Lifetime PV generation in kWh, where the protocol reports it
    pub fn total_generated_energy(&self) -> Result<Option<u32>> {
        match self {
            ProtocolAdapter::Pi30(_) => Ok(None),
            ProtocolAdapter::Pi18(a) => a.total_generated_energy().map(Some),
        }
    }
}

impl<L: Line> fmt::Debug for ProtocolAdapter<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolAdapter")
            .field("protocol", &self.protocol())
            .field("port", &self.port().path())
            .field("config", &self.config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast, ScriptedLine};
    use pi_protocol::{BatteryType, Warning};
    use std::sync::{Arc, Mutex};

    const QPIGS: &str = "(230.0 50.0 230.0 50.0 0115 0092 002 390 51.20 012 090 0035 01.5 110.0 00.00 00000 00010110";
    const QPIRI: &str = "(230.0 21.7 230.0 50.0 21.7 5000 4000 48.0 46.0 42.0 56.4 54.0 2 30 060 0 1 2 1 01 0 0 54.0";

    type Commands = Arc<Mutex<Vec<String>>>;

    fn port(replies: &[&str]) -> (SerialPort<ScriptedLine>, Commands) {
        let line = ScriptedLine::replying(replies);
        let commands = line.commands.clone();
        (SerialPort::from_line("test", line).with_config(fast()), commands)
    }

    fn config() -> AdapterConfig {
        AdapterConfig {
            max_retries: 2,
            read_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn pi17_has_no_adapter() {
        let (port, _) = port(&[]);
        let err = ProtocolAdapter::new(Protocol::Pi17, &port, config()).unwrap_err();
        assert!(matches!(err, LinkError::UnsupportedProtocol(_)));
    }

    #[test]
    fn pi30_status() {
        let (port, _) = port(&[QPIGS]);
        let adapter = ProtocolAdapter::new(Protocol::Pi30, &port, config()).unwrap();

        let status = adapter.status_info().unwrap();
        assert_eq!(status.grid_voltage, 230.0);
        // 9th token "51.20"
        assert_eq!(status.battery_voltage, 51.2);
        assert_eq!(status.battery_capacity, 90);
        assert!(status.load_connected);
    }

    #[test]
    fn pi30_rated() {
        let (port, _) = port(&[QPIRI]);
        let adapter = ProtocolAdapter::new(Protocol::Pi30, &port, config()).unwrap();

        let rated = adapter.rated_info().unwrap();
        assert_eq!(rated.battery_type, BatteryType::User);
        assert_eq!(rated.charger_source_priority, ChargerPriority::SolarAndUtility);
    }

    #[test]
    fn wrong_prefix_is_unexpected_response() {
        let (port, _) = port(&["^D00518"]);
        let adapter = Pi30Adapter::new(&port, config());

        let err = adapter.query_protocol_id().unwrap_err();
        match err {
            LinkError::UnexpectedResponse {
                command,
                expected,
                reply,
            } => {
                assert_eq!(command, "QPI");
                assert_eq!(expected, "(PI");
                assert_eq!(reply, "^D00518");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_reply_is_an_error() {
        let (port, _) = port(&["(Z"]);
        let adapter = Pi30Adapter::new(&port, config());
        let err = adapter.mode().unwrap_err();
        assert!(matches!(
            err,
            LinkError::MalformedResponse(ParseError::UnknownCode { .. })
        ));
    }

    #[test]
    fn set_param_acknowledgements() {
        let (port, commands) = port(&["(ACK", "(NAK", "(OOPS"]);
        let adapter = ProtocolAdapter::new(Protocol::Pi30, &port, config()).unwrap();

        assert!(adapter.set_charger_priority(ChargerPriority::OnlySolar).unwrap());
        assert!(!adapter
            .set_output_source_priority(OutputSourcePriority::Utility)
            .unwrap());
        assert!(matches!(
            adapter.set_charger_priority(ChargerPriority::SolarFirst),
            Err(LinkError::MalformedResponse(ParseError::UnexpectedAck(_)))
        ));

        assert_eq!(*commands.lock().unwrap(), ["PCP03", "POP00", "PCP01"]);
    }

    #[test]
    fn pi18_unencodable_setting() {
        let (port, commands) = port(&[]);
        let adapter = ProtocolAdapter::new(Protocol::Pi18, &port, config()).unwrap();

        let err = adapter
            .set_charger_priority(ChargerPriority::UtilityFirst)
            .unwrap_err();
        assert!(matches!(err, LinkError::UnsupportedSetting { .. }));
        assert!(commands.lock().unwrap().is_empty());
    }

    #[test]
    fn pi18_queries() {
        let (port, commands) = port(&[
            "^D00502",
            "^D0251412345678901234",
            // fault code, then the overload flag set
            "^D03700,0,0,0,0,0,0,0,1,0,0,0,0,0,0,0,0",
            "^D011012345",
            "^1",
        ]);
        let adapter = ProtocolAdapter::new(Protocol::Pi18, &port, config()).unwrap();

        assert_eq!(adapter.mode().unwrap(), DeviceMode::Bypass);
        assert_eq!(adapter.serial_number().unwrap(), "12345678901234");
        assert!(adapter.warnings().unwrap().contains(Warning::OverLoad));
        assert_eq!(adapter.total_generated_energy().unwrap(), Some(12345));
        assert!(adapter
            .set_output_source_priority(OutputSourcePriority::SolarBatteryUtility)
            .unwrap());

        assert_eq!(
            *commands.lock().unwrap(),
            ["^P006MOD", "^P005ID", "^P005FWS", "^P005ET", "^S007POP1"]
        );
    }

    #[test]
    fn pi30_has_no_energy_counter() {
        let (port, _) = port(&[]);
        let adapter = ProtocolAdapter::new(Protocol::Pi30, &port, config()).unwrap();
        assert_eq!(adapter.total_generated_energy().unwrap(), None);
    }
}
