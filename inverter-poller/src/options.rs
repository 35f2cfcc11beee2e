use std::path::PathBuf;

use clap::Parser;
use pi_protocol::Protocol;

use crate::settings::ProtocolChoice;

/// Polls a PI18/PI30 solar inverter and publishes its state
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Settings file to read instead of $XDG_CONFIG_HOME/inverter-poller/settings.json
    #[clap(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[clap(short = 'd', long = "debug")]
    pub debug: bool,

    /// Poll once and exit
    #[clap(short = '1', long = "run-once")]
    pub run_once: bool,

    /// Send one raw command, print the reply and exit
    #[clap(short = 'r', long = "raw", value_name = "COMMAND")]
    pub raw: Option<String>,

    /// Append a checksum to the raw command
    #[clap(long = "crc", requires = "raw")]
    pub crc: bool,

    /// Protocol to speak: auto, PI30, PI18 or PI17
    #[clap(long = "protocol")]
    pub protocol: Option<ProtocolChoice>,

    /// Talk to a simulated PI30 or PI18 inverter instead of the device
    #[clap(long = "simulate", value_name = "PROTOCOL")]
    pub simulate: Option<Protocol>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Options::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let options = Options::try_parse_from([
            "inverter-poller",
            "-c",
            "/etc/poller.json",
            "-d",
            "-1",
            "--protocol",
            "pi18",
            "--simulate",
            "PI18",
        ])
        .unwrap();

        assert_eq!(options.config, Some(PathBuf::from("/etc/poller.json")));
        assert!(options.debug);
        assert!(options.run_once);
        assert_eq!(options.protocol, Some(ProtocolChoice::Fixed(Protocol::Pi18)));
        assert_eq!(options.simulate, Some(Protocol::Pi18));
        assert_eq!(options.raw, None);
    }

    #[test]
    fn raw_command() {
        let options =
            Options::try_parse_from(["inverter-poller", "-r", "QPIGS", "--crc"]).unwrap();
        assert_eq!(options.raw.as_deref(), Some("QPIGS"));
        assert!(options.crc);

        // a checksum flag without a command is meaningless
        assert!(Options::try_parse_from(["inverter-poller", "--crc"]).is_err());
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        assert!(Options::try_parse_from(["inverter-poller", "--simulate", "PI99"]).is_err());
    }
}
