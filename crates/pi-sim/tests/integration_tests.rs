//! Integration tests for the inverter link
//!
//! These tests drive the real transport, adapters and detection against a
//! `VirtualInverter`:
//! - Full query surface for PI30 and PI18
//! - Detection order and adapter selection
//! - Checksum retry, timeout bounds and trailing-byte rejection
//! - Setting acknowledgements

use std::time::{Duration, Instant};

use pi_link::{
    detect_protocol, AdapterConfig, DetectConfig, LinkError, PortConfig, ProtocolAdapter,
    ProtocolDetector, SerialPort,
};
use pi_protocol::{
    ChargerPriority, DeviceMode, FaultCode, OutputSourcePriority, Protocol, Warning, Warnings,
};
use pi_sim::{Faults, VirtualInverter};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Port settings without pacing delays
    pub fn fast() -> PortConfig {
        PortConfig {
            chunk_delay: Duration::ZERO,
            read_slice: Duration::from_millis(5),
            read_timeout: Duration::from_millis(300),
            ..PortConfig::default()
        }
    }

    pub fn port(inverter: &VirtualInverter) -> SerialPort<VirtualInverter> {
        SerialPort::from_line("sim", inverter.clone()).with_config(fast())
    }

    pub fn session() -> AdapterConfig {
        AdapterConfig {
            max_retries: 3,
            read_timeout: Duration::from_millis(300),
        }
    }

    pub fn detector() -> ProtocolDetector {
        ProtocolDetector::with_config(DetectConfig {
            probe_timeout: Duration::from_millis(200),
            probe_retries: 1,
        })
    }
}

use helpers::*;

// ============================================================================
// Query surface
// ============================================================================

#[test]
fn pi30_full_poll_cycle() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    inverter.set_mode(DeviceMode::Battery);
    inverter.set_warnings([Warning::LineFail, Warning::BatteryLowAlarm].into_iter().collect());
    let port = port(&inverter);
    let adapter = ProtocolAdapter::new(Protocol::Pi30, &port, session()).unwrap();

    assert_eq!(adapter.mode().unwrap(), DeviceMode::Battery);
    assert_eq!(adapter.rated_info().unwrap(), inverter.rated());
    assert_eq!(adapter.status_info().unwrap(), inverter.status());
    assert_eq!(adapter.warnings().unwrap(), inverter.warnings());
    assert_eq!(adapter.serial_number().unwrap(), inverter.serial_number());
    assert_eq!(adapter.firmware_version().unwrap(), "00072.70");
    assert_eq!(adapter.total_generated_energy().unwrap(), None);

    assert_eq!(
        inverter.received(),
        ["QMOD", "QPIRI", "QPIGS", "QPIWS", "QID", "QVFW"]
    );
}

#[test]
fn pi18_full_poll_cycle() {
    let inverter = VirtualInverter::new(Protocol::Pi18);
    inverter.set_mode(DeviceMode::Hybrid);
    let warnings: Warnings = [
        Warning::Fault(FaultCode::new(7).unwrap()),
        Warning::OverTemperature,
    ]
    .into_iter()
    .collect();
    inverter.set_warnings(warnings.clone());
    inverter.set_total_energy_kwh(12_345);
    let port = port(&inverter);
    let adapter = ProtocolAdapter::new(Protocol::Pi18, &port, session()).unwrap();

    assert_eq!(adapter.mode().unwrap(), DeviceMode::Hybrid);
    assert_eq!(adapter.rated_info().unwrap(), inverter.rated());
    assert_eq!(adapter.status_info().unwrap(), inverter.status());
    assert_eq!(adapter.warnings().unwrap(), warnings);
    assert_eq!(adapter.serial_number().unwrap(), inverter.serial_number());
    assert_eq!(adapter.firmware_version().unwrap(), "05220,00000,00000");
    assert_eq!(adapter.total_generated_energy().unwrap(), Some(12_345));
}

#[test]
fn battery_voltage_is_scaled_per_protocol() {
    for protocol in [Protocol::Pi30, Protocol::Pi18] {
        let inverter = VirtualInverter::new(protocol);
        let port = port(&inverter);
        let adapter = ProtocolAdapter::new(protocol, &port, session()).unwrap();
        assert_eq!(adapter.status_info().unwrap().battery_voltage, 52.1, "{protocol}");
    }
}

#[test]
fn unknown_mode_is_malformed() {
    // PI30 cannot report hybrid mode, so the inverter refuses QMOD
    let inverter = VirtualInverter::new(Protocol::Pi30);
    inverter.set_mode(DeviceMode::Hybrid);
    let port = port(&inverter);
    let adapter = ProtocolAdapter::new(Protocol::Pi30, &port, session()).unwrap();

    assert!(matches!(
        adapter.mode(),
        Err(LinkError::MalformedResponse(_))
    ));
}

// ============================================================================
// Detection
// ============================================================================

#[test]
fn detects_pi30_with_one_probe() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    let port = port(&inverter);

    let adapter = detector().detect(&port, session()).unwrap();
    assert_eq!(adapter.protocol(), Protocol::Pi30);
    assert_eq!(adapter.config(), session());
    assert_eq!(inverter.received(), ["QPI"]);
}

#[test]
fn detects_pi18_after_pi30_probe() {
    let inverter = VirtualInverter::new(Protocol::Pi18);
    let port = port(&inverter);

    let adapter = detector().detect(&port, session()).unwrap();
    assert_eq!(adapter.protocol(), Protocol::Pi18);
    assert_eq!(inverter.received(), ["QPI", "^P005PI"]);

    // detected adapter is immediately usable
    inverter.clear_received();
    adapter.status_info().unwrap();
    assert_eq!(inverter.received(), ["^P005GS"]);
}

#[test]
fn detection_fails_on_silent_device() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    inverter.set_faults(Faults {
        silent: true,
        ..Faults::default()
    });
    let port = port(&inverter);

    let err = detector().detect(&port, session()).unwrap_err();
    assert!(matches!(err, LinkError::UnsupportedProtocol(_)));
}

#[test]
fn pi17_inverter_is_unsupported() {
    let inverter = VirtualInverter::new(Protocol::Pi17);
    let port = port(&inverter);

    assert!(matches!(
        detector().detect(&port, session()),
        Err(LinkError::UnsupportedProtocol(_))
    ));
}

// ============================================================================
// Transport faults
// ============================================================================

#[test]
fn corrupted_reply_is_retried_once() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    inverter.corrupt_next_replies(1);
    let port = port(&inverter);
    let adapter = ProtocolAdapter::new(Protocol::Pi30, &port, session()).unwrap();

    assert_eq!(adapter.status_info().unwrap(), inverter.status());
    assert_eq!(inverter.received(), ["QPIGS", "QPIGS"]);
}

#[test]
fn corruption_beyond_retries_surfaces() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    inverter.corrupt_next_replies(10);
    let port = port(&inverter);
    let adapter = ProtocolAdapter::new(Protocol::Pi30, &port, session()).unwrap();

    assert!(matches!(
        adapter.mode(),
        Err(LinkError::ChecksumMismatch { .. })
    ));
    // first attempt plus three retries
    assert_eq!(inverter.received().len(), 4);
}

#[test]
fn unterminated_reply_times_out_within_bound() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    inverter.set_faults(Faults {
        unterminated: true,
        ..Faults::default()
    });
    let port = port(&inverter);
    let timeout = Duration::from_millis(250);

    port.send("QPI", true).unwrap();
    let start = Instant::now();
    let err = port.receive(timeout).unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, LinkError::Timeout(_)));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(1));
}

#[test]
fn trailing_bytes_are_a_protocol_error() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    inverter.set_faults(Faults {
        trailing_bytes: b"\r\n".to_vec(),
        ..Faults::default()
    });
    let port = port(&inverter);

    let err = port.query("QMOD", true, 3).unwrap_err();
    assert!(matches!(err, LinkError::Protocol(_)));
    // not a checksum problem, so not retried
    assert_eq!(inverter.received(), ["QMOD"]);
}

#[test]
fn raw_passthrough_skips_envelope_checks() {
    let inverter = VirtualInverter::new(Protocol::Pi18);
    let port = port(&inverter);

    assert_eq!(port.raw_query("QPI", true).unwrap(), "^0");
    assert_eq!(port.raw_query("^P005PI", true).unwrap(), "^D00518");
}

#[test]
fn closing_the_port_releases_the_line() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    let port = port(&inverter);
    port.close().unwrap();

    // the device itself is still usable through a new port
    let port = helpers::port(&inverter);
    assert_eq!(port.raw_query("QPI", true).unwrap(), "(PI30");
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn settings_are_acknowledged() {
    let inverter = VirtualInverter::new(Protocol::Pi30);
    let port = port(&inverter);
    let adapter = detect_protocol(&port, session()).unwrap();

    assert!(adapter
        .set_charger_priority(ChargerPriority::SolarAndUtility)
        .unwrap());
    assert!(adapter
        .set_output_source_priority(OutputSourcePriority::Utility)
        .unwrap());

    let rated = adapter.rated_info().unwrap();
    assert_eq!(rated.charger_source_priority, ChargerPriority::SolarAndUtility);
    assert_eq!(rated.output_source_priority, OutputSourcePriority::Utility);
}

#[test]
fn rejected_setting_is_false_not_error() {
    for protocol in [Protocol::Pi30, Protocol::Pi18] {
        let inverter = VirtualInverter::new(protocol);
        inverter.set_faults(Faults {
            reject_settings: true,
            ..Faults::default()
        });
        let port = port(&inverter);
        let adapter = ProtocolAdapter::new(protocol, &port, session()).unwrap();

        assert!(!adapter
            .set_charger_priority(ChargerPriority::OnlySolar)
            .unwrap());
        assert_eq!(
            inverter.rated().charger_source_priority,
            ChargerPriority::SolarFirst
        );
    }
}

#[test]
fn pi18_setting_frames() {
    let inverter = VirtualInverter::new(Protocol::Pi18);
    let port = port(&inverter);
    let adapter = ProtocolAdapter::new(Protocol::Pi18, &port, session()).unwrap();

    assert!(adapter
        .set_charger_priority(ChargerPriority::SolarAndUtility)
        .unwrap());
    assert!(adapter
        .set_output_source_priority(OutputSourcePriority::SolarUtilityBattery)
        .unwrap());
    assert_eq!(inverter.received(), ["^S009PCP0,1", "^S007POP0"]);
}
