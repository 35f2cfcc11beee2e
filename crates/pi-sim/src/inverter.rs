//! Virtual inverter simulation
//!
//! Provides a simulated PI30 or PI18 inverter that answers command frames
//! from a typed device state. It implements [`Line`], so it can stand in
//! for a TTY behind a `SerialPort`.
//!
//! Clones share one device: keep a clone to change state or inject faults
//! while the port owns the other.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use pi_link::Line;
use pi_protocol::checksum::{append_frame_checksum, verify_frame_checksum, CR};
use pi_protocol::models::{
    BatteryFlow, ConverterFlow, LineFlow, MpptStatus, PowerFlow, PvOkCondition, PvPowerBalance,
};
use pi_protocol::pi18::{self, Pi18Query};
use pi_protocol::pi30;
use pi_protocol::{
    BatteryType, ChargerPriority, DeviceMode, DeviceStatusFlags, InputVoltageRange, MachineType,
    OutputMode, OutputSourcePriority, Protocol, RatedInformation, StatusInfo, Topology, Warnings,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::reply;

const PI30_NAK: &str = "(NAK";
const PI30_ACK: &str = "(ACK";
const PI18_NAK: &str = "^0";
const PI18_ACK: &str = "^1";

/// Line faults the inverter can be told to produce
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// Number of upcoming replies sent with a wrong checksum
    pub corrupt_replies: u32,
    /// Replies are sent without their terminator
    pub unterminated: bool,
    /// Bytes sent after every terminator
    pub trailing_bytes: Vec<u8>,
    /// Well-formed settings are refused
    pub reject_settings: bool,
    /// Nothing is sent at all
    pub silent: bool,
}

/// Configuration for creating a virtual inverter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualInverterConfig {
    /// Display name/identifier
    pub id: String,
    /// Protocol the inverter answers in
    pub protocol: Protocol,
    pub serial_number: String,
    pub firmware_version: String,
    /// Initial device mode
    pub mode: DeviceMode,
    /// Lifetime PV generation in kWh (PI18 only)
    pub total_energy_kwh: u32,
}

impl Default for VirtualInverterConfig {
    fn default() -> Self {
        Self {
            id: "Virtual Inverter".to_string(),
            protocol: Protocol::Pi30,
            serial_number: "92932004102453".to_string(),
            firmware_version: "00072.70".to_string(),
            mode: DeviceMode::Line,
            total_energy_kwh: 4_871,
        }
    }
}

#[derive(Debug)]
struct State {
    id: String,
    protocol: Protocol,
    serial_number: String,
    firmware_version: String,
    mode: DeviceMode,
    status: StatusInfo,
    rated: RatedInformation,
    warnings: Warnings,
    total_energy_kwh: u32,
    faults: Faults,
    /// Bytes of the frame currently being received
    input: Vec<u8>,
    /// Reply bytes not yet read
    output: VecDeque<u8>,
    /// Every command received, without checksum
    received: Vec<String>,
}

/// A simulated inverter that answers protocol-accurate replies
#[derive(Debug, Clone)]
pub struct VirtualInverter {
    state: Arc<Mutex<State>>,
}

impl VirtualInverter {
    /// Create a virtual inverter with sample readings
    pub fn new(protocol: Protocol) -> Self {
        Self::from_config(VirtualInverterConfig {
            protocol,
            firmware_version: match protocol {
                Protocol::Pi18 => "05220,00000,00000".to_string(),
                _ => VirtualInverterConfig::default().firmware_version,
            },
            ..VirtualInverterConfig::default()
        })
    }

    /// Create a virtual inverter from configuration
    pub fn from_config(config: VirtualInverterConfig) -> Self {
        let state = State {
            id: config.id,
            protocol: config.protocol,
            serial_number: config.serial_number,
            firmware_version: config.firmware_version,
            mode: config.mode,
            status: sample_status(config.protocol),
            rated: sample_rated(config.protocol),
            warnings: Warnings::new(),
            total_energy_kwh: config.total_energy_kwh,
            faults: Faults::default(),
            input: Vec::new(),
            output: VecDeque::new(),
            received: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub fn protocol(&self) -> Protocol {
        self.lock().protocol
    }

    pub fn serial_number(&self) -> String {
        self.lock().serial_number.clone()
    }

    pub fn firmware_version(&self) -> String {
        self.lock().firmware_version.clone()
    }

    pub fn mode(&self) -> DeviceMode {
        self.lock().mode
    }

    pub fn set_mode(&self, mode: DeviceMode) {
        self.lock().mode = mode;
    }

    pub fn status(&self) -> StatusInfo {
        self.lock().status.clone()
    }

    pub fn set_status(&self, status: StatusInfo) {
        self.lock().status = status;
    }

    pub fn rated(&self) -> RatedInformation {
        self.lock().rated.clone()
    }

    pub fn set_rated(&self, rated: RatedInformation) {
        self.lock().rated = rated;
    }

    pub fn warnings(&self) -> Warnings {
        self.lock().warnings.clone()
    }

    pub fn set_warnings(&self, warnings: Warnings) {
        self.lock().warnings = warnings;
    }

    pub fn total_energy_kwh(&self) -> u32 {
        self.lock().total_energy_kwh
    }

    pub fn set_total_energy_kwh(&self, kwh: u32) {
        self.lock().total_energy_kwh = kwh;
    }

    /// Currently injected faults
    pub fn faults(&self) -> Faults {
        self.lock().faults.clone()
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Send the next `count` replies with a wrong checksum
    pub fn corrupt_next_replies(&self, count: u32) {
        self.lock().faults.corrupt_replies = count;
    }

    /// Commands received so far, oldest first
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    pub fn clear_received(&self) {
        self.lock().received.clear();
    }
}

impl State {
    fn handle_frame(&mut self, frame: &[u8]) {
        // frames without a valid CRC are taken verbatim
        let body = if verify_frame_checksum(frame) {
            &frame[..frame.len() - 3]
        } else {
            &frame[..frame.len() - 1]
        };
        let command = String::from_utf8_lossy(body).into_owned();
        self.received.push(command.clone());

        let reply = match self.protocol {
            Protocol::Pi30 => self.answer_pi30(&command),
            Protocol::Pi18 => self.answer_pi18(&command),
            Protocol::Pi17 => PI18_NAK.to_string(),
        };
        debug!("{}: {} -> {}", self.id, command, reply);

        if self.faults.silent {
            return;
        }
        let mut bytes = append_frame_checksum(reply.as_bytes());
        if self.faults.corrupt_replies > 0 {
            self.faults.corrupt_replies -= 1;
            let at = bytes.len() - 2;
            bytes[at] = corrupt(bytes[at]);
        }
        if !self.faults.unterminated {
            bytes.push(CR);
        }
        bytes.extend_from_slice(&self.faults.trailing_bytes);
        trace!("{} TX {:02X?}", self.id, bytes);
        self.output.extend(bytes);
    }

    fn answer_pi30(&mut self, command: &str) -> String {
        match command {
            "QPI" => "(PI30".to_string(),
            "QID" => format!("({}", self.serial_number),
            "QVFW" => format!("(VERFW:{}", self.firmware_version),
            "QPIRI" => format!("({}", reply::pi30_rated(&self.rated)),
            "QPIGS" => format!("({}", reply::pi30_status(&self.status)),
            "QPIWS" => format!("({}", pi30::encode_warnings(&self.warnings)),
            "QMOD" => match pi30::mode_letter(self.mode) {
                Some(letter) => format!("({letter}"),
                None => PI30_NAK.to_string(),
            },
            _ => match self.apply_pi30_setting(command) {
                Some(true) => PI30_ACK.to_string(),
                _ => PI30_NAK.to_string(),
            },
        }
    }

    /// `None` if `command` is not a setting this inverter knows
    fn apply_pi30_setting(&mut self, command: &str) -> Option<bool> {
        if let Some(code) = command.strip_prefix("PCP") {
            let priority = *code.parse::<usize>().ok().and_then(|i| reply::PI30_CHARGER.get(i))?;
            return Some(self.accept(|s| s.rated.charger_source_priority = priority));
        }
        if let Some(code) = command.strip_prefix("POP") {
            let priority = *code.parse::<usize>().ok().and_then(|i| reply::PI30_OUTPUT.get(i))?;
            return Some(self.accept(|s| s.rated.output_source_priority = priority));
        }
        None
    }

    fn answer_pi18(&mut self, command: &str) -> String {
        if let Some(mnemonic) = command.strip_prefix("^S").and_then(|s| s.get(3..)) {
            return match self.apply_pi18_setting(mnemonic) {
                Some(true) => PI18_ACK.to_string(),
                _ => PI18_NAK.to_string(),
            };
        }

        let Some(query) = Pi18Query::from_command(command) else {
            return PI18_NAK.to_string();
        };
        let data = match query {
            Pi18Query::ProtocolId => String::new(),
            Pi18Query::SerialNumber => {
                format!("{:02}{:0<20}", self.serial_number.len(), self.serial_number)
            }
            Pi18Query::FirmwareVersion => self.firmware_version.clone(),
            Pi18Query::RatedInformation => reply::pi18_rated(&self.rated),
            Pi18Query::GeneralStatus => reply::pi18_status(&self.status),
            Pi18Query::Mode => match pi18::mode_code(self.mode) {
                Some(code) => code,
                None => return PI18_NAK.to_string(),
            },
            Pi18Query::FaultsAndWarnings => pi18::encode_warnings(&self.warnings),
            Pi18Query::TotalEnergy => format!("{:08}", self.total_energy_kwh),
        };

        let envelope = query.query();
        if envelope.skip == 0 {
            format!("{}{}", envelope.prefix, data)
        } else {
            pi18::reply(&data)
        }
    }

    fn apply_pi18_setting(&mut self, mnemonic: &str) -> Option<bool> {
        if let Some(code) = mnemonic.strip_prefix("PCP0,") {
            let priority = *code.parse::<usize>().ok().and_then(|i| reply::PI18_CHARGER.get(i))?;
            return Some(self.accept(|s| s.rated.charger_source_priority = priority));
        }
        if let Some(code) = mnemonic.strip_prefix("POP") {
            let priority = *code.parse::<usize>().ok().and_then(|i| reply::PI18_OUTPUT.get(i))?;
            return Some(self.accept(|s| s.rated.output_source_priority = priority));
        }
        None
    }

    fn accept(&mut self, apply: impl FnOnce(&mut Self)) -> bool {
        if self.faults.reject_settings {
            return false;
        }
        apply(self);
        true
    }
}

/// A CRC byte that matches neither accepted encoding and is no delimiter
fn corrupt(byte: u8) -> u8 {
    let flipped = byte ^ 0x55;
    match flipped {
        b'(' | b'\r' | b'\n' => flipped ^ 0x80,
        _ => flipped,
    }
}

impl Line for VirtualInverter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        for &byte in bytes {
            state.input.push(byte);
            if byte == CR {
                let frame = std::mem::take(&mut state.input);
                state.handle_frame(&frame);
            }
        }
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        {
            let mut state = self.lock();
            if !state.output.is_empty() {
                let mut n = 0;
                while n < buf.len() {
                    let Some(byte) = state.output.pop_front() else {
                        break;
                    };
                    buf[n] = byte;
                    n += 1;
                    if byte == CR {
                        break;
                    }
                }
                return Ok(n);
            }
        }
        thread::sleep(wait);
        Ok(0)
    }

    fn bytes_pending(&mut self) -> io::Result<usize> {
        Ok(self.lock().output.len())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.lock().output.clear();
        Ok(())
    }
}

/// Readings of a lightly loaded inverter charging from PV
pub(crate) fn sample_status(protocol: Protocol) -> StatusInfo {
    let base = StatusInfo {
        grid_voltage: 230.0,
        grid_frequency: 50.0,
        ac_output_voltage: 229.9,
        ac_output_frequency: 50.0,
        ac_output_apparent_power: 460,
        ac_output_active_power: 372,
        output_load_percent: 9,
        battery_voltage: 52.1,
        battery_voltage_from_scc: 52.2,
        battery_charging_current: 12,
        battery_discharge_current: 0,
        battery_capacity: 100,
        pv_input_voltage: 250.0,
        pv_input_power: 1250,
        inverter_heat_sink_temperature: 39,
        load_connected: true,
        ..StatusInfo::default()
    };

    match protocol {
        Protocol::Pi18 => StatusInfo {
            battery_voltage_from_scc2: Some(0.0),
            pv2_input_voltage: Some(0.0),
            pv2_input_power: Some(0),
            mppt1_charger_temperature: Some(35),
            mppt2_charger_temperature: Some(0),
            mppt1_status: Some(MpptStatus::Charging),
            mppt2_status: Some(MpptStatus::NotCharging),
            configuration_changed: Some(false),
            power_flow: Some(PowerFlow {
                battery: BatteryFlow::Charging,
                converter: ConverterFlow::DcToAc,
                line: LineFlow::Idle,
            }),
            parallel_id: Some(0),
            ..base
        },
        _ => StatusInfo {
            bus_voltage: Some(363),
            device_status: Some(DeviceStatusFlags(
                DeviceStatusFlags::SCC_CHARGING
                    | DeviceStatusFlags::CHARGING
                    | DeviceStatusFlags::LOAD_ON
                    | DeviceStatusFlags::SWITCHED_ON,
            )),
            ..base
        },
    }
}

/// Nameplate of a 5 kVA, 48 V unit
pub(crate) fn sample_rated(protocol: Protocol) -> RatedInformation {
    let base = RatedInformation {
        grid_rating_voltage: 230.0,
        grid_rating_current: 21.7,
        ac_output_rating_voltage: 230.0,
        ac_output_rating_frequency: 50.0,
        ac_output_rating_current: 21.7,
        ac_output_rating_apparent_power: 5000,
        ac_output_rating_active_power: 5000,
        battery_type: BatteryType::User,
        battery_nominal_voltage: 48.0,
        battery_stop_discharging_voltage_with_grid: 46.0,
        battery_stop_charging_voltage_with_grid: 54.0,
        battery_under_voltage: 42.0,
        battery_bulk_voltage: 56.4,
        battery_float_voltage: 54.0,
        max_ac_charging_current: 30,
        max_charging_current: 60,
        input_voltage_range: InputVoltageRange::Appliance,
        output_source_priority: OutputSourcePriority::SolarBatteryUtility,
        charger_source_priority: ChargerPriority::SolarFirst,
        parallel_max_num: 9,
        machine_type: MachineType::OffGrid,
        topology: Topology::Transformerless,
        output_mode: OutputMode::Single,
        solar_power_priority: None,
        mppt_strings: None,
        pv_ok_condition: None,
        pv_power_balance: None,
    };

    match protocol {
        Protocol::Pi18 => RatedInformation {
            solar_power_priority: Some(pi_protocol::models::SolarPowerPriority::LoadBatteryUtility),
            mppt_strings: Some(1),
            ..base
        },
        _ => RatedInformation {
            pv_ok_condition: Some(PvOkCondition::AnyUnit),
            pv_power_balance: Some(PvPowerBalance::ChargePlusLoad),
            ..base
        },
    }
}
