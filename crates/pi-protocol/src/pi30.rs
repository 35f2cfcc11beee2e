//! PI30 protocol (Axpert / MPP Solar PIP and rebrands)
//!
//! # Format
//!
//! Commands are bare ASCII mnemonics (`QPIGS`). Replies start with `(`
//! and carry space-separated fixed-width tokens:
//!
//! ```text
//! (230.0 50.0 230.0 50.0 0460 0372 009 363 52.10 000 100 0039 0000 000.0 00.00 00000 00010101 00 00 00000 010
//! ```
//!
//! Set commands are acknowledged with `(ACK` or rejected with `(NAK`.

use crate::error::ParseError;
use crate::fields::{self, Fields};
use crate::models::{
    BatteryType, ChargerPriority, DeviceMode, DeviceStatusFlags, InputVoltageRange, MachineType,
    OutputMode, OutputSourcePriority, PvOkCondition, PvPowerBalance, RatedInformation, StatusInfo,
    Topology, Warning, Warnings,
};
use crate::Query;

/// Minimum QPIRI token count; newer firmware appends optional fields
pub const RATED_FIELDS: usize = 23;
const RATED_FIELDS_MAX: usize = 32;
/// Minimum QPIGS token count; tokens past the device status bits are optional
pub const STATUS_FIELDS: usize = 17;
/// Minimum QPIWS bit count
pub const WARNING_BITS: usize = 32;

/// PI30 inquiry commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pi30Query {
    /// QPI: protocol ID (`(PI30`)
    ProtocolId,
    /// QID: device serial number
    SerialNumber,
    /// QVFW: main CPU firmware version
    FirmwareVersion,
    /// QPIRI: device rating information
    RatedInformation,
    /// QPIGS: device general status parameters
    GeneralStatus,
    /// QMOD: device mode
    Mode,
    /// QPIWS: device warning status
    Warnings,
}

impl Pi30Query {
    pub fn command(self) -> &'static str {
        match self {
            Pi30Query::ProtocolId => "QPI",
            Pi30Query::SerialNumber => "QID",
            Pi30Query::FirmwareVersion => "QVFW",
            Pi30Query::RatedInformation => "QPIRI",
            Pi30Query::GeneralStatus => "QPIGS",
            Pi30Query::Mode => "QMOD",
            Pi30Query::Warnings => "QPIWS",
        }
    }

    pub fn reply_prefix(self) -> &'static str {
        match self {
            Pi30Query::ProtocolId => "(PI",
            Pi30Query::FirmwareVersion => "(VERFW:",
            _ => "(",
        }
    }

    pub fn query(self) -> Query {
        Query::new(self.command(), self.reply_prefix())
    }
}

/// Build the PCP command selecting the charger source priority
pub fn set_charger_priority(priority: ChargerPriority) -> Query {
    let code = match priority {
        ChargerPriority::UtilityFirst => 0,
        ChargerPriority::SolarFirst => 1,
        ChargerPriority::SolarAndUtility => 2,
        ChargerPriority::OnlySolar => 3,
    };
    Query::new(format!("PCP{code:02}"), "(")
}

/// Build the POP command selecting the output source priority
pub fn set_output_source_priority(priority: OutputSourcePriority) -> Query {
    let code = match priority {
        OutputSourcePriority::Utility => 0,
        OutputSourcePriority::SolarUtilityBattery => 1,
        OutputSourcePriority::SolarBatteryUtility => 2,
    };
    Query::new(format!("POP{code:02}"), "(")
}

/// Decode a set-command reply with the `(` already stripped
pub fn parse_ack(reply: &str) -> Result<bool, ParseError> {
    match reply.trim() {
        "ACK" => Ok(true),
        "NAK" => Ok(false),
        other => Err(ParseError::UnexpectedAck(other.to_string())),
    }
}

/// Decode a QID reply
pub fn parse_serial_number(reply: &str) -> Result<String, ParseError> {
    let serial = reply.trim();
    if serial.is_empty() {
        return Err(ParseError::TooShort {
            reply: "QID",
            len: 0,
        });
    }
    Ok(serial.to_string())
}

fn mode_code(code: &str) -> Option<DeviceMode> {
    Some(match code {
        "P" => DeviceMode::PowerOn,
        "S" => DeviceMode::Standby,
        "Y" => DeviceMode::Bypass,
        "L" => DeviceMode::Line,
        "B" => DeviceMode::Battery,
        "T" => DeviceMode::BatteryTest,
        "F" => DeviceMode::Fault,
        "H" => DeviceMode::PowerSaving,
        "D" => DeviceMode::Shutdown,
        "G" => DeviceMode::Grid,
        "C" => DeviceMode::Charge,
        "E" => DeviceMode::Eco,
        _ => return None,
    })
}

/// Decode a QMOD reply
pub fn parse_mode(reply: &str) -> Result<DeviceMode, ParseError> {
    let code = reply.trim();
    mode_code(code).ok_or_else(|| ParseError::UnknownCode {
        field: "device mode",
        code: code.to_string(),
    })
}

/// Numeric code table lookup tolerant of zero padding (`0` and `00`)
fn numeric<T: Copy>(table: &[T]) -> impl Fn(&str) -> Option<T> + '_ {
    move |token| {
        token
            .parse::<usize>()
            .ok()
            .and_then(|i| table.get(i).copied())
    }
}

fn battery_type(token: &str) -> Option<BatteryType> {
    numeric(&[
        BatteryType::Agm,
        BatteryType::Flooded,
        BatteryType::User,
        BatteryType::Pyl,
        BatteryType::Sh,
    ])(token)
}

fn input_voltage_range(token: &str) -> Option<InputVoltageRange> {
    numeric(&[InputVoltageRange::Appliance, InputVoltageRange::Ups])(token)
}

fn output_source_priority(token: &str) -> Option<OutputSourcePriority> {
    numeric(&[
        OutputSourcePriority::Utility,
        OutputSourcePriority::SolarUtilityBattery,
        OutputSourcePriority::SolarBatteryUtility,
    ])(token)
}

fn charger_priority(token: &str) -> Option<ChargerPriority> {
    numeric(&[
        ChargerPriority::UtilityFirst,
        ChargerPriority::SolarFirst,
        ChargerPriority::SolarAndUtility,
        ChargerPriority::OnlySolar,
    ])(token)
}

fn machine_type(token: &str) -> Option<MachineType> {
    // two binary digits: 00 grid tie, 01 off grid, 10 hybrid
    match token.parse::<u8>().ok()? {
        0 => Some(MachineType::GridTie),
        1 => Some(MachineType::OffGrid),
        10 => Some(MachineType::Hybrid),
        _ => None,
    }
}

fn topology(token: &str) -> Option<Topology> {
    numeric(&[Topology::Transformerless, Topology::Transformer])(token)
}

fn pv_ok_condition(token: &str) -> Option<PvOkCondition> {
    numeric(&[PvOkCondition::AnyUnit, PvOkCondition::AllUnits])(token)
}

fn pv_power_balance(token: &str) -> Option<PvPowerBalance> {
    numeric(&[PvPowerBalance::ChargeCurrent, PvPowerBalance::ChargePlusLoad])(token)
}

fn output_mode(token: &str) -> Option<OutputMode> {
    numeric(&[
        OutputMode::Single,
        OutputMode::Parallel,
        OutputMode::Phase1Of3,
        OutputMode::Phase2Of3,
        OutputMode::Phase3Of3,
    ])(token)
}

/// Decode a QPIRI reply
pub fn parse_rated_information(reply: &str) -> Result<RatedInformation, ParseError> {
    let f = Fields::whitespace(reply, "QPIRI", RATED_FIELDS..=RATED_FIELDS_MAX)?;

    Ok(RatedInformation {
        grid_rating_voltage: f.tenths(0, "grid rating voltage")?,
        grid_rating_current: f.tenths(1, "grid rating current")?,
        ac_output_rating_voltage: f.tenths(2, "AC output rating voltage")?,
        ac_output_rating_frequency: f.tenths(3, "AC output rating frequency")?,
        ac_output_rating_current: f.tenths(4, "AC output rating current")?,
        ac_output_rating_apparent_power: f.number(5, "AC output rating apparent power")?,
        ac_output_rating_active_power: f.number(6, "AC output rating active power")?,
        battery_nominal_voltage: f.tenths(7, "battery rating voltage")?,
        battery_stop_discharging_voltage_with_grid: f.tenths(8, "battery recharge voltage")?,
        battery_under_voltage: f.tenths(9, "battery under voltage")?,
        battery_bulk_voltage: f.tenths(10, "battery bulk voltage")?,
        battery_float_voltage: f.tenths(11, "battery float voltage")?,
        battery_type: f.code(12, "battery type", battery_type)?,
        max_ac_charging_current: f.number(13, "max AC charging current")?,
        max_charging_current: f.number(14, "max charging current")?,
        input_voltage_range: f.code(15, "input voltage range", input_voltage_range)?,
        output_source_priority: f.code(16, "output source priority", output_source_priority)?,
        charger_source_priority: f.code(17, "charger source priority", charger_priority)?,
        parallel_max_num: f.number(18, "parallel max num")?,
        machine_type: f.code(19, "machine type", machine_type)?,
        topology: f.code(20, "topology", topology)?,
        output_mode: f.code(21, "output mode", output_mode)?,
        battery_stop_charging_voltage_with_grid: f.tenths(22, "battery re-discharge voltage")?,
        solar_power_priority: None,
        mppt_strings: None,
        pv_ok_condition: f.optional_code(23, "PV OK condition", pv_ok_condition)?,
        pv_power_balance: f.optional_code(24, "PV power balance", pv_power_balance)?,
    })
}

fn status_flags(low: &str, high: Option<&str>) -> Result<DeviceStatusFlags, ParseError> {
    let to_u16 = |bits: Vec<bool>| bits.into_iter().fold(0u16, |acc, b| (acc << 1) | b as u16);

    if low.len() != 8 {
        return Err(ParseError::InvalidNumber {
            field: "device status",
            value: low.to_string(),
        });
    }
    let mut flags = to_u16(fields::bits(low)?);

    if let Some(high) = high {
        if high.len() != 3 {
            return Err(ParseError::InvalidNumber {
                field: "device status 2",
                value: high.to_string(),
            });
        }
        flags |= to_u16(fields::bits(high)?) << 8;
    }
    Ok(DeviceStatusFlags(flags))
}

/// Decode a QPIGS reply
pub fn parse_status_info(reply: &str) -> Result<StatusInfo, ParseError> {
    let f = Fields::whitespace(reply, "QPIGS", STATUS_FIELDS..=usize::MAX)?;

    let pv_input_current = f.decimal(12, "PV input current")?;
    let pv_input_voltage = f.tenths(13, "PV input voltage")?;
    let pv_input_power = if f.len() > 19 {
        f.number(19, "PV charging power")?
    } else {
        (pv_input_voltage * pv_input_current).round() as u32
    };
    let device_status = status_flags(f.raw(16), f.get(20))?;

    Ok(StatusInfo {
        grid_voltage: f.tenths(0, "grid voltage")?,
        grid_frequency: f.tenths(1, "grid frequency")?,
        ac_output_voltage: f.tenths(2, "AC output voltage")?,
        ac_output_frequency: f.tenths(3, "AC output frequency")?,
        ac_output_apparent_power: f.number(4, "AC output apparent power")?,
        ac_output_active_power: f.number(5, "AC output active power")?,
        output_load_percent: f.number(6, "output load percent")?,
        bus_voltage: Some(f.number(7, "bus voltage")?),
        battery_voltage: f.tenths(8, "battery voltage")?,
        battery_charging_current: f.number(9, "battery charging current")?,
        battery_capacity: f.number(10, "battery capacity")?,
        inverter_heat_sink_temperature: f.number(11, "heat sink temperature")?,
        pv_input_voltage,
        pv_input_power,
        battery_voltage_from_scc: f.tenths(14, "battery voltage from SCC")?,
        battery_discharge_current: f.number(15, "battery discharge current")?,
        load_connected: device_status.load_on(),
        device_status: Some(device_status),
        ..StatusInfo::default()
    })
}

/// QPIWS bit positions, `a0` first; `None` marks reserved bits
const WARNING_TABLE: [Option<Warning>; WARNING_BITS] = [
    None,
    Some(Warning::InverterFault),
    Some(Warning::BusOver),
    Some(Warning::BusUnder),
    Some(Warning::BusSoftFail),
    Some(Warning::LineFail),
    Some(Warning::OutputShortCircuit),
    Some(Warning::InverterVoltageTooLow),
    Some(Warning::InverterVoltageTooHigh),
    Some(Warning::OverTemperature),
    Some(Warning::FanLocked),
    Some(Warning::BatteryVoltageHigh),
    Some(Warning::BatteryLowAlarm),
    Some(Warning::Overcharge),
    Some(Warning::BatteryUnderShutdown),
    Some(Warning::BatteryDerating),
    Some(Warning::OverLoad),
    Some(Warning::EepromFault),
    Some(Warning::InverterOverCurrent),
    Some(Warning::InverterSoftFail),
    Some(Warning::SelfTestFail),
    Some(Warning::OutputDcVoltageOver),
    Some(Warning::BatteryOpen),
    Some(Warning::CurrentSensorFail),
    Some(Warning::BatteryShort),
    Some(Warning::PowerLimit),
    Some(Warning::PvVoltageHigh),
    Some(Warning::MpptOverloadFault),
    Some(Warning::MpptOverloadWarning),
    Some(Warning::BatteryTooLowToCharge),
    None,
    None,
];

/// Decode a QPIWS reply
pub fn parse_warnings(reply: &str) -> Result<Warnings, ParseError> {
    let bits = fields::bits(reply.trim())?;
    if bits.len() < WARNING_BITS {
        return Err(ParseError::TooShort {
            reply: "QPIWS",
            len: bits.len(),
        });
    }

    let mut warnings = Warnings::new();
    for (position, _) in bits.iter().enumerate().filter(|(_, set)| **set) {
        match WARNING_TABLE.get(position).copied().flatten() {
            Some(warning) => warnings.insert(warning),
            None => {
                return Err(ParseError::InvalidBit {
                    position,
                    value: '1',
                })
            }
        }
    }
    Ok(warnings)
}

/// Encode the warning set as a QPIWS bit string
pub fn encode_warnings(warnings: &Warnings) -> String {
    WARNING_TABLE
        .iter()
        .map(|slot| match slot {
            Some(w) if warnings.contains(*w) => '1',
            _ => '0',
        })
        .collect()
}

/// Characters used for each mode in QMOD replies
pub fn mode_letter(mode: DeviceMode) -> Option<char> {
    Some(match mode {
        DeviceMode::PowerOn => 'P',
        DeviceMode::Standby => 'S',
        DeviceMode::Bypass => 'Y',
        DeviceMode::Line => 'L',
        DeviceMode::Battery => 'B',
        DeviceMode::BatteryTest => 'T',
        DeviceMode::Fault => 'F',
        DeviceMode::PowerSaving => 'H',
        DeviceMode::Shutdown => 'D',
        DeviceMode::Grid => 'G',
        DeviceMode::Charge => 'C',
        DeviceMode::Eco => 'E',
        DeviceMode::Hybrid => return None,
    })
}
