//! PI18 protocol (InfiniSolar / MPP Solar MAX generation)
//!
//! # Format
//!
//! Inquiries are `^P<len><mnemonic>`, settings `^S<len><mnemonic>`, where
//! `len` is three digits counting the mnemonic, the two CRC bytes and the
//! terminator. Replies are `^D<len><data>` with comma-separated fields:
//!
//! ```text
//! ^D1062300,500,2300,500,0460,0372,009,0521,0522,0000,000,012,100,039,035,000,1250,0000,2500,0000,0,2,1,1,1,2,1,0
//! ```
//!
//! Settings are acknowledged with `^1` and rejected with `^0`.
//!
//! Some firmware reports a rated-information and fault-status length that
//! does not match the documented one, so those two replies are matched on
//! `^D0` and the remaining two length digits are skipped unchecked.

use crate::error::ParseError;
use crate::fields::Fields;
use crate::models::{
    BatteryFlow, BatteryType, ChargerPriority, ConverterFlow, DeviceMode, FaultCode,
    InputVoltageRange, LineFlow, MachineType, MpptStatus, OutputMode, OutputSourcePriority,
    PowerFlow, RatedInformation, SolarPowerPriority, StatusInfo, Topology, Warning, Warnings,
};
use crate::Query;

/// Rated information field count; a trailing 26th field is undocumented
pub const RATED_FIELDS: usize = 25;
pub const STATUS_FIELDS: usize = 28;
/// Fault and warning field count; some firmware appends an undocumented 18th
pub const FAULT_FIELDS: usize = 17;

/// FWS inquiry as inverters answer it; the length digits read 005, not 006
const FAULTS_AND_WARNINGS_COMMAND: &str = "^P005FWS";

/// Build an inquiry frame body
pub fn inquiry(mnemonic: &str) -> String {
    format!("^P{:03}{}", mnemonic.len() + 3, mnemonic)
}

/// Build a setting frame body
pub fn setting(mnemonic: &str) -> String {
    format!("^S{:03}{}", mnemonic.len() + 3, mnemonic)
}

/// Wrap reply data in the `^D<len>` envelope
pub fn reply(data: &str) -> String {
    format!("^D{:03}{}", data.len() + 3, data)
}

/// PI18 inquiry commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pi18Query {
    /// PI: protocol ID (`^D00518`)
    ProtocolId,
    /// ID: series number
    SerialNumber,
    /// VFW: CPU version
    FirmwareVersion,
    /// PIRI: rated information
    RatedInformation,
    /// GS: general status
    GeneralStatus,
    /// MOD: working mode
    Mode,
    /// FWS: fault and warning status
    FaultsAndWarnings,
    /// ET: total generated energy
    TotalEnergy,
}

impl Pi18Query {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Pi18Query::ProtocolId => "PI",
            Pi18Query::SerialNumber => "ID",
            Pi18Query::FirmwareVersion => "VFW",
            Pi18Query::RatedInformation => "PIRI",
            Pi18Query::GeneralStatus => "GS",
            Pi18Query::Mode => "MOD",
            Pi18Query::FaultsAndWarnings => "FWS",
            Pi18Query::TotalEnergy => "ET",
        }
    }

    /// Frame body sent on the wire
    pub fn command(self) -> String {
        match self {
            Pi18Query::FaultsAndWarnings => FAULTS_AND_WARNINGS_COMMAND.to_string(),
            _ => inquiry(self.mnemonic()),
        }
    }

    pub fn query(self) -> Query {
        let command = self.command();
        match self {
            Pi18Query::ProtocolId => Query::new(command, "^D00518"),
            Pi18Query::SerialNumber => Query::new(command, "^D025"),
            Pi18Query::FirmwareVersion => Query::new(command, "^D020"),
            Pi18Query::RatedInformation | Pi18Query::FaultsAndWarnings => {
                Query::new(command, "^D0").skipping(2)
            }
            Pi18Query::GeneralStatus => Query::new(command, "^D106"),
            Pi18Query::Mode => Query::new(command, "^D005"),
            Pi18Query::TotalEnergy => Query::new(command, "^D011"),
        }
    }

    /// Resolve an inquiry frame body back to its query
    pub fn from_command(command: &str) -> Option<Self> {
        [
            Pi18Query::ProtocolId,
            Pi18Query::SerialNumber,
            Pi18Query::FirmwareVersion,
            Pi18Query::RatedInformation,
            Pi18Query::GeneralStatus,
            Pi18Query::Mode,
            Pi18Query::FaultsAndWarnings,
            Pi18Query::TotalEnergy,
        ]
        .into_iter()
        .find(|q| q.command() == command)
    }
}

/// PCP setting for the charger source priority
///
/// PI18 has no utility-first charging, so that priority yields `None`.
pub fn set_charger_priority(priority: ChargerPriority) -> Option<Query> {
    let code = match priority {
        ChargerPriority::SolarFirst => 0,
        ChargerPriority::SolarAndUtility => 1,
        ChargerPriority::OnlySolar => 2,
        ChargerPriority::UtilityFirst => return None,
    };
    Some(Query::new(setting(&format!("PCP0,{code}")), "^"))
}

/// POP setting for the output source priority
pub fn set_output_source_priority(priority: OutputSourcePriority) -> Option<Query> {
    let code = match priority {
        OutputSourcePriority::SolarUtilityBattery => 0,
        OutputSourcePriority::SolarBatteryUtility => 1,
        OutputSourcePriority::Utility => return None,
    };
    Some(Query::new(setting(&format!("POP{code}")), "^"))
}

/// Decode a setting reply with the `^` already stripped
pub fn parse_ack(reply: &str) -> Result<bool, ParseError> {
    match reply.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(ParseError::UnexpectedAck(other.to_string())),
    }
}

/// Decode an ID reply: two digits of length, then the serial number
pub fn parse_serial_number(reply: &str) -> Result<String, ParseError> {
    let too_short = || ParseError::TooShort {
        reply: "ID",
        len: reply.len(),
    };
    let len: usize = reply
        .get(..2)
        .ok_or_else(too_short)?
        .parse()
        .map_err(|_| ParseError::InvalidNumber {
            field: "serial number length",
            value: reply.chars().take(2).collect(),
        })?;
    let serial = reply.get(2..2 + len).ok_or_else(too_short)?;
    if serial.is_empty() {
        return Err(too_short());
    }
    Ok(serial.to_string())
}

const MODES: [DeviceMode; 6] = [
    DeviceMode::PowerOn,
    DeviceMode::Standby,
    DeviceMode::Bypass,
    DeviceMode::Battery,
    DeviceMode::Fault,
    DeviceMode::Hybrid,
];

/// Decode a MOD reply
pub fn parse_mode(reply: &str) -> Result<DeviceMode, ParseError> {
    let code = reply.trim();
    let unknown = || ParseError::UnknownCode {
        field: "device mode",
        code: code.to_string(),
    };
    if code.len() != 2 {
        return Err(unknown());
    }
    code.parse::<usize>()
        .ok()
        .and_then(|i| MODES.get(i).copied())
        .ok_or_else(unknown)
}

/// Two-digit MOD code for a mode, if PI18 can report it
pub fn mode_code(mode: DeviceMode) -> Option<String> {
    MODES
        .iter()
        .position(|m| *m == mode)
        .map(|i| format!("{i:02}"))
}

fn table<T: Copy>(values: &'static [T]) -> impl Fn(&str) -> Option<T> {
    move |token| token.parse::<usize>().ok().and_then(|i| values.get(i).copied())
}

fn battery_type(token: &str) -> Option<BatteryType> {
    table(&[BatteryType::Agm, BatteryType::Flooded, BatteryType::User])(token)
}

fn input_voltage_range(token: &str) -> Option<InputVoltageRange> {
    table(&[InputVoltageRange::Appliance, InputVoltageRange::Ups])(token)
}

fn output_source_priority(token: &str) -> Option<OutputSourcePriority> {
    table(&[
        OutputSourcePriority::SolarUtilityBattery,
        OutputSourcePriority::SolarBatteryUtility,
    ])(token)
}

fn charger_priority(token: &str) -> Option<ChargerPriority> {
    table(&[
        ChargerPriority::SolarFirst,
        ChargerPriority::SolarAndUtility,
        ChargerPriority::OnlySolar,
    ])(token)
}

fn machine_type(token: &str) -> Option<MachineType> {
    table(&[MachineType::OffGrid, MachineType::GridTie])(token)
}

fn topology(token: &str) -> Option<Topology> {
    table(&[Topology::Transformerless, Topology::Transformer])(token)
}

fn output_mode(token: &str) -> Option<OutputMode> {
    table(&[
        OutputMode::Single,
        OutputMode::Parallel,
        OutputMode::Phase1Of3,
        OutputMode::Phase2Of3,
        OutputMode::Phase3Of3,
    ])(token)
}

fn solar_power_priority(token: &str) -> Option<SolarPowerPriority> {
    table(&[
        SolarPowerPriority::BatteryLoadUtility,
        SolarPowerPriority::LoadBatteryUtility,
    ])(token)
}

fn mppt_status(token: &str) -> Option<MpptStatus> {
    table(&[
        MpptStatus::Abnormal,
        MpptStatus::NotCharging,
        MpptStatus::Charging,
    ])(token)
}

fn battery_flow(token: &str) -> Option<BatteryFlow> {
    table(&[
        BatteryFlow::Idle,
        BatteryFlow::Charging,
        BatteryFlow::Discharging,
    ])(token)
}

fn converter_flow(token: &str) -> Option<ConverterFlow> {
    table(&[
        ConverterFlow::Idle,
        ConverterFlow::AcToDc,
        ConverterFlow::DcToAc,
    ])(token)
}

fn line_flow(token: &str) -> Option<LineFlow> {
    table(&[LineFlow::Idle, LineFlow::Importing, LineFlow::Exporting])(token)
}

/// Decode a PIRI reply (envelope and length digits stripped)
pub fn parse_rated_information(reply: &str) -> Result<RatedInformation, ParseError> {
    let f = Fields::comma(reply, "PIRI", RATED_FIELDS..=RATED_FIELDS + 1)?;

    Ok(RatedInformation {
        grid_rating_voltage: f.tenths(0, "grid rating voltage")?,
        grid_rating_current: f.tenths(1, "grid rating current")?,
        ac_output_rating_voltage: f.tenths(2, "AC output rating voltage")?,
        ac_output_rating_frequency: f.tenths(3, "AC output rating frequency")?,
        ac_output_rating_current: f.tenths(4, "AC output rating current")?,
        ac_output_rating_apparent_power: f.number(5, "AC output rating apparent power")?,
        ac_output_rating_active_power: f.number(6, "AC output rating active power")?,
        battery_nominal_voltage: f.tenths(7, "battery rating voltage")?,
        battery_stop_discharging_voltage_with_grid: f.tenths(8, "battery re-charge voltage")?,
        battery_stop_charging_voltage_with_grid: f.tenths(9, "battery re-discharge voltage")?,
        battery_under_voltage: f.tenths(10, "battery under voltage")?,
        battery_bulk_voltage: f.tenths(11, "battery bulk voltage")?,
        battery_float_voltage: f.tenths(12, "battery float voltage")?,
        battery_type: f.code(13, "battery type", battery_type)?,
        max_ac_charging_current: f.number(14, "max AC charging current")?,
        max_charging_current: f.number(15, "max charging current")?,
        input_voltage_range: f.code(16, "input voltage range", input_voltage_range)?,
        output_source_priority: f.code(17, "output source priority", output_source_priority)?,
        charger_source_priority: f.code(18, "charger source priority", charger_priority)?,
        parallel_max_num: f.number(19, "parallel max num")?,
        machine_type: f.code(20, "machine type", machine_type)?,
        topology: f.code(21, "topology", topology)?,
        output_mode: f.code(22, "output mode", output_mode)?,
        solar_power_priority: Some(f.code(23, "solar power priority", solar_power_priority)?),
        mppt_strings: Some(f.number(24, "MPPT strings")?),
        pv_ok_condition: None,
        pv_power_balance: None,
    })
}

/// Decode a GS reply
pub fn parse_status_info(reply: &str) -> Result<StatusInfo, ParseError> {
    let f = Fields::comma(reply, "GS", STATUS_FIELDS..=STATUS_FIELDS)?;

    Ok(StatusInfo {
        grid_voltage: f.tenths(0, "grid voltage")?,
        grid_frequency: f.tenths(1, "grid frequency")?,
        ac_output_voltage: f.tenths(2, "AC output voltage")?,
        ac_output_frequency: f.tenths(3, "AC output frequency")?,
        ac_output_apparent_power: f.number(4, "AC output apparent power")?,
        ac_output_active_power: f.number(5, "AC output active power")?,
        output_load_percent: f.number(6, "output load percent")?,
        battery_voltage: f.tenths(7, "battery voltage")?,
        battery_voltage_from_scc: f.tenths(8, "battery voltage from SCC1")?,
        battery_voltage_from_scc2: Some(f.tenths(9, "battery voltage from SCC2")?),
        battery_discharge_current: f.number(10, "battery discharge current")?,
        battery_charging_current: f.number(11, "battery charging current")?,
        battery_capacity: f.number(12, "battery capacity")?,
        inverter_heat_sink_temperature: f.number(13, "heat sink temperature")?,
        mppt1_charger_temperature: Some(f.number(14, "MPPT1 charger temperature")?),
        mppt2_charger_temperature: Some(f.number(15, "MPPT2 charger temperature")?),
        pv_input_power: f.number(16, "PV1 input power")?,
        pv2_input_power: Some(f.number(17, "PV2 input power")?),
        pv_input_voltage: f.tenths(18, "PV1 input voltage")?,
        pv2_input_voltage: Some(f.tenths(19, "PV2 input voltage")?),
        configuration_changed: Some(f.flag(20, "configuration state")?),
        mppt1_status: Some(f.code(21, "MPPT1 charger status", mppt_status)?),
        mppt2_status: Some(f.code(22, "MPPT2 charger status", mppt_status)?),
        load_connected: f.flag(23, "load connection")?,
        power_flow: Some(PowerFlow {
            battery: f.code(24, "battery power direction", battery_flow)?,
            converter: f.code(25, "DC/AC power direction", converter_flow)?,
            line: f.code(26, "line power direction", line_flow)?,
        }),
        parallel_id: Some(f.number(27, "local parallel id")?),
        ..StatusInfo::default()
    })
}

/// FWS warning flags in field order, after the fault code
const WARNING_FLAGS: [Warning; FAULT_FIELDS - 1] = [
    Warning::LineFail,
    Warning::OutputShortCircuit,
    Warning::OverTemperature,
    Warning::FanLocked,
    Warning::BatteryVoltageHigh,
    Warning::BatteryLowAlarm,
    Warning::BatteryUnderShutdown,
    Warning::OverLoad,
    Warning::EepromFault,
    Warning::PowerLimit,
    Warning::PvVoltageHigh,
    Warning::Pv2VoltageHigh,
    Warning::MpptOverloadWarning,
    Warning::Mppt2OverloadWarning,
    Warning::BatteryTooLowToCharge,
    Warning::Scc2BatteryTooLowToCharge,
];

/// Decode an FWS reply (envelope and length digits stripped)
pub fn parse_warnings(reply: &str) -> Result<Warnings, ParseError> {
    let f = Fields::comma(reply, "FWS", FAULT_FIELDS..=FAULT_FIELDS + 1)?;

    let mut warnings = Warnings::new();
    let code: u8 = f.number(0, "fault code")?;
    if code != 0 {
        let fault = FaultCode::new(code).ok_or(ParseError::UnknownFaultCode(code))?;
        warnings.insert(Warning::Fault(fault));
    }
    for (i, warning) in WARNING_FLAGS.iter().enumerate() {
        if f.flag(i + 1, "warning flag")? {
            warnings.insert(*warning);
        }
    }
    Ok(warnings)
}

/// Encode a warning set as FWS reply data
///
/// Warnings PI18 cannot express are left out.
pub fn encode_warnings(warnings: &Warnings) -> String {
    let code = warnings
        .iter()
        .find_map(|w| match w {
            Warning::Fault(code) => Some(code.code()),
            _ => None,
        })
        .unwrap_or(0);
    let mut out = format!("{code:02}");
    for warning in WARNING_FLAGS {
        out.push(',');
        out.push(if warnings.contains(warning) { '1' } else { '0' });
    }
    out
}

/// Decode an ET reply: total generated energy in kWh
pub fn parse_total_energy(reply: &str) -> Result<u32, ParseError> {
    let value = reply.trim();
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field: "total generated energy",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATED: &str =
        "2300,217,2300,500,217,5000,5000,480,460,540,420,564,540,2,030,060,0,1,0,9,0,0,0,1,2";
    const STATUS: &str = "2300,500,2299,500,0460,0372,009,0521,0522,0000,003,012,100,039,035,000,1250,0000,2500,0000,0,2,1,1,1,2,1,0";

    #[test]
    fn command_builder() {
        assert_eq!(inquiry("PI"), "^P005PI");
        assert_eq!(inquiry("PIRI"), "^P007PIRI");
        assert_eq!(inquiry("MOD"), "^P006MOD");
        assert_eq!(Pi18Query::GeneralStatus.query().command, "^P005GS");
        assert_eq!(Pi18Query::FaultsAndWarnings.query().command, "^P005FWS");
        assert_eq!(Pi18Query::Mode.command(), "^P006MOD");
        assert_eq!(
            set_charger_priority(ChargerPriority::OnlySolar)
                .unwrap()
                .command,
            "^S009PCP0,2"
        );
        assert_eq!(
            set_output_source_priority(OutputSourcePriority::SolarBatteryUtility)
                .unwrap()
                .command,
            "^S007POP1"
        );
        assert!(set_charger_priority(ChargerPriority::UtilityFirst).is_none());
        assert_eq!(reply("03"), "^D00503");
    }

    #[test]
    fn command_lookup() {
        assert_eq!(
            Pi18Query::from_command("^P007PIRI"),
            Some(Pi18Query::RatedInformation)
        );
        assert_eq!(
            Pi18Query::from_command("^P005FWS"),
            Some(Pi18Query::FaultsAndWarnings)
        );
        assert_eq!(Pi18Query::from_command("^P006FWS"), None);
        assert_eq!(Pi18Query::from_command("QPIGS"), None);
        assert_eq!(Pi18Query::from_command("^P005XX"), None);
    }

    #[test]
    fn rated_skip_tolerates_length_quirk() {
        let query = Pi18Query::RatedInformation.query();
        // documented ^D085, some firmware reports ^D089
        assert_eq!(query.strip("^D085230,1"), Some("230,1"));
        assert_eq!(query.strip("^D089230,1"), Some("230,1"));
        assert_eq!(query.strip("^D1"), None);
    }

    #[test]
    fn rated_information() {
        let rated = parse_rated_information(RATED).unwrap();
        assert_eq!(rated.grid_rating_voltage, 230.0);
        assert_eq!(rated.grid_rating_current, 21.7);
        assert_eq!(rated.ac_output_rating_voltage, 230.0);
        assert_eq!(rated.ac_output_rating_frequency, 50.0);
        assert_eq!(rated.ac_output_rating_current, 21.7);
        assert_eq!(rated.ac_output_rating_apparent_power, 5000);
        assert_eq!(rated.ac_output_rating_active_power, 5000);
        assert_eq!(rated.battery_nominal_voltage, 48.0);
        assert_eq!(rated.battery_stop_discharging_voltage_with_grid, 46.0);
        assert_eq!(rated.battery_stop_charging_voltage_with_grid, 54.0);
        assert_eq!(rated.battery_under_voltage, 42.0);
        assert_eq!(rated.battery_bulk_voltage, 56.4);
        assert_eq!(rated.battery_float_voltage, 54.0);
        assert_eq!(rated.battery_type, BatteryType::User);
        assert_eq!(rated.max_ac_charging_current, 30);
        assert_eq!(rated.max_charging_current, 60);
        assert_eq!(rated.input_voltage_range, InputVoltageRange::Appliance);
        assert_eq!(
            rated.output_source_priority,
            OutputSourcePriority::SolarBatteryUtility
        );
        assert_eq!(rated.charger_source_priority, ChargerPriority::SolarFirst);
        assert_eq!(rated.parallel_max_num, 9);
        assert_eq!(rated.machine_type, MachineType::OffGrid);
        assert_eq!(rated.topology, Topology::Transformerless);
        assert_eq!(rated.output_mode, OutputMode::Single);
        assert_eq!(
            rated.solar_power_priority,
            Some(SolarPowerPriority::LoadBatteryUtility)
        );
        assert_eq!(rated.mppt_strings, Some(2));
    }

    #[test]
    fn rated_ignores_trailing_unknown_field() {
        let extended = format!("{RATED},7");
        assert_eq!(
            parse_rated_information(&extended).unwrap(),
            parse_rated_information(RATED).unwrap()
        );
        let too_long = format!("{RATED},7,8");
        assert!(matches!(
            parse_rated_information(&too_long),
            Err(ParseError::FieldCount { actual: 27, .. })
        ));
    }

    #[test]
    fn rated_charger_priority_has_no_utility_code() {
        let reply = RATED.replace(",0,1,0,9,", ",0,1,3,9,");
        assert_eq!(
            parse_rated_information(&reply).unwrap_err(),
            ParseError::UnknownCode {
                field: "charger source priority",
                code: "3".into()
            }
        );
    }

    #[test]
    fn status_scaling() {
        let status = parse_status_info(STATUS).unwrap();
        assert_eq!(status.grid_voltage, 230.0);
        assert_eq!(status.grid_frequency, 50.0);
        assert_eq!(status.ac_output_voltage, 229.9);
        assert_eq!(status.ac_output_frequency, 50.0);
        assert_eq!(status.ac_output_apparent_power, 460);
        assert_eq!(status.ac_output_active_power, 372);
        assert_eq!(status.output_load_percent, 9);
        assert_eq!(status.battery_voltage, 52.1);
        assert_eq!(status.battery_voltage_from_scc, 52.2);
        assert_eq!(status.battery_voltage_from_scc2, Some(0.0));
        assert_eq!(status.battery_discharge_current, 3);
        assert_eq!(status.battery_charging_current, 12);
        assert_eq!(status.battery_capacity, 100);
        assert_eq!(status.inverter_heat_sink_temperature, 39);
        assert_eq!(status.mppt1_charger_temperature, Some(35));
        assert_eq!(status.mppt2_charger_temperature, Some(0));
        assert_eq!(status.pv_input_power, 1250);
        assert_eq!(status.pv2_input_power, Some(0));
        assert_eq!(status.pv_input_voltage, 250.0);
        assert_eq!(status.pv2_input_voltage, Some(0.0));
        assert_eq!(status.configuration_changed, Some(false));
        assert_eq!(status.mppt1_status, Some(MpptStatus::Charging));
        assert_eq!(status.mppt2_status, Some(MpptStatus::NotCharging));
        assert!(status.load_connected);
        assert_eq!(
            status.power_flow,
            Some(PowerFlow {
                battery: BatteryFlow::Charging,
                converter: ConverterFlow::DcToAc,
                line: LineFlow::Importing,
            })
        );
        assert_eq!(status.device_status, None);
        assert_eq!(status.parallel_id, Some(0));
    }

    #[test]
    fn status_parallel_id() {
        let (head, _) = STATUS.rsplit_once(',').unwrap();
        let status = parse_status_info(&format!("{head},2")).unwrap();
        assert_eq!(status.parallel_id, Some(2));
        assert!(parse_status_info(&format!("{head},x")).is_err());
    }

    #[test]
    fn status_wrong_field_count() {
        let short = STATUS.rsplit_once(',').unwrap().0;
        assert_eq!(
            parse_status_info(short).unwrap_err(),
            ParseError::FieldCount {
                reply: "GS",
                expected: STATUS_FIELDS,
                actual: STATUS_FIELDS - 1
            }
        );
    }

    #[test]
    fn modes() {
        assert_eq!(parse_mode("00"), Ok(DeviceMode::PowerOn));
        assert_eq!(parse_mode("03"), Ok(DeviceMode::Battery));
        assert_eq!(parse_mode("05"), Ok(DeviceMode::Hybrid));
        assert_eq!(mode_code(DeviceMode::Fault).as_deref(), Some("04"));
        assert_eq!(mode_code(DeviceMode::Eco), None);
    }

    #[test]
    fn unknown_mode_is_an_error() {
        for code in ["06", "3", "B", ""] {
            assert!(matches!(
                parse_mode(code),
                Err(ParseError::UnknownCode {
                    field: "device mode",
                    ..
                })
            ));
        }
    }

    #[test]
    fn faults_and_warnings() {
        let warnings = parse_warnings("00,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0").unwrap();
        assert!(warnings.is_empty());

        // fault 56, line fail, over load
        let warnings = parse_warnings("56,1,0,0,0,0,0,0,1,0,0,0,0,0,0,0,0").unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.contains(Warning::Fault(FaultCode::new(56).unwrap())));
        assert!(warnings.contains(Warning::LineFail));
        assert!(warnings.contains(Warning::OverLoad));
    }

    #[test]
    fn faults_tolerate_trailing_unknown_field() {
        let warnings = parse_warnings("00,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0").unwrap();
        assert!(warnings.is_empty());

        let warnings = parse_warnings("00,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,5").unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings.contains(Warning::LineFail));

        assert!(matches!(
            parse_warnings("00,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0"),
            Err(ParseError::FieldCount { actual: 19, .. })
        ));
    }

    #[test]
    fn unknown_fault_code_is_an_error() {
        assert_eq!(
            parse_warnings("12,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0"),
            Err(ParseError::UnknownFaultCode(12))
        );
    }

    #[test]
    fn warning_flags_must_be_binary() {
        assert!(matches!(
            parse_warnings("00,0,0,2,0,0,0,0,0,0,0,0,0,0,0,0,0"),
            Err(ParseError::UnknownCode { .. })
        ));
    }

    #[test]
    fn warnings_encode_round_trip() {
        let warnings: Warnings = [
            Warning::Fault(FaultCode::new(1).unwrap()),
            Warning::Scc2BatteryTooLowToCharge,
        ]
        .into_iter()
        .collect();
        let data = encode_warnings(&warnings);
        assert!(data.starts_with("01,"));
        assert_eq!(parse_warnings(&data).unwrap(), warnings);
    }

    #[test]
    fn serial_number() {
        let data = "1496332107101234560000";
        assert_eq!(parse_serial_number(data).unwrap(), "96332107101234");
        assert!(parse_serial_number("9").is_err());
        assert!(parse_serial_number("20123").is_err());
        assert!(parse_serial_number("xx123").is_err());
    }

    #[test]
    fn total_energy_and_ack() {
        assert_eq!(parse_total_energy("00012345"), Ok(12345));
        assert!(parse_total_energy("0001x345").is_err());
        assert_eq!(parse_ack("1"), Ok(true));
        assert_eq!(parse_ack("0"), Ok(false));
        assert!(parse_ack("NAK").is_err());
    }
}
