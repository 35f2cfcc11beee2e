//! Reply rendering
//!
//! Turns the typed device state into reply data in each protocol's field
//! layout. Envelopes (`(`, `^D<len>`) are added by the inverter.

use pi_protocol::models::{
    BatteryFlow, ConverterFlow, LineFlow, MpptStatus, PowerFlow, PvOkCondition, PvPowerBalance,
    SolarPowerPriority,
};
use pi_protocol::{
    BatteryType, ChargerPriority, DeviceStatusFlags, InputVoltageRange, MachineType, OutputMode,
    OutputSourcePriority, RatedInformation, StatusInfo, Topology,
};

pub(crate) const PI30_BATTERY: [BatteryType; 5] = [
    BatteryType::Agm,
    BatteryType::Flooded,
    BatteryType::User,
    BatteryType::Pyl,
    BatteryType::Sh,
];
pub(crate) const PI30_OUTPUT: [OutputSourcePriority; 3] = [
    OutputSourcePriority::Utility,
    OutputSourcePriority::SolarUtilityBattery,
    OutputSourcePriority::SolarBatteryUtility,
];
pub(crate) const PI30_CHARGER: [ChargerPriority; 4] = [
    ChargerPriority::UtilityFirst,
    ChargerPriority::SolarFirst,
    ChargerPriority::SolarAndUtility,
    ChargerPriority::OnlySolar,
];

pub(crate) const PI18_BATTERY: [BatteryType; 3] =
    [BatteryType::Agm, BatteryType::Flooded, BatteryType::User];
pub(crate) const PI18_OUTPUT: [OutputSourcePriority; 2] = [
    OutputSourcePriority::SolarUtilityBattery,
    OutputSourcePriority::SolarBatteryUtility,
];
pub(crate) const PI18_CHARGER: [ChargerPriority; 3] = [
    ChargerPriority::SolarFirst,
    ChargerPriority::SolarAndUtility,
    ChargerPriority::OnlySolar,
];
const PI18_MACHINE: [MachineType; 2] = [MachineType::OffGrid, MachineType::GridTie];

const INPUT_RANGE: [InputVoltageRange; 2] = [InputVoltageRange::Appliance, InputVoltageRange::Ups];
const TOPOLOGY: [Topology; 2] = [Topology::Transformerless, Topology::Transformer];
const OUTPUT_MODE: [OutputMode; 5] = [
    OutputMode::Single,
    OutputMode::Parallel,
    OutputMode::Phase1Of3,
    OutputMode::Phase2Of3,
    OutputMode::Phase3Of3,
];
const SOLAR_PRIORITY: [SolarPowerPriority; 2] = [
    SolarPowerPriority::BatteryLoadUtility,
    SolarPowerPriority::LoadBatteryUtility,
];
const MPPT_STATUS: [MpptStatus; 3] = [
    MpptStatus::Abnormal,
    MpptStatus::NotCharging,
    MpptStatus::Charging,
];
const BATTERY_FLOW: [BatteryFlow; 3] = [
    BatteryFlow::Idle,
    BatteryFlow::Charging,
    BatteryFlow::Discharging,
];
const CONVERTER_FLOW: [ConverterFlow; 3] = [
    ConverterFlow::Idle,
    ConverterFlow::AcToDc,
    ConverterFlow::DcToAc,
];
const LINE_FLOW: [LineFlow; 3] = [LineFlow::Idle, LineFlow::Importing, LineFlow::Exporting];
const PV_OK: [PvOkCondition; 2] = [PvOkCondition::AnyUnit, PvOkCondition::AllUnits];
const PV_BALANCE: [PvPowerBalance; 2] = [
    PvPowerBalance::ChargeCurrent,
    PvPowerBalance::ChargePlusLoad,
];

/// Wire code of `value`; values a protocol cannot express render as 0
pub(crate) fn code<T: PartialEq>(table: &[T], value: T) -> usize {
    table.iter().position(|v| *v == value).unwrap_or(0)
}

/// Implied-tenths integer form
fn deci(value: f32) -> i32 {
    (value * 10.0).round() as i32
}

fn pi30_machine_type(machine: MachineType) -> &'static str {
    match machine {
        MachineType::GridTie => "00",
        MachineType::OffGrid => "01",
        MachineType::Hybrid => "10",
    }
}

/// QPIRI data, with the PV parallel tokens when the state carries them
pub fn pi30_rated(r: &RatedInformation) -> String {
    let mut data = format!(
        "{:05.1} {:04.1} {:05.1} {:04.1} {:04.1} {:04} {:04} {:04.1} {:04.1} {:04.1} {:04.1} {:04.1} {} {:02} {:03} {} {} {} {} {} {} {} {:04.1}",
        r.grid_rating_voltage,
        r.grid_rating_current,
        r.ac_output_rating_voltage,
        r.ac_output_rating_frequency,
        r.ac_output_rating_current,
        r.ac_output_rating_apparent_power,
        r.ac_output_rating_active_power,
        r.battery_nominal_voltage,
        r.battery_stop_discharging_voltage_with_grid,
        r.battery_under_voltage,
        r.battery_bulk_voltage,
        r.battery_float_voltage,
        code(&PI30_BATTERY, r.battery_type),
        r.max_ac_charging_current,
        r.max_charging_current,
        code(&INPUT_RANGE, r.input_voltage_range),
        code(&PI30_OUTPUT, r.output_source_priority),
        code(&PI30_CHARGER, r.charger_source_priority),
        r.parallel_max_num,
        pi30_machine_type(r.machine_type),
        code(&TOPOLOGY, r.topology),
        code(&OUTPUT_MODE, r.output_mode),
        r.battery_stop_charging_voltage_with_grid,
    );
    // the balance token is positional, so it needs a condition before it
    if r.pv_ok_condition.is_some() || r.pv_power_balance.is_some() {
        let condition = r.pv_ok_condition.unwrap_or(PvOkCondition::AnyUnit);
        data.push_str(&format!(" {}", code(&PV_OK, condition)));
    }
    if let Some(balance) = r.pv_power_balance {
        data.push_str(&format!(" {}", code(&PV_BALANCE, balance)));
    }
    data
}

/// QPIGS data, including the optional trailing fields
pub fn pi30_status(s: &StatusInfo) -> String {
    let flags = s
        .device_status
        .unwrap_or(DeviceStatusFlags(if s.load_connected {
            DeviceStatusFlags::LOAD_ON
        } else {
            0
        }))
        .0;
    let pv_current = if s.pv_input_voltage > 0.0 {
        s.pv_input_power as f32 / s.pv_input_voltage
    } else {
        0.0
    };

    format!(
        "{:05.1} {:04.1} {:05.1} {:04.1} {:04} {:04} {:03} {:03} {:05.2} {:03} {:03} {:04} {:04.1} {:05.1} {:05.2} {:05} {:08b} 00 00 {:05} {:03b}",
        s.grid_voltage,
        s.grid_frequency,
        s.ac_output_voltage,
        s.ac_output_frequency,
        s.ac_output_apparent_power,
        s.ac_output_active_power,
        s.output_load_percent,
        s.bus_voltage.unwrap_or(0),
        s.battery_voltage,
        s.battery_charging_current,
        s.battery_capacity,
        s.inverter_heat_sink_temperature,
        pv_current,
        s.pv_input_voltage,
        s.battery_voltage_from_scc,
        s.battery_discharge_current,
        flags & 0xFF,
        s.pv_input_power,
        (flags >> 8) & 0b111,
    )
}

/// PIRI data
pub fn pi18_rated(r: &RatedInformation) -> String {
    format!(
        "{:04},{:03},{:04},{:03},{:03},{:04},{:04},{:03},{:03},{:03},{:03},{:03},{:03},{},{:03},{:03},{},{},{},{},{},{},{},{},{}",
        deci(r.grid_rating_voltage),
        deci(r.grid_rating_current),
        deci(r.ac_output_rating_voltage),
        deci(r.ac_output_rating_frequency),
        deci(r.ac_output_rating_current),
        r.ac_output_rating_apparent_power,
        r.ac_output_rating_active_power,
        deci(r.battery_nominal_voltage),
        deci(r.battery_stop_discharging_voltage_with_grid),
        deci(r.battery_stop_charging_voltage_with_grid),
        deci(r.battery_under_voltage),
        deci(r.battery_bulk_voltage),
        deci(r.battery_float_voltage),
        code(&PI18_BATTERY, r.battery_type),
        r.max_ac_charging_current,
        r.max_charging_current,
        code(&INPUT_RANGE, r.input_voltage_range),
        code(&PI18_OUTPUT, r.output_source_priority),
        code(&PI18_CHARGER, r.charger_source_priority),
        r.parallel_max_num,
        code(&PI18_MACHINE, r.machine_type),
        code(&TOPOLOGY, r.topology),
        code(&OUTPUT_MODE, r.output_mode),
        code(
            &SOLAR_PRIORITY,
            r.solar_power_priority
                .unwrap_or(SolarPowerPriority::LoadBatteryUtility)
        ),
        r.mppt_strings.unwrap_or(1),
    )
}

/// GS data
pub fn pi18_status(s: &StatusInfo) -> String {
    let flow = s.power_flow.unwrap_or(PowerFlow {
        battery: BatteryFlow::Idle,
        converter: ConverterFlow::Idle,
        line: LineFlow::Idle,
    });

    format!(
        "{:04},{:03},{:04},{:03},{:04},{:04},{:03},{:03},{:03},{:03},{:03},{:03},{:03},{:03},{:03},{:03},{:04},{:04},{:04},{:04},{},{},{},{},{},{},{},{}",
        deci(s.grid_voltage),
        deci(s.grid_frequency),
        deci(s.ac_output_voltage),
        deci(s.ac_output_frequency),
        s.ac_output_apparent_power,
        s.ac_output_active_power,
        s.output_load_percent,
        deci(s.battery_voltage),
        deci(s.battery_voltage_from_scc),
        deci(s.battery_voltage_from_scc2.unwrap_or(0.0)),
        s.battery_discharge_current,
        s.battery_charging_current,
        s.battery_capacity,
        s.inverter_heat_sink_temperature,
        s.mppt1_charger_temperature.unwrap_or(0),
        s.mppt2_charger_temperature.unwrap_or(0),
        s.pv_input_power,
        s.pv2_input_power.unwrap_or(0),
        deci(s.pv_input_voltage),
        deci(s.pv2_input_voltage.unwrap_or(0.0)),
        u8::from(s.configuration_changed.unwrap_or(false)),
        code(&MPPT_STATUS, s.mppt1_status.unwrap_or(MpptStatus::NotCharging)),
        code(&MPPT_STATUS, s.mppt2_status.unwrap_or(MpptStatus::NotCharging)),
        u8::from(s.load_connected),
        code(&BATTERY_FLOW, flow.battery),
        code(&CONVERTER_FLOW, flow.converter),
        code(&LINE_FLOW, flow.line),
        s.parallel_id.unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pi_protocol::{pi18, pi30};

    #[test]
    fn deci_rounds_to_nearest_tenth() {
        assert_eq!(deci(52.1), 521);
        assert_eq!(deci(230.0), 2300);
        assert_eq!(deci(-0.5), -5);
    }

    #[test]
    fn unrepresentable_values_render_as_zero() {
        assert_eq!(code(&PI18_CHARGER, ChargerPriority::UtilityFirst), 0);
        assert_eq!(code(&PI30_CHARGER, ChargerPriority::OnlySolar), 3);
    }

    #[test]
    fn pi30_status_layout() {
        let status = crate::inverter::sample_status(pi_protocol::Protocol::Pi30);
        let data = pi30_status(&status);
        assert_eq!(data.split(' ').count(), 21);
        assert_eq!(pi30::parse_status_info(&data).unwrap(), status);
    }

    #[test]
    fn pi18_status_layout() {
        let status = crate::inverter::sample_status(pi_protocol::Protocol::Pi18);
        let data = pi18_status(&status);
        // documented GS length: 103 data bytes behind `^D106`
        assert_eq!(data.len(), 103);
        assert_eq!(pi18::parse_status_info(&data).unwrap(), status);
    }

    #[test]
    fn rated_layouts() {
        let rated = crate::inverter::sample_rated(pi_protocol::Protocol::Pi30);
        assert_eq!(pi30::parse_rated_information(&pi30_rated(&rated)).unwrap(), rated);

        let rated = crate::inverter::sample_rated(pi_protocol::Protocol::Pi18);
        assert_eq!(pi18::parse_rated_information(&pi18_rated(&rated)).unwrap(), rated);
    }

    #[test]
    fn pi30_rated_pv_tokens_are_optional() {
        let mut rated = crate::inverter::sample_rated(pi_protocol::Protocol::Pi30);
        assert!(pi30_rated(&rated).ends_with(" 54.0 0 1"));

        rated.pv_ok_condition = None;
        rated.pv_power_balance = None;
        let data = pi30_rated(&rated);
        assert_eq!(data.split(' ').count(), pi30::RATED_FIELDS);
        assert_eq!(pi30::parse_rated_information(&data).unwrap(), rated);
    }
}
