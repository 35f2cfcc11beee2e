//! Readings derived from poll results
//!
//! Every value the poller publishes is a [`Reading`]: a stable entity name
//! (`Grid_voltage`, `PV_watts`, ...), the kind of quantity it is and its
//! rendered value. Both sinks consume the same readings, so the log output
//! and the Home Assistant entities always agree.

use pi_protocol::{ChargerPriority, OutputSourcePriority, Protocol, RatedInformation, StatusInfo};

use crate::poller::{PollEvent, SetRequest};

/// Physical quantity of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Voltage,
    Current,
    Frequency,
    Power,
    ApparentPower,
    Energy,
    Percent,
    Temperature,
    Battery,
    /// Text or enumerated value
    None,
}

impl Kind {
    /// Home Assistant device class
    pub fn device_class(self) -> Option<&'static str> {
        match self {
            Kind::Voltage => Some("voltage"),
            Kind::Current => Some("current"),
            Kind::Frequency => Some("frequency"),
            Kind::Power => Some("power"),
            Kind::ApparentPower => Some("apparent_power"),
            Kind::Energy => Some("energy"),
            Kind::Temperature => Some("temperature"),
            Kind::Battery => Some("battery"),
            Kind::Percent | Kind::None => None,
        }
    }

    pub fn unit(self) -> Option<&'static str> {
        match self {
            Kind::Voltage => Some("V"),
            Kind::Current => Some("A"),
            Kind::Frequency => Some("Hz"),
            Kind::Power => Some("W"),
            Kind::ApparentPower => Some("VA"),
            Kind::Energy => Some("kWh"),
            Kind::Percent | Kind::Battery => Some("%"),
            Kind::Temperature => Some("°C"),
            Kind::None => None,
        }
    }

    /// Numeric readings are charted rather than shown as discrete states
    pub fn is_measurement(self) -> bool {
        self != Kind::None
    }
}

/// A setting that can be changed from Home Assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    ChargerPriority,
    OutputSourcePriority,
}

impl Setting {
    pub const ALL: [Setting; 2] = [Setting::ChargerPriority, Setting::OutputSourcePriority];

    /// Entity name of the setting
    pub fn name(self) -> &'static str {
        match self {
            Setting::ChargerPriority => "Charger_source_priority",
            Setting::OutputSourcePriority => "Output_source_priority",
        }
    }

    /// Labels of the values `protocol` can set
    pub fn options(self, protocol: Protocol) -> Vec<&'static str> {
        match self {
            Setting::ChargerPriority => charger_options(protocol)
                .iter()
                .map(|p| p.label())
                .collect(),
            Setting::OutputSourcePriority => output_options(protocol)
                .iter()
                .map(|p| p.label())
                .collect(),
        }
    }

    /// Turn a selected option label back into a set request
    pub fn request(self, protocol: Protocol, label: &str) -> Option<SetRequest> {
        let label = label.trim();
        match self {
            Setting::ChargerPriority => charger_options(protocol)
                .iter()
                .find(|p| p.label() == label)
                .map(|&p| SetRequest::ChargerPriority(p)),
            Setting::OutputSourcePriority => output_options(protocol)
                .iter()
                .find(|p| p.label() == label)
                .map(|&p| SetRequest::OutputSourcePriority(p)),
        }
    }
}

fn charger_options(protocol: Protocol) -> &'static [ChargerPriority] {
    match protocol {
        Protocol::Pi18 => &[
            ChargerPriority::SolarFirst,
            ChargerPriority::SolarAndUtility,
            ChargerPriority::OnlySolar,
        ],
        _ => &[
            ChargerPriority::UtilityFirst,
            ChargerPriority::SolarFirst,
            ChargerPriority::SolarAndUtility,
            ChargerPriority::OnlySolar,
        ],
    }
}

fn output_options(protocol: Protocol) -> &'static [OutputSourcePriority] {
    match protocol {
        Protocol::Pi18 => &[
            OutputSourcePriority::SolarUtilityBattery,
            OutputSourcePriority::SolarBatteryUtility,
        ],
        _ => &[
            OutputSourcePriority::Utility,
            OutputSourcePriority::SolarUtilityBattery,
            OutputSourcePriority::SolarBatteryUtility,
        ],
    }
}

/// One published value
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Entity name, underscores for spaces
    pub name: &'static str,
    pub kind: Kind,
    /// Material Design icon name, without the `mdi:` prefix
    pub icon: Option<&'static str>,
    /// Set when the reading is a selectable setting
    pub setting: Option<Setting>,
    pub value: String,
}

impl Reading {
    fn new(name: &'static str, kind: Kind, value: String) -> Self {
        Self {
            name,
            kind,
            icon: None,
            setting: None,
            value,
        }
    }

    fn icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    /// Display name, underscores replaced by spaces
    pub fn label(&self) -> String {
        self.name.replace('_', " ")
    }
}

/// Installation-specific corrections applied before publishing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub amperage: f32,
    pub watt: f32,
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            amperage: 1.0,
            watt: 1.0,
        }
    }
}

impl Scale {
    fn amps(&self, value: u32) -> String {
        scaled(value, self.amperage)
    }

    fn watts(&self, value: u32) -> String {
        scaled(value, self.watt)
    }
}

fn scaled(value: u32, factor: f32) -> String {
    format!("{}", (value as f32 * factor).round() as i64)
}

fn tenths(value: f32) -> String {
    format!("{value:.1}")
}

fn ac_voltage(name: &'static str, value: f32) -> Reading {
    Reading::new(name, Kind::Voltage, tenths(value))
}

fn dc_voltage(name: &'static str, value: f32) -> Reading {
    Reading::new(name, Kind::Voltage, tenths(value)).icon("current-dc")
}

fn frequency(name: &'static str, value: f32) -> Reading {
    Reading::new(name, Kind::Frequency, tenths(value))
}

fn temperature(name: &'static str, value: i32) -> Reading {
    Reading::new(name, Kind::Temperature, value.to_string())
}

/// Readings carried by one poll event
pub fn readings(event: &PollEvent, scale: &Scale) -> Vec<Reading> {
    match event {
        PollEvent::Mode(mode) => vec![Reading::new("Mode", Kind::None, mode.to_string())],
        PollEvent::Rated(rated) => rated_readings(rated),
        PollEvent::Status(status) => status_readings(status, scale),
        PollEvent::Warnings(warnings) => {
            vec![Reading::new("Warnings", Kind::None, warnings.to_string()).icon("alert")]
        }
        PollEvent::TotalEnergy(kwh) => vec![Reading::new(
            "PV_total_generated_energy",
            Kind::Energy,
            kwh.to_string(),
        )],
    }
}

fn rated_readings(r: &RatedInformation) -> Vec<Reading> {
    let mut out = vec![
        dc_voltage("Battery_nominal_voltage", r.battery_nominal_voltage),
        dc_voltage("Battery_under_voltage", r.battery_under_voltage),
        dc_voltage("Battery_float_voltage", r.battery_float_voltage),
        dc_voltage("Battery_bulk_voltage", r.battery_bulk_voltage),
        dc_voltage(
            "Battery_stop_discharging_voltage_with_grid",
            r.battery_stop_discharging_voltage_with_grid,
        ),
        dc_voltage(
            "Battery_stop_charging_voltage_with_grid",
            r.battery_stop_charging_voltage_with_grid,
        ),
        Reading::new("Battery_type", Kind::None, r.battery_type.to_string()).icon("car-battery"),
        Reading::new(
            "AC_input_voltage_range",
            Kind::None,
            r.input_voltage_range.to_string(),
        )
        .icon("sine-wave"),
        Reading {
            setting: Some(Setting::OutputSourcePriority),
            ..Reading::new(
                Setting::OutputSourcePriority.name(),
                Kind::None,
                r.output_source_priority.to_string(),
            )
        },
        Reading {
            setting: Some(Setting::ChargerPriority),
            ..Reading::new(
                Setting::ChargerPriority.name(),
                Kind::None,
                r.charger_source_priority.to_string(),
            )
        },
        Reading::new("Machine_type", Kind::None, r.machine_type.to_string()),
    ];
    if let Some(priority) = r.solar_power_priority {
        out.push(Reading::new(
            "Solar_power_priority",
            Kind::None,
            priority.to_string(),
        ));
    }
    out
}

fn status_readings(s: &StatusInfo, scale: &Scale) -> Vec<Reading> {
    let mut out = vec![
        ac_voltage("Grid_voltage", s.grid_voltage),
        frequency("Grid_frequency", s.grid_frequency),
        ac_voltage("Output_voltage", s.ac_output_voltage),
        frequency("Output_frequency", s.ac_output_frequency),
        Reading::new(
            "Output_apparent_power",
            Kind::ApparentPower,
            scale.watts(s.ac_output_apparent_power),
        ),
        Reading::new(
            "Output_active_power",
            Kind::Power,
            scale.watts(s.ac_output_active_power),
        ),
        Reading::new(
            "Output_load_percent",
            Kind::Percent,
            s.output_load_percent.to_string(),
        )
        .icon("percent"),
        dc_voltage("Battery_voltage", s.battery_voltage),
        dc_voltage("Battery_voltage_from_SCC", s.battery_voltage_from_scc),
        Reading::new(
            "Battery_charge_current",
            Kind::Current,
            scale.amps(s.battery_charging_current),
        )
        .icon("current-dc"),
        Reading::new(
            "Battery_discharge_current",
            Kind::Current,
            scale.amps(s.battery_discharge_current),
        )
        .icon("current-dc"),
        Reading::new(
            "Battery_capacity",
            Kind::Battery,
            s.battery_capacity.to_string(),
        ),
        temperature("Heatsink_temperature", s.inverter_heat_sink_temperature),
        dc_voltage("PV_voltage", s.pv_input_voltage),
        Reading::new("PV_watts", Kind::Power, scale.watts(s.pv_input_power)),
    ];

    if let Some(v) = s.battery_voltage_from_scc2 {
        out.push(dc_voltage("Battery_voltage_from_SCC2", v));
    }
    if let Some(v) = s.pv2_input_voltage {
        out.push(dc_voltage("PV2_voltage", v));
    }
    if let Some(w) = s.pv2_input_power {
        out.push(Reading::new("PV2_watts", Kind::Power, scale.watts(w)));
    }
    if let Some(v) = s.bus_voltage {
        out.push(Reading::new("PV_bus_voltage", Kind::Voltage, v.to_string()).icon("current-dc"));
    }
    if let Some(t) = s.mppt1_charger_temperature {
        out.push(temperature("Mptt1_charger_temperature", t));
    }
    if let Some(t) = s.mppt2_charger_temperature {
        out.push(temperature("Mptt2_charger_temperature", t));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pi_protocol::{DeviceMode, Warning, Warnings};

    fn find<'a>(readings: &'a [Reading], name: &str) -> &'a Reading {
        readings
            .iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("no reading named {name}"))
    }

    fn status() -> StatusInfo {
        StatusInfo {
            grid_voltage: 230.04,
            grid_frequency: 49.96,
            ac_output_voltage: 229.9,
            ac_output_frequency: 50.0,
            ac_output_apparent_power: 460,
            ac_output_active_power: 410,
            output_load_percent: 9,
            battery_voltage: 52.1,
            battery_voltage_from_scc: 52.0,
            battery_charging_current: 10,
            battery_discharge_current: 3,
            battery_capacity: 87,
            pv_input_voltage: 310.5,
            pv_input_power: 1203,
            inverter_heat_sink_temperature: 41,
            ..StatusInfo::default()
        }
    }

    #[test]
    fn status_values_are_rendered() {
        let readings = readings(&PollEvent::Status(status()), &Scale::default());

        assert_eq!(find(&readings, "Grid_voltage").value, "230.0");
        assert_eq!(find(&readings, "Grid_frequency").value, "50.0");
        assert_eq!(find(&readings, "Battery_voltage").value, "52.1");
        assert_eq!(find(&readings, "PV_watts").value, "1203");
        assert_eq!(find(&readings, "Heatsink_temperature").value, "41");
        assert_eq!(find(&readings, "Battery_capacity").kind, Kind::Battery);
        // PI30 has no second string
        assert!(readings.iter().all(|r| r.name != "PV2_watts"));
    }

    #[test]
    fn currents_and_powers_are_scaled() {
        let scale = Scale {
            amperage: 2.0,
            watt: 1.5,
        };
        let readings = readings(&PollEvent::Status(status()), &scale);

        assert_eq!(find(&readings, "Battery_charge_current").value, "20");
        assert_eq!(find(&readings, "Battery_discharge_current").value, "6");
        assert_eq!(find(&readings, "Output_active_power").value, "615");
        assert_eq!(find(&readings, "Output_apparent_power").value, "690");
        assert_eq!(find(&readings, "PV_watts").value, "1805");
        // voltages are untouched
        assert_eq!(find(&readings, "Battery_voltage").value, "52.1");
    }

    #[test]
    fn optional_pi18_fields_add_readings() {
        let status = StatusInfo {
            pv2_input_voltage: Some(120.0),
            pv2_input_power: Some(300),
            mppt1_charger_temperature: Some(35),
            ..status()
        };
        let readings = readings(&PollEvent::Status(status), &Scale::default());
        assert_eq!(find(&readings, "PV2_voltage").value, "120.0");
        assert_eq!(find(&readings, "PV2_watts").value, "300");
        assert_eq!(find(&readings, "Mptt1_charger_temperature").value, "35");
    }

    #[test]
    fn mode_and_warnings() {
        let mode = readings(&PollEvent::Mode(DeviceMode::Battery), &Scale::default());
        assert_eq!(mode[0].name, "Mode");
        assert_eq!(mode[0].value, "Battery");

        let warnings: Warnings = [Warning::LineFail].into_iter().collect();
        let warnings = readings(&PollEvent::Warnings(warnings), &Scale::default());
        assert_eq!(warnings[0].icon, Some("alert"));
        assert_eq!(warnings[0].value, Warning::LineFail.to_string());

        let none = readings(&PollEvent::Warnings(Warnings::new()), &Scale::default());
        assert_eq!(none[0].value, "None");
    }

    #[test]
    fn kinds_map_to_classes_and_units() {
        assert_eq!(Kind::Voltage.device_class(), Some("voltage"));
        assert_eq!(Kind::Temperature.unit(), Some("°C"));
        assert_eq!(Kind::Percent.device_class(), None);
        assert_eq!(Kind::Percent.unit(), Some("%"));
        assert!(Kind::Percent.is_measurement());
        assert!(!Kind::None.is_measurement());
        assert_eq!(Kind::None.unit(), None);
    }

    #[test]
    fn setting_options_follow_protocol() {
        assert_eq!(
            Setting::ChargerPriority.options(Protocol::Pi30),
            ["Utility", "Solar", "Solar+Utility", "Solar only"]
        );
        assert_eq!(
            Setting::ChargerPriority.options(Protocol::Pi18),
            ["Solar", "Solar+Utility", "Solar only"]
        );
        assert_eq!(Setting::OutputSourcePriority.options(Protocol::Pi18).len(), 2);
    }

    #[test]
    fn selected_labels_become_requests() {
        assert_eq!(
            Setting::ChargerPriority.request(Protocol::Pi30, "Solar+Utility"),
            Some(SetRequest::ChargerPriority(ChargerPriority::SolarAndUtility))
        );
        assert_eq!(
            Setting::OutputSourcePriority.request(Protocol::Pi30, "Utility\n"),
            Some(SetRequest::OutputSourcePriority(OutputSourcePriority::Utility))
        );
        // PI18 cannot charge from utility alone
        assert_eq!(Setting::ChargerPriority.request(Protocol::Pi18, "Utility"), None);
        assert_eq!(Setting::ChargerPriority.request(Protocol::Pi30, "bogus"), None);
    }

    #[test]
    fn labels_replace_underscores() {
        let r = Reading::new("Battery_voltage_from_SCC", Kind::Voltage, "1".into());
        assert_eq!(r.label(), "Battery voltage from SCC");
    }
}
