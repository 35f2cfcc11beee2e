//! Shared inverter domain model
//!
//! Every protocol adapter decodes its replies into these types. Values are
//! built fresh from a single reply and never merged with an earlier one.

use std::collections::BTreeSet;

/// Operating state of the inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceMode {
    PowerOn,
    Standby,
    Bypass,
    Line,
    Battery,
    BatteryTest,
    Fault,
    PowerSaving,
    Shutdown,
    Grid,
    Charge,
    Eco,
    /// Line and battery together (PI18 "hybrid" / grid mode)
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryType {
    Agm,
    Flooded,
    User,
    /// Pylontech lithium (remote panel protocol)
    Pyl,
    /// Shoto lithium (remote panel protocol)
    Sh,
}

/// Which source is allowed to charge the battery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChargerPriority {
    UtilityFirst,
    SolarFirst,
    SolarAndUtility,
    OnlySolar,
}

/// Which source feeds the AC output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputSourcePriority {
    Utility,
    SolarUtilityBattery,
    SolarBatteryUtility,
}

/// Where surplus solar power goes first (PI18 only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolarPowerPriority {
    BatteryLoadUtility,
    LoadBatteryUtility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MachineType {
    GridTie,
    OffGrid,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Topology {
    Transformerless,
    Transformer,
}

/// Accepted AC input window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InputVoltageRange {
    /// Wide window (90-280 V)
    Appliance,
    /// Narrow window (170-280 V)
    Ups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputMode {
    Single,
    Parallel,
    Phase1Of3,
    Phase2Of3,
    Phase3Of3,
}

/// When a parallel system treats PV as available (PI30)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PvOkCondition {
    /// One unit with PV connected is enough
    AnyUnit,
    /// Every unit must have PV connected
    AllUnits,
}

/// How PV input power is capped (PI30)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PvPowerBalance {
    /// PV input current is limited to the max charging current
    ChargeCurrent,
    /// PV input power may cover charging plus the load
    ChargePlusLoad,
}

/// MPPT charger state reported in PI18 general status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MpptStatus {
    Abnormal,
    NotCharging,
    Charging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryFlow {
    Idle,
    Charging,
    Discharging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConverterFlow {
    Idle,
    AcToDc,
    DcToAc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineFlow {
    Idle,
    Importing,
    Exporting,
}

/// Power flow directions from PI18 general status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PowerFlow {
    pub battery: BatteryFlow,
    pub converter: ConverterFlow,
    pub line: LineFlow,
}

/// PI30 device status bits `b7..b0` (plus `b10..b8` on newer firmware)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatusFlags(pub u16);

impl DeviceStatusFlags {
    pub const AC_CHARGING: u16 = 1 << 0;
    pub const SCC_CHARGING: u16 = 1 << 1;
    pub const CHARGING: u16 = 1 << 2;
    pub const BATTERY_VOLTAGE_STEADY: u16 = 1 << 3;
    pub const LOAD_ON: u16 = 1 << 4;
    pub const SCC_FIRMWARE_UPDATED: u16 = 1 << 5;
    pub const CONFIGURATION_CHANGED: u16 = 1 << 6;
    pub const SBU_PRIORITY_VERSION: u16 = 1 << 7;
    pub const DUSTPROOF_INSTALLED: u16 = 1 << 8;
    pub const SWITCHED_ON: u16 = 1 << 9;
    pub const FLOAT_CHARGING: u16 = 1 << 10;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn load_on(self) -> bool {
        self.contains(Self::LOAD_ON)
    }

    pub fn charging(self) -> bool {
        self.contains(Self::CHARGING)
    }
}

/// Instantaneous electrical and thermal readings
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusInfo {
    /// Volts
    pub grid_voltage: f32,
    /// Hertz
    pub grid_frequency: f32,
    /// Volts
    pub ac_output_voltage: f32,
    /// Hertz
    pub ac_output_frequency: f32,
    /// VA
    pub ac_output_apparent_power: u32,
    /// Watts
    pub ac_output_active_power: u32,
    /// Maximum of W% and VA%
    pub output_load_percent: u32,

    /// Volts
    pub battery_voltage: f32,
    /// Battery voltage as seen by the solar charge controller, volts
    pub battery_voltage_from_scc: f32,
    pub battery_voltage_from_scc2: Option<f32>,
    /// Amps
    pub battery_charging_current: u32,
    /// Amps
    pub battery_discharge_current: u32,
    /// Percent
    pub battery_capacity: u32,

    /// Volts
    pub pv_input_voltage: f32,
    /// Watts
    pub pv_input_power: u32,
    pub pv2_input_voltage: Option<f32>,
    pub pv2_input_power: Option<u32>,
    /// DC bus voltage between PV and inverter stage, volts
    pub bus_voltage: Option<u32>,

    /// Celsius
    pub inverter_heat_sink_temperature: i32,
    pub mppt1_charger_temperature: Option<i32>,
    pub mppt2_charger_temperature: Option<i32>,
    pub mppt1_status: Option<MpptStatus>,
    pub mppt2_status: Option<MpptStatus>,

    pub load_connected: bool,
    pub configuration_changed: Option<bool>,
    pub power_flow: Option<PowerFlow>,
    /// Raw device status bits (PI30)
    pub device_status: Option<DeviceStatusFlags>,
    /// Local id within a parallel system (PI18)
    pub parallel_id: Option<u32>,
}

/// Nameplate and configuration values
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatedInformation {
    /// Volts
    pub grid_rating_voltage: f32,
    /// Amps
    pub grid_rating_current: f32,
    /// Volts
    pub ac_output_rating_voltage: f32,
    /// Hertz
    pub ac_output_rating_frequency: f32,
    /// Amps
    pub ac_output_rating_current: f32,
    /// VA
    pub ac_output_rating_apparent_power: u32,
    /// Watts
    pub ac_output_rating_active_power: u32,

    pub battery_type: BatteryType,
    /// Voltage the battery bank is designed to operate at
    pub battery_nominal_voltage: f32,
    /// Battery recharge voltage: stop discharging when grid is available
    pub battery_stop_discharging_voltage_with_grid: f32,
    /// Battery re-discharge voltage: stop charging when grid is available
    pub battery_stop_charging_voltage_with_grid: f32,
    /// Cut-off voltage protecting the battery from over-discharge
    pub battery_under_voltage: f32,
    /// Constant-current (bulk) charging voltage
    pub battery_bulk_voltage: f32,
    /// Float charging voltage
    pub battery_float_voltage: f32,

    /// Amps
    pub max_ac_charging_current: u32,
    /// Amps
    pub max_charging_current: u32,
    pub input_voltage_range: InputVoltageRange,
    pub output_source_priority: OutputSourcePriority,
    pub charger_source_priority: ChargerPriority,
    pub parallel_max_num: u32,
    pub machine_type: MachineType,
    pub topology: Topology,
    pub output_mode: OutputMode,

    pub solar_power_priority: Option<SolarPowerPriority>,
    pub mppt_strings: Option<u32>,
    pub pv_ok_condition: Option<PvOkCondition>,
    pub pv_power_balance: Option<PvPowerBalance>,
}

/// Numeric fault code reported by PI18 firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultCode(u8);

const FAULT_TABLE: &[(u8, &str)] = &[
    (1, "Fan is locked"),
    (2, "Over temperature"),
    (3, "Battery voltage is too high"),
    (4, "Battery voltage is too low"),
    (5, "Output short circuited or Over temperature"),
    (6, "Output voltage is too high"),
    (7, "Over load time out"),
    (8, "Bus voltage is too high"),
    (9, "Bus soft start failed"),
    (11, "Main relay failed"),
    (51, "Over current inverter"),
    (52, "Bus soft start failed"),
    (53, "Inverter soft start failed"),
    (54, "Self-test failed"),
    (55, "Over DC voltage on output of inverter"),
    (56, "Battery connection is open"),
    (57, "Current sensor failed"),
    (58, "Output voltage is too low"),
    (60, "Inverter negative power"),
    (71, "Parallel version different"),
    (72, "Output circuit failed"),
    (80, "CAN communication failed"),
    (81, "Parallel host line lost"),
    (82, "Parallel synchronized signal lost"),
    (83, "Parallel battery voltage detect different"),
    (84, "Parallel Line voltage or frequency detect different"),
    (85, "Parallel Line input current unbalanced"),
    (86, "Parallel output setting different"),
];

impl FaultCode {
    /// Look up a fault code, `None` if the firmware table does not define it
    pub fn new(code: u8) -> Option<Self> {
        FAULT_TABLE
            .iter()
            .any(|(c, _)| *c == code)
            .then_some(Self(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        FAULT_TABLE
            .iter()
            .find(|(c, _)| *c == self.0)
            .map(|(_, d)| *d)
            .unwrap_or("Unknown fault")
    }
}

/// A named warning or fault condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Warning {
    InverterFault,
    BusOver,
    BusUnder,
    BusSoftFail,
    LineFail,
    OutputShortCircuit,
    InverterVoltageTooLow,
    InverterVoltageTooHigh,
    OverTemperature,
    FanLocked,
    BatteryVoltageHigh,
    BatteryLowAlarm,
    Overcharge,
    BatteryUnderShutdown,
    BatteryDerating,
    OverLoad,
    EepromFault,
    InverterOverCurrent,
    InverterSoftFail,
    SelfTestFail,
    OutputDcVoltageOver,
    BatteryOpen,
    CurrentSensorFail,
    BatteryShort,
    PowerLimit,
    PvVoltageHigh,
    Pv2VoltageHigh,
    MpptOverloadFault,
    MpptOverloadWarning,
    Mppt2OverloadWarning,
    BatteryTooLowToCharge,
    Scc2BatteryTooLowToCharge,
    /// Active fault code
    Fault(FaultCode),
}

/// Set of active warnings; empty means none
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Warnings(BTreeSet<Warning>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, warning: Warning) {
        self.0.insert(warning);
    }

    pub fn contains(&self, warning: Warning) -> bool {
        self.0.contains(&warning)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.0.iter()
    }
}

impl FromIterator<Warning> for Warnings {
    fn from_iter<I: IntoIterator<Item = Warning>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
