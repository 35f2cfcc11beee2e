//! Human-readable labels for the domain model
//!
//! These strings are what the poller logs and publishes, so they are kept
//! stable and short.

use std::fmt;

use crate::models::{
    BatteryFlow, BatteryType, ChargerPriority, ConverterFlow, DeviceMode, InputVoltageRange,
    LineFlow, MachineType, MpptStatus, OutputMode, OutputSourcePriority, PvOkCondition,
    PvPowerBalance, SolarPowerPriority, Topology, Warning, Warnings,
};

/// Implements `label()` and `Display` from a variant → text table
macro_rules! labels {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Human-readable label
            pub fn label(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

labels!(DeviceMode {
    PowerOn => "Power on",
    Standby => "Standby",
    Bypass => "Bypass",
    Line => "Line",
    Battery => "Battery",
    BatteryTest => "Battery test",
    Fault => "Fault",
    PowerSaving => "Power saving",
    Shutdown => "Shutdown",
    Grid => "Grid",
    Charge => "Charge",
    Eco => "ECO",
    Hybrid => "Hybrid",
});

labels!(BatteryType {
    Agm => "AGM",
    Flooded => "Flooded",
    User => "User-defined",
    Pyl => "PYL",
    Sh => "SH",
});

labels!(ChargerPriority {
    UtilityFirst => "Utility",
    SolarFirst => "Solar",
    SolarAndUtility => "Solar+Utility",
    OnlySolar => "Solar only",
});

labels!(OutputSourcePriority {
    Utility => "Utility",
    SolarUtilityBattery => "Solar->Utility->Battery",
    SolarBatteryUtility => "Solar->Battery->Utility",
});

labels!(SolarPowerPriority {
    BatteryLoadUtility => "Battery->Load->Utility",
    LoadBatteryUtility => "Load->Battery->Utility",
});

labels!(MachineType {
    GridTie => "Grid tie",
    OffGrid => "Off grid",
    Hybrid => "Hybrid",
});

labels!(Topology {
    Transformerless => "Transformerless",
    Transformer => "Transformer",
});

labels!(InputVoltageRange {
    Appliance => "Appliance",
    Ups => "UPS",
});

labels!(OutputMode {
    Single => "Single",
    Parallel => "Parallel",
    Phase1Of3 => "Phase 1 of 3",
    Phase2Of3 => "Phase 2 of 3",
    Phase3Of3 => "Phase 3 of 3",
});

labels!(MpptStatus {
    Abnormal => "Abnormal",
    NotCharging => "Not charging",
    Charging => "Charging",
});

labels!(BatteryFlow {
    Idle => "Idle",
    Charging => "Charging",
    Discharging => "Discharging",
});

labels!(ConverterFlow {
    Idle => "Idle",
    AcToDc => "AC->DC",
    DcToAc => "DC->AC",
});

labels!(LineFlow {
    Idle => "Idle",
    Importing => "Input",
    Exporting => "Output",
});

labels!(PvOkCondition {
    AnyUnit => "Any unit",
    AllUnits => "All units",
});

labels!(PvPowerBalance {
    ChargeCurrent => "Charge current",
    ChargePlusLoad => "Charge plus load",
});

impl Warning {
    /// Human-readable description
    pub fn label(&self) -> &'static str {
        match self {
            Warning::InverterFault => "Inverter fault",
            Warning::BusOver => "Bus over",
            Warning::BusUnder => "Bus under",
            Warning::BusSoftFail => "Bus soft fail",
            Warning::LineFail => "Line fail",
            Warning::OutputShortCircuit => "Output circuit short",
            Warning::InverterVoltageTooLow => "Inverter voltage too low",
            Warning::InverterVoltageTooHigh => "Inverter voltage too high",
            Warning::OverTemperature => "Over temperature",
            Warning::FanLocked => "Fan locked",
            Warning::BatteryVoltageHigh => "Battery voltage high",
            Warning::BatteryLowAlarm => "Battery low",
            Warning::Overcharge => "Overcharge",
            Warning::BatteryUnderShutdown => "Battery under",
            Warning::BatteryDerating => "Battery derating",
            Warning::OverLoad => "Over load",
            Warning::EepromFault => "Eeprom fail",
            Warning::InverterOverCurrent => "Inverter over current",
            Warning::InverterSoftFail => "Inverter soft fail",
            Warning::SelfTestFail => "Self test fail",
            Warning::OutputDcVoltageOver => "Output DC voltage over",
            Warning::BatteryOpen => "Battery open",
            Warning::CurrentSensorFail => "Current sensor fail",
            Warning::BatteryShort => "Battery short",
            Warning::PowerLimit => "Power limit",
            Warning::PvVoltageHigh => "PV voltage high",
            Warning::Pv2VoltageHigh => "PV2 voltage high",
            Warning::MpptOverloadFault => "MPPT overload fault",
            Warning::MpptOverloadWarning => "MPPT overload warning",
            Warning::Mppt2OverloadWarning => "MPPT2 overload warning",
            Warning::BatteryTooLowToCharge => "Battery too low to charge",
            Warning::Scc2BatteryTooLowToCharge => "Battery too low to charge (SCC2)",
            Warning::Fault(code) => code.description(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Fault(code) => write!(f, "Fault {:02}: {}", code.code(), code.description()),
            other => f.write_str(other.label()),
        }
    }
}

impl fmt::Display for Warnings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        for (i, warning) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{warning}")?;
        }
        Ok(())
    }
}
