use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::types::{BacklightSettings, HumidifierMode};

/// Settings currently programmed on the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSettings {
    pub humidity_setpoint: Option<u8>,
    pub humidifier_mode: HumidifierMode,
    pub fan_min_on_time: u32,
    pub backlight: BacklightSettings,
}

/// Everything one control cycle decides on. Rebuilt every cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub inside_temp_f: f64,
    pub desired_heat_temp_f: f64,
    pub inside_humidity: f64,
    /// Active equipment, e.g. `fan`, `auxHeat1`.
    pub equipment: BTreeSet<String>,
    pub occupied: bool,
    pub outside_temp_f: f64,
    pub outside_temp_next_hour_f: f64,
    pub future_target_temp_f: f64,
    pub sensor_temps: BTreeMap<String, f64>,
    pub device: DeviceSettings,
}
