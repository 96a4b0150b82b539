use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    /// Runtime follows the spread between remote sensor temperatures.
    Delta,
    /// Runtime follows occupancy.
    Occupancy,
}

impl FanMode {
    /// Matches on the first three letters, so `delta`, `DEL` and `occupied` all parse.
    pub fn from_prefix(value: &str) -> Option<Self> {
        let lower = value.trim().to_ascii_lowercase();
        if lower.starts_with("del") {
            Some(Self::Delta)
        } else if lower.starts_with("occ") {
            Some(Self::Occupancy)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumidifierMode {
    Off,
    Manual,
    Auto,
}

impl HumidifierMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacklightMode {
    On,
    Off,
}

impl BacklightMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklightSettings {
    pub off_during_sleep: bool,
    pub off_time: u32,
    pub sleep_intensity: u8,
    pub on_intensity: u8,
}

impl BacklightSettings {
    pub const OFF: Self = Self {
        off_during_sleep: true,
        off_time: 0,
        sleep_intensity: 0,
        on_intensity: 0,
    };

    /// Used to turn the display back on when no user profile was ever captured.
    pub const DEFAULT_ON: Self = Self {
        off_during_sleep: false,
        off_time: 20,
        sleep_intensity: 1,
        on_intensity: 9,
    };

    pub fn mode(&self) -> BacklightMode {
        if *self == Self::OFF {
            BacklightMode::Off
        } else {
            BacklightMode::On
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlTargets {
    pub humidity_setpoint: u8,
    pub fan_min_runtime_minutes: u32,
    pub humidifier_mode: HumidifierMode,
    pub backlight_mode: BacklightMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    SetFanMinOnTime(u32),
    SetBacklight(BacklightMode),
    SetHumidity(u8),
    SetHumidifierMode(HumidifierMode),
}
