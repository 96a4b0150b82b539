use serde::{Deserialize, Serialize};

use crate::fan::{FanBand, FanCurve};
use crate::types::FanMode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanConfig {
    pub mode: FanMode,
    pub occupied_minutes: u32,
    pub away_minutes: u32,
    pub min_band: FanBand,
    pub max_band: FanBand,
    pub curve: FanCurve,
    pub shutdown_minutes: u32,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            mode: FanMode::Delta,
            occupied_minutes: 20,
            away_minutes: 5,
            min_band: FanBand {
                delta_f: 1.0,
                minutes: 5,
            },
            max_band: FanBand {
                delta_f: 8.0,
                minutes: 60,
            },
            curve: FanCurve::default(),
            shutdown_minutes: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HumidityConfig {
    pub r_value: f64,
    pub min_percent: f64,
    pub max_percent: f64,
    pub max_steam_percent: f64,
    pub steam_hysteresis: f64,
}

impl Default for HumidityConfig {
    fn default() -> Self {
        Self {
            r_value: 2.5,
            min_percent: 10.0,
            max_percent: 50.0,
            max_steam_percent: 40.0,
            steam_hysteresis: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OccupancyConfig {
    pub occupied_climates: Vec<String>,
    /// A running hold warmer than this means someone is home.
    pub heat_hold_above_f: f64,
    /// A running hold cooler than this means someone is home.
    pub cool_hold_below_f: f64,
    pub horizon_minutes: i64,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            occupied_climates: vec!["home".to_string(), "sleep".to_string()],
            heat_hold_above_f: 64.0,
            cool_hold_below_f: 76.0,
            horizon_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    pub fan: FanConfig,
    pub humidity: HumidityConfig,
    #[serde(default)]
    pub occupancy: OccupancyConfig,
    pub switch_backlight: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            fan: FanConfig::default(),
            humidity: HumidityConfig::default(),
            occupancy: OccupancyConfig::default(),
            switch_backlight: true,
        }
    }
}

impl ControlConfig {
    pub fn sanitize(&mut self) {
        self.humidity.sanitize();
        self.fan.sanitize();
        if self.occupancy.horizon_minutes < 0 {
            self.occupancy.horizon_minutes = 0;
        }
    }
}

impl HumidityConfig {
    pub fn sanitize(&mut self) {
        self.min_percent = self.min_percent.clamp(0.0, 100.0);
        self.max_percent = self.max_percent.clamp(0.0, 100.0);
        if self.min_percent > self.max_percent {
            std::mem::swap(&mut self.min_percent, &mut self.max_percent);
        }
        self.max_steam_percent = self.max_steam_percent.clamp(0.0, 100.0);
        self.steam_hysteresis = self.steam_hysteresis.max(0.0);
        if !self.r_value.is_finite() || self.r_value < 0.0 {
            self.r_value = HumidityConfig::default().r_value;
        }
    }
}

impl FanConfig {
    pub fn sanitize(&mut self) {
        self.min_band.delta_f = self.min_band.delta_f.max(0.0);
        if self.max_band.delta_f < self.min_band.delta_f {
            std::mem::swap(&mut self.min_band.delta_f, &mut self.max_band.delta_f);
        }
        if self.max_band.minutes < self.min_band.minutes {
            std::mem::swap(&mut self.min_band.minutes, &mut self.max_band.minutes);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ControlConfig::default();

        assert_eq!(config.fan.mode, FanMode::Delta);
        assert_eq!(config.fan.occupied_minutes, 20);
        assert_eq!(config.fan.away_minutes, 5);
        assert_eq!(config.fan.min_band.minutes, 5);
        assert_eq!(config.fan.max_band.minutes, 60);
        assert_eq!(config.humidity.max_steam_percent, 40.0);
        assert_eq!(config.occupancy.occupied_climates, vec!["home", "sleep"]);
        assert!(config.switch_backlight);
    }

    #[test]
    fn sanitize_orders_inverted_bounds() {
        let mut config = ControlConfig::default();
        config.humidity.min_percent = 60.0;
        config.humidity.max_percent = 120.0;
        config.fan.min_band = FanBand {
            delta_f: 9.0,
            minutes: 70,
        };

        config.sanitize();

        assert_eq!(config.humidity.min_percent, 60.0);
        assert_eq!(config.humidity.max_percent, 100.0);
        assert_eq!(config.fan.min_band.delta_f, 8.0);
        assert_eq!(config.fan.max_band.delta_f, 9.0);
        assert_eq!(config.fan.min_band.minutes, 60);
        assert_eq!(config.fan.max_band.minutes, 70);
    }

    #[test]
    fn sanitize_resets_invalid_r_value() {
        let mut config = ControlConfig::default();
        config.humidity.r_value = f64::NAN;
        config.humidity.steam_hysteresis = -3.0;

        config.sanitize();

        assert_eq!(config.humidity.r_value, 2.5);
        assert_eq!(config.humidity.steam_hysteresis, 0.0);
    }
}
