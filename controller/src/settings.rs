//! Process configuration read from the environment.

use std::{path::PathBuf, str::FromStr, time::Duration};

use climate_common::{ControlConfig, FanBand, FanCurve, FanMode};

use crate::{
    ecobee::ECOBEE_BASE_URL,
    error::ConfigError,
    store::SESSION_FILE,
    weather::{WeatherLocation, OWM_BASE_URL},
};

const DEFAULT_THERMOSTAT_NAME: &str = "My Thermostat";
const DEFAULT_DATA_DIR: &str = "./.climate";
const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 600;
/// Shortest pause between cycles; also the countdown's shortest tick.
const MIN_UPDATE_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Settings {
    pub thermostat_name: String,
    pub ecobee_api_key: String,
    pub ecobee_base_url: String,
    pub owm_api_key: String,
    pub owm_base_url: String,
    pub location: WeatherLocation,
    pub data_dir: PathBuf,
    pub update_interval: Duration,
    pub show_countdown: bool,
    pub control: ControlConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let ecobee_api_key = var("ECOBEE_API_KEY").ok_or(ConfigError::Missing("ECOBEE_API_KEY"))?;
        let owm_api_key = var("OWM_API_KEY").ok_or(ConfigError::Missing("OWM_API_KEY"))?;
        let location = weather_location(&var)?;

        let mut control = ControlConfig::default();
        if let Some(value) = var("FAN_MODE") {
            control.fan.mode = FanMode::from_prefix(&value).ok_or_else(|| ConfigError::Invalid {
                name: "FAN_MODE",
                value: value.clone(),
                reason: "expected a value starting with 'del' or 'occ'".to_string(),
            })?;
        }
        control.fan.occupied_minutes =
            parse_or(&var, "FAN_OCCUPIED_TIME", control.fan.occupied_minutes)?;
        control.fan.away_minutes = parse_or(&var, "FAN_AWAY_TIME", control.fan.away_minutes)?;
        control.fan.shutdown_minutes =
            parse_or(&var, "FAN_SHUTDOWN_TIME", control.fan.shutdown_minutes)?;
        if let Some(value) = var("FAN_MIN") {
            control.fan.min_band = parse_band("FAN_MIN", &value)?;
        }
        if let Some(value) = var("FAN_MAX") {
            control.fan.max_band = parse_band("FAN_MAX", &value)?;
        }
        if let Some(value) = var("FAN_FACTORS") {
            let factors: Vec<f64> =
                serde_json::from_str(&value).map_err(|err| ConfigError::Invalid {
                    name: "FAN_FACTORS",
                    value: value.clone(),
                    reason: err.to_string(),
                })?;
            control.fan.curve = FanCurve::from_factors(&factors)?;
        }

        control.humidity.r_value = parse_or(&var, "R_VALUE", control.humidity.r_value)?;
        control.humidity.max_percent = parse_or(&var, "MAX_HUMIDITY", control.humidity.max_percent)?;
        control.humidity.min_percent = parse_or(&var, "MIN_HUMIDITY", control.humidity.min_percent)?;
        control.humidity.max_steam_percent = parse_or(
            &var,
            "MAX_STEAM_HUMIDITY",
            control.humidity.max_steam_percent,
        )?;
        control.humidity.steam_hysteresis = parse_or(
            &var,
            "STEAM_HUMIDITY_HYST",
            control.humidity.steam_hysteresis,
        )?;
        control.switch_backlight = var("SWITCH_BACKLIGHT")
            .map(|value| string_to_bool(&value))
            .unwrap_or(true);
        control.sanitize();

        Ok(Self {
            thermostat_name: var("THERMOSTAT_NAME")
                .unwrap_or_else(|| DEFAULT_THERMOSTAT_NAME.to_string()),
            ecobee_api_key,
            ecobee_base_url: var("ECOBEE_BASE_URL").unwrap_or_else(|| ECOBEE_BASE_URL.to_string()),
            owm_api_key,
            owm_base_url: var("OWM_BASE_URL").unwrap_or_else(|| OWM_BASE_URL.to_string()),
            location,
            data_dir: var("CLIMATE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            update_interval: Duration::from_secs(
                parse_or(&var, "UPDATE_INTERVAL", DEFAULT_UPDATE_INTERVAL_SECS)?
                    .max(MIN_UPDATE_INTERVAL_SECS),
            ),
            show_countdown: var("SHOW_WAIT_COUNTDOWN")
                .map(|value| string_to_bool(&value))
                .unwrap_or(true),
            control,
        })
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    /// Countdown cadence between cycles: a tenth of the interval, at least ten seconds.
    pub fn countdown_tick(&self) -> Duration {
        (self.update_interval / 10).max(Duration::from_secs(MIN_UPDATE_INTERVAL_SECS))
    }
}

/// Only `0`, `false` and `f` are false.
pub fn string_to_bool(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "f")
}

fn weather_location(var: &impl Fn(&str) -> Option<String>) -> Result<WeatherLocation, ConfigError> {
    if let (Some(latitude), Some(longitude)) = (var("OWM_LATITUDE"), var("OWM_LONGITUDE")) {
        return Ok(WeatherLocation::Coordinates {
            latitude: parse("OWM_LATITUDE", &latitude)?,
            longitude: parse("OWM_LONGITUDE", &longitude)?,
        });
    }
    if let Some(id) = var("OWM_ID") {
        return Ok(WeatherLocation::Id(parse("OWM_ID", &id)?));
    }
    if let Some(name) = var("OWM_LOCATION") {
        return Ok(WeatherLocation::Name(name));
    }
    Err(ConfigError::NoWeatherLocation)
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(value) => parse(name, &value),
        None => Ok(default),
    }
}

/// `[delta °F, minutes]`, e.g. `[8,60]`.
fn parse_band(name: &'static str, value: &str) -> Result<FanBand, ConfigError> {
    let (delta_f, minutes): (f64, u32) =
        serde_json::from_str(value).map_err(|err| ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: err.to_string(),
        })?;
    Ok(FanBand { delta_f, minutes })
}
