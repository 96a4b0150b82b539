//! Humidity targets derived from indoor/outdoor temperatures.
//!
//! The target dew point sits between the outside and inside temperatures,
//! weighted by how much of the wall's thermal resistance lies between the
//! room air and the coldest surface that must stay dry.

use std::collections::BTreeSet;

use crate::types::HumidifierMode;

const MAGNUS_B: f64 = 17.625;
const MAGNUS_C: f64 = 243.04;

/// Interior air film resistance.
pub const INSIDE_FILM_R: f64 = 0.17;
/// Exterior air film resistance.
pub const OUTSIDE_FILM_R: f64 = 0.68;

/// Equipment names starting with this prefix dry the air and need steam.
pub const HEAT_EQUIPMENT_PREFIX: &str = "auxHeat";

pub fn fahrenheit_to_celsius(temp_f: f64) -> f64 {
    (temp_f - 32.0) * 5.0 / 9.0
}

/// Relative humidity in percent of air at `temp_f` whose dew point is `dewpoint_f`.
///
/// Not clamped: a dew point above the air temperature yields more than 100.
pub fn relative_humidity(temp_f: f64, dewpoint_f: f64) -> f64 {
    let temp = fahrenheit_to_celsius(temp_f);
    let dewpoint = fahrenheit_to_celsius(dewpoint_f);
    100.0 * (MAGNUS_B * dewpoint / (MAGNUS_C + dewpoint)).exp()
        / (MAGNUS_B * temp / (MAGNUS_C + temp)).exp()
}

pub fn target_dewpoint(inside_temp_f: f64, outside_temp_f: f64, r_value: f64) -> f64 {
    let total = INSIDE_FILM_R + OUTSIDE_FILM_R + r_value;
    (inside_temp_f - outside_temp_f) / total * (r_value + INSIDE_FILM_R) + outside_temp_f
}

pub fn desired_humidity(inside_temp_f: f64, outside_temp_f: f64, r_value: f64) -> f64 {
    relative_humidity(
        inside_temp_f,
        target_dewpoint(inside_temp_f, outside_temp_f, r_value),
    )
}

/// Lower of the two estimates, bounded to `[min_percent, max_percent]`,
/// rounded to an even percent. Halves round to even, so an odd bound of 45
/// gives 44.
pub fn humidity_setpoint(
    current_rh: f64,
    future_rh: f64,
    min_percent: f64,
    max_percent: f64,
) -> u8 {
    let bounded = unrounded_setpoint(current_rh, future_rh, min_percent, max_percent);
    let even = (bounded / 2.0).round_ties_even() * 2.0;
    even.clamp(0.0, 100.0) as u8
}

pub fn unrounded_setpoint(
    current_rh: f64,
    future_rh: f64,
    min_percent: f64,
    max_percent: f64,
) -> f64 {
    max_percent.min(current_rh).min(future_rh).max(min_percent)
}

pub fn heat_running(equipment: &BTreeSet<String>) -> bool {
    equipment
        .iter()
        .any(|name| name.starts_with(HEAT_EQUIPMENT_PREFIX))
}

pub fn humidifier_mode_decision(
    equipment: &BTreeSet<String>,
    current: HumidifierMode,
    current_rh: f64,
    max_steam_rh: f64,
    hysteresis: f64,
) -> HumidifierMode {
    if heat_running(equipment) {
        return HumidifierMode::Manual;
    }

    if current == HumidifierMode::Manual && current_rh >= max_steam_rh + hysteresis {
        HumidifierMode::Off
    } else if current != HumidifierMode::Manual && current_rh <= max_steam_rh {
        HumidifierMode::Manual
    } else {
        current
    }
}
