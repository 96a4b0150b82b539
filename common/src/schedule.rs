use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OccupancyConfig;

pub const SLOTS_PER_DAY: usize = 48;
const SLOT_MINUTES: u32 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("program has no slot {slot} for {day}")]
    MissingSlot { day: Weekday, slot: usize },
    #[error("program references unknown climate '{0}'")]
    UnknownClimate(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Climate {
    pub climate_ref: String,
    pub heat_temp_f: f64,
}

/// Weekly program: seven rows of half-hour slots naming a climate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub current_climate_ref: String,
    pub schedule: Vec<Vec<String>>,
    pub climates: Vec<Climate>,
}

/// A hold or other override, in device-local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub running: bool,
    pub heat_hold_temp_f: f64,
    pub cool_hold_temp_f: f64,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSensor {
    pub name: String,
    pub temperature_f: Option<f64>,
    pub occupied: bool,
}

impl Program {
    pub fn climate_at(&self, at: NaiveDateTime) -> Result<&str, ScheduleError> {
        let day = at.weekday();
        let slot = ((at.hour() * 60 + at.minute()) / SLOT_MINUTES) as usize;
        // Row 0 of the weekly program is Monday.
        self.schedule
            .get(day.num_days_from_monday() as usize)
            .and_then(|row| row.get(slot))
            .map(String::as_str)
            .ok_or(ScheduleError::MissingSlot { day, slot })
    }

    pub fn heat_target(&self, climate_ref: &str) -> Result<f64, ScheduleError> {
        self.climates
            .iter()
            .find(|climate| climate.climate_ref == climate_ref)
            .map(|climate| climate.heat_temp_f)
            .ok_or_else(|| ScheduleError::UnknownClimate(climate_ref.to_string()))
    }
}

/// Heat setpoint expected `horizon` after `now`: the programmed climate's
/// target, unless the running override lasts past that point.
pub fn future_target_temp(
    program: &Program,
    events: &[ScheduledEvent],
    now: NaiveDateTime,
    horizon: Duration,
) -> Result<f64, ScheduleError> {
    let future = now + horizon;
    let scheduled = program.heat_target(program.climate_at(future)?)?;

    match events.iter().find(|event| event.running) {
        Some(event) if event.end > future => Ok(event.heat_hold_temp_f),
        _ => Ok(scheduled),
    }
}

pub fn occupancy(
    current_climate_ref: &str,
    sensors: &[RemoteSensor],
    events: &[ScheduledEvent],
    config: &OccupancyConfig,
) -> bool {
    if config
        .occupied_climates
        .iter()
        .any(|climate| climate == current_climate_ref)
    {
        return true;
    }

    if sensors.iter().any(|sensor| sensor.occupied) {
        return true;
    }

    events.iter().any(|event| {
        event.running
            && (event.heat_hold_temp_f > config.heat_hold_above_f
                || event.cool_hold_temp_f < config.cool_hold_below_f)
    })
}
