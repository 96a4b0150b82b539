//! Turns an ecobee thermostat payload into the planner's [`Observation`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDateTime};
use climate_common::{
    future_target_temp, occupancy, Climate, ControlConfig, DeviceSettings, HumidifierMode,
    Observation, Program, RemoteSensor, ScheduledEvent,
};
use tracing::{debug, warn};

use crate::{
    ecobee::{Event, Sensor, Thermostat, ThermostatProgram, ThermostatSettings},
    error::ObserveError,
    weather::OutsideTemps,
};

const THERMOSTAT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn tenths(value: i32) -> f64 {
    f64::from(value) / 10.0
}

pub fn parse_thermostat_time(value: &str) -> Result<NaiveDateTime, ObserveError> {
    NaiveDateTime::parse_from_str(value, THERMOSTAT_TIME_FORMAT)
        .map_err(|_| ObserveError::Timestamp(value.to_string()))
}

pub fn equipment(status: &str) -> BTreeSet<String> {
    status
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn capability<'a>(sensor: &'a Sensor, kind: &str) -> Option<&'a str> {
    sensor
        .capability
        .iter()
        .find(|capability| capability.kind == kind)
        .map(|capability| capability.value.as_str())
}

/// Remote sensors with their temperature in °F. Offline sensors report no temperature.
pub fn remote_sensors(sensors: &[Sensor]) -> Vec<RemoteSensor> {
    sensors
        .iter()
        .map(|sensor| RemoteSensor {
            name: sensor.name.clone(),
            temperature_f: capability(sensor, "temperature")
                .and_then(|value| value.parse::<f64>().ok())
                .map(|value| value / 10.0),
            occupied: capability(sensor, "occupancy") == Some("true"),
        })
        .collect()
}

pub fn sensor_temps(sensors: &[RemoteSensor]) -> BTreeMap<String, f64> {
    sensors
        .iter()
        .filter_map(|sensor| {
            sensor
                .temperature_f
                .map(|temp| (sensor.name.clone(), temp))
        })
        .collect()
}

/// Running events only; the rest never affect a decision.
pub fn running_events(events: &[Event]) -> Result<Vec<ScheduledEvent>, ObserveError> {
    events
        .iter()
        .filter(|event| event.running)
        .map(|event| {
            let end = format!("{} {}", event.end_date, event.end_time);
            Ok(ScheduledEvent {
                running: true,
                heat_hold_temp_f: tenths(event.heat_hold_temp),
                cool_hold_temp_f: tenths(event.cool_hold_temp),
                end: parse_thermostat_time(&end)?,
            })
        })
        .collect()
}

pub fn weekly_program(program: &ThermostatProgram) -> Program {
    Program {
        current_climate_ref: program.current_climate_ref.clone(),
        schedule: program.schedule.clone(),
        climates: program
            .climates
            .iter()
            .map(|climate| Climate {
                climate_ref: climate.climate_ref.clone(),
                heat_temp_f: tenths(climate.heat_temp),
            })
            .collect(),
    }
}

pub fn device_settings(settings: &ThermostatSettings) -> DeviceSettings {
    let humidifier_mode = HumidifierMode::parse(&settings.humidifier_mode).unwrap_or_else(|| {
        warn!(
            "unknown humidifier mode {:?}, treating as off",
            settings.humidifier_mode
        );
        HumidifierMode::Off
    });

    DeviceSettings {
        humidity_setpoint: settings.humidity.trim().parse().ok(),
        humidifier_mode,
        fan_min_on_time: settings.fan_min_on_time,
        backlight: settings.backlight(),
    }
}

pub fn build_observation(
    thermostat: &Thermostat,
    outside: OutsideTemps,
    config: &ControlConfig,
) -> Result<Observation, ObserveError> {
    let runtime = thermostat
        .runtime
        .as_ref()
        .ok_or(ObserveError::MissingSection("runtime"))?;
    let settings = thermostat
        .settings
        .as_ref()
        .ok_or(ObserveError::MissingSection("settings"))?;
    let wire_program = thermostat
        .program
        .as_ref()
        .ok_or(ObserveError::MissingSection("program"))?;

    let now = parse_thermostat_time(&thermostat.thermostat_time)?;
    let sensors = remote_sensors(&thermostat.remote_sensors);
    let events = running_events(&thermostat.events)?;
    let program = weekly_program(wire_program);

    let future_target_temp_f = future_target_temp(
        &program,
        &events,
        now,
        Duration::minutes(config.occupancy.horizon_minutes),
    )?;
    let occupied = occupancy(
        &program.current_climate_ref,
        &sensors,
        &events,
        &config.occupancy,
    );
    debug!(
        "thermostat time {now}, climate {}, occupied {occupied}, future target {future_target_temp_f:.1}°F",
        program.current_climate_ref
    );

    Ok(Observation {
        inside_temp_f: tenths(runtime.actual_temperature),
        desired_heat_temp_f: tenths(runtime.desired_heat),
        inside_humidity: f64::from(runtime.actual_humidity),
        equipment: equipment(&thermostat.equipment_status),
        occupied,
        outside_temp_f: outside.now_f,
        outside_temp_next_hour_f: outside.next_hour_f,
        future_target_temp_f,
        sensor_temps: sensor_temps(&sensors),
        device: device_settings(settings),
    })
}
