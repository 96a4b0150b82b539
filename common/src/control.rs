use crate::{
    config::ControlConfig,
    fan::{fan_mode_decision, fan_runtime_minutes, raw_fan_runtime, sensor_delta},
    humidity::{desired_humidity, humidifier_mode_decision, humidity_setpoint, unrounded_setpoint},
    observation::Observation,
    types::{BacklightMode, ControlAction, ControlTargets, FanMode},
};

/// Outcome of one planning pass. The intermediate values are kept for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPlan {
    pub targets: ControlTargets,
    pub sensor_delta_f: f64,
    pub fan_curve_minutes: Option<f64>,
    pub current_rh: f64,
    pub future_rh: f64,
    pub unrounded_setpoint: f64,
    /// Only settings that differ from what the device already has.
    pub actions: Vec<ControlAction>,
}

pub fn plan(config: &ControlConfig, observation: &Observation) -> ControlPlan {
    let mut actions = Vec::new();
    let device = &observation.device;

    let delta = sensor_delta(&observation.sensor_temps);
    let fan = &config.fan;
    let (fan_minutes, fan_curve_minutes) = match fan.mode {
        FanMode::Delta => {
            let minutes = fan_runtime_minutes(
                &observation.sensor_temps,
                &fan.curve,
                fan.min_band,
                fan.max_band,
            );
            if minutes != device.fan_min_on_time {
                actions.push(ControlAction::SetFanMinOnTime(minutes));
            }
            let raw = raw_fan_runtime(delta, &fan.curve, fan.min_band, fan.max_band);
            (minutes, raw)
        }
        FanMode::Occupancy => {
            match fan_mode_decision(
                observation.occupied,
                fan.occupied_minutes,
                fan.away_minutes,
                device.fan_min_on_time,
            ) {
                Some(minutes) => {
                    actions.push(ControlAction::SetFanMinOnTime(minutes));
                    (minutes, None)
                }
                None => (device.fan_min_on_time, None),
            }
        }
    };

    let current_backlight = device.backlight.mode();
    let backlight_mode = if config.switch_backlight {
        let wanted = if observation.occupied {
            BacklightMode::On
        } else {
            BacklightMode::Off
        };
        if wanted != current_backlight {
            actions.push(ControlAction::SetBacklight(wanted));
        }
        wanted
    } else {
        current_backlight
    };

    let humidity = &config.humidity;
    let current_rh = desired_humidity(
        observation.inside_temp_f,
        observation.outside_temp_f,
        humidity.r_value,
    );
    let future_rh = desired_humidity(
        observation.future_target_temp_f,
        observation.outside_temp_next_hour_f,
        humidity.r_value,
    );
    let setpoint = humidity_setpoint(
        current_rh,
        future_rh,
        humidity.min_percent,
        humidity.max_percent,
    );
    if device.humidity_setpoint != Some(setpoint) {
        actions.push(ControlAction::SetHumidity(setpoint));
    }

    let humidifier_mode = humidifier_mode_decision(
        &observation.equipment,
        device.humidifier_mode,
        observation.inside_humidity,
        humidity.max_steam_percent,
        humidity.steam_hysteresis,
    );
    if humidifier_mode != device.humidifier_mode {
        actions.push(ControlAction::SetHumidifierMode(humidifier_mode));
    }

    ControlPlan {
        targets: ControlTargets {
            humidity_setpoint: setpoint,
            fan_min_runtime_minutes: fan_minutes,
            humidifier_mode,
            backlight_mode,
        },
        sensor_delta_f: delta,
        fan_curve_minutes,
        current_rh,
        future_rh,
        unrounded_setpoint: unrounded_setpoint(
            current_rh,
            future_rh,
            humidity.min_percent,
            humidity.max_percent,
        ),
        actions,
    }
}
