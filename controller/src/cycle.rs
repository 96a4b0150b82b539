use chrono::Utc;
use climate_common::{plan, ControlPlan};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    auth::TokenManager,
    ecobee::{Selection, SettingsPatch, ThermostatApi},
    error::{CycleError, ObserveError},
    observe::build_observation,
    settings::Settings,
    store::SessionStore,
    wait::wait,
    weather::{outside_temps, WeatherApi},
};

/// Drives one control cycle at a time until stopped.
pub struct ControlLoop<'a> {
    settings: &'a Settings,
    thermostat: &'a dyn ThermostatApi,
    weather: &'a dyn WeatherApi,
    store: &'a dyn SessionStore,
    cancel: &'a CancellationToken,
}

impl<'a> ControlLoop<'a> {
    pub fn new(
        settings: &'a Settings,
        thermostat: &'a dyn ThermostatApi,
        weather: &'a dyn WeatherApi,
        store: &'a dyn SessionStore,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            settings,
            thermostat,
            weather,
            store,
            cancel,
        }
    }

    /// Runs cycles until the stop token fires or a fatal error occurs.
    pub async fn run(&self) -> Result<(), CycleError> {
        let interval = self.settings.update_interval;
        let message = format!("/{} seconds waiting ...", interval.as_secs());

        while !self.cancel.is_cancelled() {
            match self.run_cycle().await {
                Ok(Some(_)) => {}
                Ok(None) => warn!("no valid access token, skipping cycle"),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!("control cycle failed: {err}"),
            }

            wait(
                interval,
                self.settings.countdown_tick(),
                self.cancel,
                self.settings.show_countdown,
                &message,
            )
            .await;
        }
        info!("control loop stopped");
        Ok(())
    }

    /// One pass: observe, plan, apply. `None` when no token could be obtained.
    pub async fn run_cycle(&self) -> Result<Option<ControlPlan>, CycleError> {
        let mut tokens = TokenManager::load(
            &self.settings.thermostat_name,
            self.thermostat,
            self.store,
            self.cancel,
            self.settings.show_countdown,
        )
        .await?;
        if !tokens.ensure_valid(false).await? {
            return Ok(None);
        }
        let Some(access_token) = tokens.access_token().map(str::to_string) else {
            return Ok(None);
        };

        let thermostat = self
            .thermostat
            .request(&access_token, &Selection::cycle())
            .await?;
        let device_settings = thermostat
            .settings
            .as_ref()
            .ok_or(ObserveError::MissingSection("settings"))?;
        tokens
            .remember_backlight(&device_settings.backlight())
            .await?;

        let outside = outside_temps(self.weather, &self.settings.location, Utc::now()).await?;
        let config = &self.settings.control;
        let observation = build_observation(&thermostat, outside, config)?;
        let plan = plan(config, &observation);

        match plan.fan_curve_minutes {
            Some(raw) => debug!(
                "fan runtime {} min ({raw:.3}) for ΔT={:.1}",
                plan.targets.fan_min_runtime_minutes, plan.sensor_delta_f
            ),
            None => debug!(
                "fan runtime {} min for ΔT={:.1}",
                plan.targets.fan_min_runtime_minutes, plan.sensor_delta_f
            ),
        }
        info!(
            "RH for inside {:.1}°F and outside {:.1}°F: {:.1}%",
            observation.inside_temp_f, observation.outside_temp_f, plan.current_rh
        );
        info!(
            "RH for future inside {:.1}°F and outside {:.1}°F: {:.1}%",
            observation.future_target_temp_f, observation.outside_temp_next_hour_f, plan.future_rh
        );
        info!(
            "humidity setpoint {}% (unrounded {:.1}%), humidifier {}, backlight {}, occupied {}",
            plan.targets.humidity_setpoint,
            plan.unrounded_setpoint,
            plan.targets.humidifier_mode.as_str(),
            plan.targets.backlight_mode.as_str(),
            observation.occupied
        );

        let patch = SettingsPatch::from_actions(&plan.actions, tokens.session().restore_backlight());
        if patch.is_empty() {
            debug!("thermostat already matches targets");
        } else {
            debug!("applying {:?}", plan.actions);
            self.thermostat
                .update(&access_token, &Selection::registered(), &patch)
                .await?;
        }
        Ok(Some(plan))
    }
}
