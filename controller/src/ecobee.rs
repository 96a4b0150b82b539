//! ecobee REST client: PIN authorization, token exchange and the thermostat endpoint.
//!
//! Everything vendor-shaped stays in this module. Temperatures on the wire are
//! tenths of a degree Fahrenheit.

use std::time::Duration;

use async_trait::async_trait;
use climate_common::{
    AuthorizationGrant, BacklightMode, BacklightSettings, ControlAction, HumidifierMode,
    TokenGrant,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;

pub const ECOBEE_BASE_URL: &str = "https://api.ecobee.com";
const SCOPE: &str = "smartWrite";

#[async_trait]
pub trait ThermostatApi: Send + Sync {
    /// Starts a PIN authorization.
    async fn authorize(&self) -> Result<AuthorizationGrant, ApiError>;

    /// Exchanges an authorization code. Returns
    /// [`ApiError::AuthorizationPending`] until the user enters the PIN.
    async fn request_tokens(&self, code: &str) -> Result<TokenGrant, ApiError>;

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenGrant, ApiError>;

    /// First thermostat matching `selection`.
    async fn request(
        &self,
        access_token: &str,
        selection: &Selection,
    ) -> Result<Thermostat, ApiError>;

    async fn update(
        &self,
        access_token: &str,
        selection: &Selection,
        settings: &SettingsPatch,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub selection_type: String,
    pub selection_match: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_runtime: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_settings: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_sensors: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_program: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_events: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_equipment_status: bool,
}

impl Selection {
    /// Every thermostat registered to the account, no extra sections.
    pub fn registered() -> Self {
        Self {
            selection_type: "registered".to_string(),
            selection_match: String::new(),
            include_runtime: false,
            include_settings: false,
            include_sensors: false,
            include_program: false,
            include_events: false,
            include_equipment_status: false,
        }
    }

    /// Every section one control cycle reads.
    pub fn cycle() -> Self {
        Self {
            include_runtime: true,
            include_settings: true,
            include_sensors: true,
            include_program: true,
            include_events: true,
            include_equipment_status: true,
            ..Self::registered()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thermostat {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    /// Device-local wall clock, `YYYY-MM-DD HH:MM:SS`.
    #[serde(default)]
    pub thermostat_time: String,
    /// Comma-separated running equipment, e.g. `fan,auxHeat1`.
    #[serde(default)]
    pub equipment_status: String,
    #[serde(default)]
    pub runtime: Option<Runtime>,
    #[serde(default)]
    pub settings: Option<ThermostatSettings>,
    #[serde(default)]
    pub program: Option<ThermostatProgram>,
    #[serde(default)]
    pub remote_sensors: Vec<Sensor>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    pub actual_temperature: i32,
    pub actual_humidity: i32,
    pub desired_heat: i32,
    #[serde(default)]
    pub desired_cool: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThermostatSettings {
    pub hvac_mode: String,
    /// Humidity setpoint, sent and received as a string.
    pub humidity: String,
    pub humidifier_mode: String,
    pub fan_min_on_time: u32,
    pub backlight_off_during_sleep: bool,
    pub backlight_off_time: u32,
    pub backlight_sleep_intensity: u8,
    pub backlight_on_intensity: u8,
}

impl ThermostatSettings {
    pub fn backlight(&self) -> BacklightSettings {
        BacklightSettings {
            off_during_sleep: self.backlight_off_during_sleep,
            off_time: self.backlight_off_time,
            sleep_intensity: self.backlight_sleep_intensity,
            on_intensity: self.backlight_on_intensity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatProgram {
    /// Seven rows (Monday first) of 48 half-hour climate refs.
    #[serde(default)]
    pub schedule: Vec<Vec<String>>,
    #[serde(default)]
    pub climates: Vec<ProgramClimate>,
    #[serde(default)]
    pub current_climate_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramClimate {
    #[serde(default)]
    pub name: String,
    pub climate_ref: String,
    pub heat_temp: i32,
    #[serde(default)]
    pub cool_temp: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub heat_hold_temp: i32,
    #[serde(default)]
    pub cool_hold_temp: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Sensor {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub sensor_type: String,
    #[serde(default)]
    pub capability: Vec<SensorCapability>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorCapability {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// `temperature` in tenths of °F, `occupancy` as `"true"`/`"false"`,
    /// or `"unknown"` when the sensor is offline.
    #[serde(default)]
    pub value: String,
}

/// Settings fields to change. Absent fields are left alone by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidifier_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_min_on_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlight_off_during_sleep: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlight_off_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlight_sleep_intensity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlight_on_intensity: Option<u8>,
}

impl SettingsPatch {
    /// Folds planner actions into one update. Turning the backlight on uses `on_profile`.
    pub fn from_actions(actions: &[ControlAction], on_profile: BacklightSettings) -> Self {
        actions
            .iter()
            .fold(Self::default(), |patch, action| match *action {
                ControlAction::SetFanMinOnTime(minutes) => patch.with_fan_min_on_time(minutes),
                ControlAction::SetBacklight(BacklightMode::On) => patch.with_backlight(on_profile),
                ControlAction::SetBacklight(BacklightMode::Off) => {
                    patch.with_backlight(BacklightSettings::OFF)
                }
                ControlAction::SetHumidity(percent) => patch.with_humidity(percent),
                ControlAction::SetHumidifierMode(mode) => patch.with_humidifier_mode(mode),
            })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_humidity(mut self, percent: u8) -> Self {
        self.humidity = Some(percent.to_string());
        self
    }

    pub fn with_humidifier_mode(mut self, mode: HumidifierMode) -> Self {
        self.humidifier_mode = Some(mode.as_str().to_string());
        self
    }

    pub fn with_fan_min_on_time(mut self, minutes: u32) -> Self {
        self.fan_min_on_time = Some(minutes);
        self
    }

    pub fn with_backlight(mut self, backlight: BacklightSettings) -> Self {
        self.backlight_off_during_sleep = Some(backlight.off_during_sleep);
        self.backlight_off_time = Some(backlight.off_time);
        self.backlight_sleep_intensity = Some(backlight.sleep_intensity);
        self.backlight_on_intensity = Some(backlight.on_intensity);
        self
    }
}

#[derive(Debug, Clone)]
pub struct EcobeeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EcobeeClient {
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn token(&self, grant_type: &str, key: &str, value: &str) -> Result<TokenGrant, ApiError> {
        let response = self
            .client
            .post(format!("{}/token", self.base_url))
            .query(&[
                ("grant_type", grant_type),
                (key, value),
                ("client_id", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let tokens: TokenResponse = oauth_body(response).await?;
        debug!(
            "token grant {grant_type} ok, expires in {}s, rotated refresh: {}",
            tokens.expires_in,
            tokens.refresh_token.is_some()
        );
        Ok(TokenGrant {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in_secs: tokens.expires_in,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    ecobee_pin: String,
    code: String,
    /// Minutes. Sent in snake case next to the camel-case PIN.
    #[serde(rename = "expires_in")]
    expires_in: i64,
    /// Seconds.
    interval: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThermostatResponse {
    #[serde(default)]
    thermostat_list: Vec<Thermostat>,
    status: Status,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: Status,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    selection: &'a Selection,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    selection: &'a Selection,
    thermostat: ThermostatUpdate<'a>,
}

#[derive(Serialize)]
struct ThermostatUpdate<'a> {
    settings: &'a SettingsPatch,
}

/// Decodes an OAuth endpoint reply, mapping `{"error": ...}` bodies.
async fn oauth_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return serde_json::from_str(&body).map_err(|err| ApiError::Decode(err.to_string()));
    }

    match serde_json::from_str::<OAuthError>(&body) {
        Ok(err) => Err(match err.error.as_str() {
            "authorization_pending" => ApiError::AuthorizationPending,
            "authorization_expired" => ApiError::AuthorizationExpired,
            _ => ApiError::Authorization {
                error: err.error,
                description: err.error_description,
            },
        }),
        Err(_) => Err(ApiError::Decode(format!("{status}: {body}"))),
    }
}

/// API replies carry a `status` block; non-zero codes are failures whatever the HTTP status.
fn check_status(status: &Status) -> Result<(), ApiError> {
    if status.code == 0 {
        Ok(())
    } else {
        Err(ApiError::Api {
            code: status.code,
            message: status.message.clone(),
        })
    }
}

trait Reply: DeserializeOwned {
    fn status(&self) -> &Status;
}

impl Reply for ThermostatResponse {
    fn status(&self) -> &Status {
        &self.status
    }
}

impl Reply for StatusResponse {
    fn status(&self) -> &Status {
        &self.status
    }
}

async fn api_body<T: Reply>(response: reqwest::Response) -> Result<T, ApiError> {
    let http_status = response.status();
    let body = response.text().await?;
    match serde_json::from_str::<T>(&body) {
        Ok(parsed) => {
            check_status(parsed.status())?;
            Ok(parsed)
        }
        Err(err) => match serde_json::from_str::<StatusResponse>(&body) {
            Ok(reply) => {
                check_status(&reply.status)?;
                Err(ApiError::Decode(err.to_string()))
            }
            Err(_) => Err(ApiError::Decode(format!("{http_status}: {err}"))),
        },
    }
}

#[async_trait]
impl ThermostatApi for EcobeeClient {
    async fn authorize(&self) -> Result<AuthorizationGrant, ApiError> {
        let response = self
            .client
            .get(format!("{}/authorize", self.base_url))
            .query(&[
                ("response_type", "ecobeePin"),
                ("client_id", self.api_key.as_str()),
                ("scope", SCOPE),
            ])
            .send()
            .await?;

        let grant: AuthorizeResponse = oauth_body(response).await?;
        Ok(AuthorizationGrant {
            pin: grant.ecobee_pin,
            code: grant.code,
            interval_secs: grant.interval,
            expires_in_minutes: grant.expires_in,
        })
    }

    async fn request_tokens(&self, code: &str) -> Result<TokenGrant, ApiError> {
        self.token("ecobeePin", "code", code).await
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.token("refresh_token", "refresh_token", refresh_token)
            .await
    }

    async fn request(
        &self,
        access_token: &str,
        selection: &Selection,
    ) -> Result<Thermostat, ApiError> {
        let body = serde_json::to_string(&RequestBody { selection })
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        let response = self
            .client
            .get(format!("{}/1/thermostat", self.base_url))
            .bearer_auth(access_token)
            .query(&[("format", "json"), ("body", body.as_str())])
            .send()
            .await?;

        let reply: ThermostatResponse = api_body(response).await?;
        reply
            .thermostat_list
            .into_iter()
            .next()
            .ok_or(ApiError::NoThermostat)
    }

    async fn update(
        &self,
        access_token: &str,
        selection: &Selection,
        settings: &SettingsPatch,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/1/thermostat", self.base_url))
            .bearer_auth(access_token)
            .query(&[("format", "json")])
            .json(&UpdateRequest {
                selection,
                thermostat: ThermostatUpdate { settings },
            })
            .send()
            .await?;

        api_body::<StatusResponse>(response).await?;
        Ok(())
    }
}
