use climate_common::{FanCurveError, ScheduleError};
use thiserror::Error;

/// Failures talking to the ecobee API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The user has not entered the PIN yet. Retried at the granted interval.
    #[error("authorization pending")]
    AuthorizationPending,
    #[error("authorization expired")]
    AuthorizationExpired,
    #[error("authorization rejected: {error}: {description}")]
    Authorization { error: String, description: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("no thermostat registered to this account")]
    NoThermostat,
}

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("weather api returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected weather response: {0}")]
    Decode(String),
    #[error("no forecast point within the window")]
    NoForecast,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session store serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("one weather location is required: OWM_LATITUDE and OWM_LONGITUDE, OWM_ID, or OWM_LOCATION")]
    NoWeatherLocation,
    #[error("FAN_FACTORS: {0}")]
    FanCurve(#[from] FanCurveError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("session has an access token but no refresh token")]
    NoRefreshToken,
}

/// The thermostat payload could not be turned into an observation.
#[derive(Debug, Error)]
pub enum ObserveError {
    #[error("thermostat response is missing {0}")]
    MissingSection(&'static str),
    #[error("cannot parse thermostat time {0:?}")]
    Timestamp(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("authorization: {0}")]
    Auth(#[from] AuthError),
    #[error("thermostat: {0}")]
    Api(#[from] ApiError),
    #[error("weather: {0}")]
    Weather(#[from] WeatherError),
    #[error("observation: {0}")]
    Observe(#[from] ObserveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CycleError {
    /// Store failures stop the loop; everything else is retried next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Auth(AuthError::Store(_)))
    }
}
