//! OpenWeatherMap 2.5 client for the outside temperature now and in an hour.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use climate_common::{default_forecast_window, nearest_forecast, ForecastPoint};
use serde::Deserialize;
use tracing::debug;

use crate::error::WeatherError;

pub const OWM_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone, PartialEq)]
pub enum WeatherLocation {
    Coordinates { latitude: f64, longitude: f64 },
    Id(u64),
    Name(String),
}

impl WeatherLocation {
    fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Coordinates {
                latitude,
                longitude,
            } => vec![("lat", latitude.to_string()), ("lon", longitude.to_string())],
            Self::Id(id) => vec![("id", id.to_string())],
            Self::Name(name) => vec![("q", name.clone())],
        }
    }
}

#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Current outside temperature in °F.
    async fn current_temperature(&self, location: &WeatherLocation) -> Result<f64, WeatherError>;

    /// Short-range forecast, in °F.
    async fn forecast(&self, location: &WeatherLocation)
        -> Result<Vec<ForecastPoint>, WeatherError>;
}

#[derive(Debug, Clone)]
pub struct OwmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OwmClient {
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

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        location: &WeatherLocation,
    ) -> Result<T, WeatherError> {
        let url = format!("{}/data/2.5/{endpoint}", self.base_url);
        let mut query = location.query();
        query.push(("units", "imperial".to_string()));
        query.push(("appid", self.api_key.clone()));

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<OwmError>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(WeatherError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| WeatherError::Decode(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct OwmError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainBlock,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt: i64,
    main: MainBlock,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
}

#[async_trait]
impl WeatherApi for OwmClient {
    async fn current_temperature(&self, location: &WeatherLocation) -> Result<f64, WeatherError> {
        let weather: CurrentWeather = self.get("weather", location).await?;
        Ok(weather.main.temp)
    }

    async fn forecast(
        &self,
        location: &WeatherLocation,
    ) -> Result<Vec<ForecastPoint>, WeatherError> {
        let forecast: ForecastResponse = self.get("forecast", location).await?;
        forecast
            .list
            .into_iter()
            .map(|entry| {
                let reference_time = DateTime::from_timestamp(entry.dt, 0).ok_or_else(|| {
                    WeatherError::Decode(format!("forecast timestamp {} out of range", entry.dt))
                })?;
                Ok(ForecastPoint {
                    reference_time,
                    temperature_f: entry.main.temp,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutsideTemps {
    pub now_f: f64,
    pub next_hour_f: f64,
}

/// Current temperature plus the forecast point nearest to one hour from `now`.
pub async fn outside_temps(
    weather: &dyn WeatherApi,
    location: &WeatherLocation,
    now: DateTime<Utc>,
) -> Result<OutsideTemps, WeatherError> {
    let now_f = weather.current_temperature(location).await?;
    let forecast = weather.forecast(location).await?;
    let target = now + chrono::Duration::hours(1);
    let point = nearest_forecast(&forecast, target, default_forecast_window())
        .ok_or(WeatherError::NoForecast)?;
    debug!(
        "forecast for {} picked {} at {:.1}°F",
        target, point.reference_time, point.temperature_f
    );

    Ok(OutsideTemps {
        now_f,
        next_hour_f: point.temperature_f,
    })
}
