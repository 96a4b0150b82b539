//! In-memory collaborators with call counters.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use climate_common::{AuthorizationGrant, ForecastPoint, Session, TokenGrant};
use serde_json::json;

use crate::{
    ecobee::{Selection, SettingsPatch, Thermostat, ThermostatApi},
    error::{ApiError, StoreError, WeatherError},
    store::SessionStore,
    weather::{WeatherApi, WeatherLocation},
};

pub fn grant() -> AuthorizationGrant {
    AuthorizationGrant {
        pin: "BXKD".to_string(),
        code: "auth-code".to_string(),
        interval_secs: 30,
        expires_in_minutes: 9,
    }
}

pub fn tokens(access: &str) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: Some(format!("refresh-for-{access}")),
        expires_in_secs: 3600,
    }
}

/// Session holding tokens that stay valid for an hour after `now`.
pub fn valid_session(now: DateTime<Utc>) -> Session {
    let mut session = Session::default();
    session.begin_authorization(&grant(), now);
    session.apply_tokens(&tokens("access-1"), now);
    session.got_token = true;
    session
}

#[derive(Default)]
pub struct FakeThermostat {
    pub authorize_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub request_calls: AtomicUsize,
    /// Replies to `request_tokens`, in order. Pending once exhausted.
    pub token_replies: Mutex<VecDeque<Result<TokenGrant, ApiError>>>,
    pub thermostat: Mutex<Option<Thermostat>>,
    pub updates: Mutex<Vec<SettingsPatch>>,
    pub fail_updates: AtomicBool,
}

impl FakeThermostat {
    pub fn with_thermostat(thermostat: Thermostat) -> Self {
        let fake = Self::default();
        *fake.thermostat.lock().unwrap() = Some(thermostat);
        fake
    }

    pub fn push_token_reply(&self, reply: Result<TokenGrant, ApiError>) {
        self.token_replies.lock().unwrap().push_back(reply);
    }

    pub fn total_calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
            + self.token_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
            + self.request_calls.load(Ordering::SeqCst)
            + self.updates.lock().unwrap().len()
    }

    pub fn updates(&self) -> Vec<SettingsPatch> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThermostatApi for FakeThermostat {
    async fn authorize(&self) -> Result<AuthorizationGrant, ApiError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(grant())
    }

    async fn request_tokens(&self, _code: &str) -> Result<TokenGrant, ApiError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.token_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ApiError::AuthorizationPending))
    }

    async fn refresh_tokens(&self, _refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(tokens("access-refreshed"))
    }

    async fn request(
        &self,
        _access_token: &str,
        _selection: &Selection,
    ) -> Result<Thermostat, ApiError> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        self.thermostat
            .lock()
            .unwrap()
            .clone()
            .ok_or(ApiError::NoThermostat)
    }

    async fn update(
        &self,
        _access_token: &str,
        _selection: &Selection,
        settings: &SettingsPatch,
    ) -> Result<(), ApiError> {
        self.updates.lock().unwrap().push(settings.clone());
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ApiError::Api {
                code: 3,
                message: "Processing error.".to_string(),
            });
        }
        Ok(())
    }
}

pub struct FakeWeather {
    current: f64,
    forecast: Vec<ForecastPoint>,
}

impl FakeWeather {
    pub fn new(current: f64, forecast: Vec<ForecastPoint>) -> Self {
        Self { current, forecast }
    }

    /// Steady temperatures with forecast points every three hours around `now`.
    pub fn steady(now: DateTime<Utc>, current: f64, later: f64) -> Self {
        let forecast = (0..4)
            .map(|step| ForecastPoint {
                reference_time: now + Duration::hours(3 * step),
                temperature_f: later,
            })
            .collect();
        Self::new(current, forecast)
    }
}

#[async_trait]
impl WeatherApi for FakeWeather {
    async fn current_temperature(&self, _location: &WeatherLocation) -> Result<f64, WeatherError> {
        Ok(self.current)
    }

    async fn forecast(
        &self,
        _location: &WeatherLocation,
    ) -> Result<Vec<ForecastPoint>, WeatherError> {
        Ok(self.forecast.clone())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub sessions: Mutex<HashMap<String, Session>>,
    pub puts: AtomicUsize,
    pub fail: AtomicBool,
}

impl MemoryStore {
    pub fn with_session(key: &str, session: Session) -> Self {
        let store = Self::default();
        store
            .sessions
            .lock()
            .unwrap()
            .insert(key.to_string(), session);
        store
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn session(&self, key: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(key).cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Session>, StoreError> {
        self.check()?;
        Ok(self.session(key))
    }

    async fn put(&self, key: &str, session: &Session) -> Result<(), StoreError> {
        self.check()?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .insert(key.to_string(), session.clone());
        Ok(())
    }
}

/// A Monday morning: 07:40 on Jan 5 2026, heating, three remote sensors.
pub fn sample_thermostat() -> Thermostat {
    let weekday: Vec<&str> = (0..48)
        .map(|slot| match slot {
            0..=11 => "sleep",
            12..=15 => "home",
            16..=33 => "away",
            34..=43 => "home",
            _ => "sleep",
        })
        .collect();
    let weekend = vec!["home"; 48];
    let schedule = vec![
        weekday.clone(),
        weekday.clone(),
        weekday.clone(),
        weekday.clone(),
        weekday,
        weekend.clone(),
        weekend,
    ];

    let sensor = |name: &str, temp: &str, occupied: &str| {
        json!({
            "id": format!("rs:{name}"),
            "name": name,
            "type": "ecobee3_remote_sensor",
            "capability": [
                {"id": "1", "type": "temperature", "value": temp},
                {"id": "2", "type": "occupancy", "value": occupied}
            ]
        })
    };

    serde_json::from_value(json!({
        "identifier": "411900000000",
        "name": "My Thermostat",
        "thermostatTime": "2026-01-05 07:40:00",
        "equipmentStatus": "",
        "runtime": {
            "actualTemperature": 700,
            "actualHumidity": 38,
            "desiredHeat": 700,
            "desiredCool": 780
        },
        "settings": {
            "hvacMode": "heat",
            "humidity": "30",
            "humidifierMode": "manual",
            "fanMinOnTime": 35,
            "backlightOffDuringSleep": false,
            "backlightOffTime": 20,
            "backlightSleepIntensity": 1,
            "backlightOnIntensity": 9
        },
        "program": {
            "schedule": schedule,
            "climates": [
                {"name": "Home", "climateRef": "home", "heatTemp": 700, "coolTemp": 780},
                {"name": "Away", "climateRef": "away", "heatTemp": 620, "coolTemp": 830},
                {"name": "Sleep", "climateRef": "sleep", "heatTemp": 660, "coolTemp": 800}
            ],
            "currentClimateRef": "home"
        },
        "remoteSensors": [
            sensor("Bedroom", "680", "false"),
            sensor("Kitchen", "700", "true"),
            sensor("Office", "650", "false")
        ],
        "events": []
    }))
    .unwrap()
}
