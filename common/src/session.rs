//! Persisted OAuth session for one thermostat.
//!
//! The session moves through
//! `NoToken -> AuthorizationPending -> HasAccessToken -> (RefreshNeeded | ReauthorizeNeeded)`
//! and is written to the store after every change, so an interrupted
//! device-authorization flow resumes where it stopped.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::BacklightSettings;

/// The vendor does not report refresh-token lifetime; it is one year.
pub const REFRESH_TOKEN_LIFETIME_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    AuthorizationPending,
    HasAccessToken,
    RefreshNeeded,
    ReauthorizeNeeded,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authorization_code: Option<String>,
    #[serde(default)]
    pub authorization_pin: Option<String>,
    #[serde(default)]
    pub authorization_interval_secs: u64,
    #[serde(default)]
    pub authorization_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub backlight: Option<BacklightSettings>,
    #[serde(default)]
    pub got_token: bool,
}

/// Pending device-authorization grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub pin: String,
    pub code: String,
    pub interval_secs: u64,
    pub expires_in_minutes: i64,
}

/// Tokens issued for a grant or a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_secs: i64,
}

impl Session {
    pub fn token_state(&self, now: DateTime<Utc>) -> TokenState {
        if self.authorization_code.is_none() {
            return TokenState::NoToken;
        }
        if self.access_token.is_none() {
            return TokenState::AuthorizationPending;
        }
        if self.refresh_token.is_none() || expired(self.refresh_token_expiry, now) {
            return TokenState::ReauthorizeNeeded;
        }
        if expired(self.access_token_expiry, now) {
            return TokenState::RefreshNeeded;
        }
        TokenState::HasAccessToken
    }

    /// Starts a new device-authorization window. Old tokens are dropped so an
    /// interrupted flow resumes as pending rather than as expired.
    pub fn begin_authorization(&mut self, grant: &AuthorizationGrant, now: DateTime<Utc>) {
        self.authorization_code = Some(grant.code.clone());
        self.authorization_pin = Some(grant.pin.clone());
        self.authorization_interval_secs = grant.interval_secs;
        self.authorization_expiry = Some(now + Duration::minutes(grant.expires_in_minutes));
        self.access_token = None;
        self.refresh_token = None;
        self.access_token_expiry = None;
        self.refresh_token_expiry = None;
    }

    pub fn authorization_open(&self, now: DateTime<Utc>) -> bool {
        self.authorization_expiry
            .map(|expiry| now < expiry)
            .unwrap_or(false)
    }

    pub fn apply_tokens(&mut self, grant: &TokenGrant, now: DateTime<Utc>) {
        self.access_token = Some(grant.access_token.clone());
        let refresh_expiry = match &grant.refresh_token {
            Some(refresh) => {
                self.refresh_token = Some(refresh.clone());
                let expiry = now + Duration::days(REFRESH_TOKEN_LIFETIME_DAYS);
                self.refresh_token_expiry = Some(expiry);
                Some(expiry)
            }
            None => self.refresh_token_expiry,
        };

        let access_expiry = now + Duration::seconds(grant.expires_in_secs);
        self.access_token_expiry = Some(match refresh_expiry {
            Some(limit) if access_expiry > limit => limit,
            _ => access_expiry,
        });
    }

    /// Stores `current` as the profile to restore, unless it is the off
    /// profile or already stored. Returns whether anything changed.
    pub fn remember_backlight(&mut self, current: &BacklightSettings) -> bool {
        if *current == BacklightSettings::OFF || self.backlight.as_ref() == Some(current) {
            return false;
        }
        self.backlight = Some(*current);
        true
    }

    pub fn restore_backlight(&self) -> BacklightSettings {
        self.backlight.unwrap_or(BacklightSettings::DEFAULT_ON)
    }
}

fn expired(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiry.map(|at| now > at).unwrap_or(true)
}
