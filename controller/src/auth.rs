//! ecobee PIN authorization and token upkeep.
//!
//! Every change to the session is written to the store before the next
//! network call, so a restart resumes an interrupted authorization instead of
//! starting over.

use std::time::Duration;

use chrono::Utc;
use climate_common::{BacklightSettings, HumidifierMode, Session, TokenState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    ecobee::{Selection, SettingsPatch, ThermostatApi},
    error::{ApiError, AuthError, StoreError},
    store::SessionStore,
    wait::wait,
};

/// Countdown cadence while the user enters the PIN.
const PIN_PROGRESS_TICK: Duration = Duration::from_secs(5);

pub struct TokenManager<'a> {
    device: &'a str,
    api: &'a dyn ThermostatApi,
    store: &'a dyn SessionStore,
    cancel: &'a CancellationToken,
    show_progress: bool,
    session: Session,
}

impl<'a> TokenManager<'a> {
    /// Loads the session for `device`, or starts an empty one.
    pub async fn load(
        device: &'a str,
        api: &'a dyn ThermostatApi,
        store: &'a dyn SessionStore,
        cancel: &'a CancellationToken,
        show_progress: bool,
    ) -> Result<Self, StoreError> {
        let session = store.get(device).await?.unwrap_or_default();
        Ok(Self {
            device,
            api,
            store,
            cancel,
            show_progress,
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session.access_token.as_deref()
    }

    pub async fn persist(&self) -> Result<(), StoreError> {
        self.store.put(self.device, &self.session).await
    }

    /// Makes sure a usable access token exists, authorizing or refreshing as
    /// needed. With `fail_fast` nothing that involves the user is attempted.
    pub async fn ensure_valid(&mut self, fail_fast: bool) -> Result<bool, AuthError> {
        let valid = self.obtain(fail_fast).await?;
        if valid != self.session.got_token {
            self.session.got_token = valid;
            self.persist().await?;
        }
        Ok(valid)
    }

    async fn obtain(&mut self, fail_fast: bool) -> Result<bool, AuthError> {
        match self.session.token_state(Utc::now()) {
            TokenState::HasAccessToken => Ok(true),
            TokenState::RefreshNeeded => {
                self.refresh().await?;
                Ok(true)
            }
            _ if fail_fast => Ok(false),
            TokenState::AuthorizationPending => self.wait_for_token().await,
            TokenState::NoToken => {
                self.authorize().await?;
                self.wait_for_token().await
            }
            TokenState::ReauthorizeNeeded => {
                info!("refresh token expired, authorization required");
                self.authorize().await?;
                self.wait_for_token().await
            }
        }
    }

    /// Requests a new PIN, records it and waits one polling interval.
    pub async fn authorize(&mut self) -> Result<(), AuthError> {
        let grant = self.api.authorize().await?;
        self.session.begin_authorization(&grant, Utc::now());
        self.persist().await?;

        info!(
            "Log in to ecobee.com, open My Apps, choose Add Application and enter PIN '{}' \
             within {} minutes to authorize this controller",
            grant.pin, grant.expires_in_minutes
        );
        self.pause_for_pin().await;
        Ok(())
    }

    /// Polls until a token is issued. Returns `false` if stopped first.
    pub async fn wait_for_token(&mut self) -> Result<bool, AuthError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let code = match self.session.authorization_code.clone() {
                Some(code) if self.session.authorization_open(Utc::now()) => code,
                Some(_) => {
                    info!("authorization window closed, requesting a new PIN");
                    self.authorize().await?;
                    continue;
                }
                None => {
                    self.authorize().await?;
                    continue;
                }
            };

            match self.api.request_tokens(&code).await {
                Ok(grant) => {
                    self.session.apply_tokens(&grant, Utc::now());
                    self.persist().await?;
                    info!("authorization complete");
                    return Ok(true);
                }
                Err(ApiError::AuthorizationPending) => {
                    debug!("authorization pending");
                    self.pause_for_pin().await;
                }
                Err(ApiError::AuthorizationExpired) => {
                    info!("authorization expired, requesting a new PIN");
                    self.authorize().await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn refresh(&mut self) -> Result<(), AuthError> {
        let refresh_token = self
            .session
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;
        let grant = self.api.refresh_tokens(&refresh_token).await?;
        self.session.apply_tokens(&grant, Utc::now());
        self.persist().await?;
        debug!("access token refreshed");
        Ok(())
    }

    /// Saves the device's backlight profile if it is worth restoring later.
    pub async fn remember_backlight(
        &mut self,
        current: &BacklightSettings,
    ) -> Result<(), StoreError> {
        if self.session.remember_backlight(current) {
            debug!("saved backlight profile {current:?}");
            self.persist().await?;
        }
        Ok(())
    }

    /// Puts the thermostat back in a sensible unattended state and persists
    /// the session. Only the store failure is returned.
    pub async fn graceful_shutdown(&mut self, fan_minutes: u32) -> Result<(), StoreError> {
        if self.session.got_token {
            match self.access_token() {
                Some(token) => {
                    let patch = SettingsPatch::default()
                        .with_backlight(self.session.restore_backlight())
                        .with_fan_min_on_time(fan_minutes)
                        .with_humidifier_mode(HumidifierMode::Auto);
                    match self.api.update(token, &Selection::registered(), &patch).await {
                        Ok(()) => info!("thermostat restored to unattended settings"),
                        Err(err) => warn!("failed to restore thermostat settings: {err}"),
                    }
                }
                None => warn!("no access token, thermostat settings left as they are"),
            }
        }
        self.persist().await
    }

    async fn pause_for_pin(&self) {
        let interval = Duration::from_secs(self.session.authorization_interval_secs.max(1));
        let pin = self.session.authorization_pin.as_deref().unwrap_or_default();
        let message = format!(" waiting, please enter '{pin}'...");
        wait(
            interval,
            PIN_PROGRESS_TICK,
            self.cancel,
            self.show_progress,
            &message,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{grant, tokens, valid_session, FakeThermostat, MemoryStore};

    const DEVICE: &str = "My Thermostat";

    #[tokio::test(start_paused = true)]
    async fn valid_token_needs_no_calls() {
        let api = FakeThermostat::default();
        let store = MemoryStore::with_session(DEVICE, valid_session(Utc::now()));
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        assert!(manager.ensure_valid(false).await.unwrap());
        assert!(manager.ensure_valid(true).await.unwrap());

        assert_eq!(api.total_calls(), 0);
        assert_eq!(store.puts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_token_persists_once_after_success() {
        let api = FakeThermostat::default();
        api.push_token_reply(Err(ApiError::AuthorizationPending));
        api.push_token_reply(Err(ApiError::AuthorizationPending));
        api.push_token_reply(Ok(tokens("access-1")));
        let store = MemoryStore::default();
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        manager.authorize().await.unwrap();
        assert_eq!(store.puts(), 1);
        assert_eq!(
            store.session(DEVICE).unwrap().authorization_pin.as_deref(),
            Some("BXKD")
        );

        assert!(manager.wait_for_token().await.unwrap());

        assert_eq!(store.puts(), 2);
        assert_eq!(api.token_calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            store.session(DEVICE).unwrap().access_token.as_deref(),
            Some("access-1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_authorizes_and_marks_got_token() {
        let api = FakeThermostat::default();
        api.push_token_reply(Err(ApiError::AuthorizationPending));
        api.push_token_reply(Ok(tokens("access-1")));
        let store = MemoryStore::default();
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, true)
            .await
            .unwrap();

        assert!(manager.ensure_valid(false).await.unwrap());

        let saved = store.session(DEVICE).unwrap();
        assert!(saved.got_token);
        assert_eq!(saved.token_state(Utc::now()), TokenState::HasAccessToken);
        assert_eq!(api.authorize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_never_prompts_the_user() {
        let api = FakeThermostat::default();
        let store = MemoryStore::default();
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        assert!(!manager.ensure_valid(true).await.unwrap());
        assert_eq!(api.total_calls(), 0);
        assert_eq!(store.puts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_access_token_is_refreshed_even_when_failing_fast() {
        let now = Utc::now();
        let mut session = valid_session(now);
        session.access_token_expiry = Some(now - ChronoDuration::minutes(1));
        let api = FakeThermostat::default();
        let store = MemoryStore::with_session(DEVICE, session);
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        assert!(manager.ensure_valid(true).await.unwrap());

        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.access_token(), Some("access-refreshed"));
        assert_eq!(
            store.session(DEVICE).unwrap().refresh_token.as_deref(),
            Some("refresh-for-access-refreshed")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_refresh_token_requires_new_authorization() {
        let now = Utc::now();
        let mut session = valid_session(now - ChronoDuration::days(400));
        session.got_token = true;
        let api = FakeThermostat::default();
        api.push_token_reply(Ok(tokens("access-2")));
        let store = MemoryStore::with_session(DEVICE, session);
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        assert!(manager.ensure_valid(false).await.unwrap());
        assert_eq!(api.authorize_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.access_token(), Some("access-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_request_ends_polling_without_error() {
        let api = FakeThermostat::default();
        let store = MemoryStore::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(95)).await;
            trigger.cancel();
        });
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        assert!(!manager.ensure_valid(false).await.unwrap());

        let saved = store.session(DEVICE).unwrap();
        assert_eq!(saved.token_state(Utc::now()), TokenState::AuthorizationPending);
        assert!(!saved.got_token);
        assert!(api.token_calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_window_requests_a_new_pin() {
        let now = Utc::now();
        let mut session = Session::default();
        session.begin_authorization(&grant(), now - ChronoDuration::minutes(30));
        let api = FakeThermostat::default();
        api.push_token_reply(Ok(tokens("access-1")));
        let store = MemoryStore::with_session(DEVICE, session);
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        assert!(manager.wait_for_token().await.unwrap());
        assert_eq!(api.authorize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_expiry_restarts_authorization() {
        let api = FakeThermostat::default();
        api.push_token_reply(Err(ApiError::AuthorizationExpired));
        api.push_token_reply(Ok(tokens("access-1")));
        let store = MemoryStore::default();
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        assert!(manager.ensure_valid(false).await.unwrap());
        assert_eq!(api.authorize_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_rejections_propagate() {
        let api = FakeThermostat::default();
        api.push_token_reply(Err(ApiError::Authorization {
            error: "access_denied".to_string(),
            description: "The user denied the request.".to_string(),
        }));
        let store = MemoryStore::default();
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        let err = manager.ensure_valid(false).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Api(ApiError::Authorization { .. })
        ));
    }

    #[tokio::test]
    async fn backlight_profile_saved_once() {
        let api = FakeThermostat::default();
        let store = MemoryStore::default();
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        manager
            .remember_backlight(&BacklightSettings::OFF)
            .await
            .unwrap();
        assert_eq!(store.puts(), 0);

        manager
            .remember_backlight(&BacklightSettings::DEFAULT_ON)
            .await
            .unwrap();
        manager
            .remember_backlight(&BacklightSettings::DEFAULT_ON)
            .await
            .unwrap();
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn shutdown_restores_settings_in_one_update() {
        let custom = BacklightSettings {
            off_during_sleep: false,
            off_time: 30,
            sleep_intensity: 2,
            on_intensity: 7,
        };
        let mut session = valid_session(Utc::now());
        session.backlight = Some(custom);
        let api = FakeThermostat::default();
        let store = MemoryStore::with_session(DEVICE, session);
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        manager.graceful_shutdown(20).await.unwrap();

        assert_eq!(
            api.updates(),
            vec![SettingsPatch::default()
                .with_backlight(custom)
                .with_fan_min_on_time(20)
                .with_humidifier_mode(HumidifierMode::Auto)]
        );
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn shutdown_persists_even_when_restore_fails() {
        let api = FakeThermostat::default();
        api.fail_updates.store(true, Ordering::SeqCst);
        let store = MemoryStore::with_session(DEVICE, valid_session(Utc::now()));
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        manager.graceful_shutdown(20).await.unwrap();

        assert_eq!(api.updates().len(), 1);
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn shutdown_without_token_only_persists() {
        let api = FakeThermostat::default();
        let store = MemoryStore::default();
        let cancel = CancellationToken::new();
        let mut manager = TokenManager::load(DEVICE, &api, &store, &cancel, false)
            .await
            .unwrap();

        manager.graceful_shutdown(20).await.unwrap();

        assert_eq!(api.total_calls(), 0);
        assert_eq!(store.puts(), 1);
    }
}
