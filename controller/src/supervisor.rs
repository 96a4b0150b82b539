use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    auth::TokenManager,
    cycle::ControlLoop,
    ecobee::{EcobeeClient, ThermostatApi},
    settings::Settings,
    store::{JsonFileStore, SessionStore},
    weather::OwmClient,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;
    info!(
        "controlling {:?}, session file {}",
        settings.thermostat_name,
        settings.session_path().display()
    );

    let thermostat = EcobeeClient::new(&settings.ecobee_base_url, &settings.ecobee_api_key);
    let weather = OwmClient::new(&settings.owm_base_url, &settings.owm_api_key);
    let store = JsonFileStore::new(settings.session_path());

    let cancel = CancellationToken::new();
    spawn_signal_task(cancel.clone());

    let result = ControlLoop::new(&settings, &thermostat, &weather, &store, &cancel)
        .run()
        .await;
    if let Err(err) = &result {
        warn!("control loop failed: {err}");
    }

    shutdown(&settings, &thermostat, &store, &cancel).await;
    result.context("control loop stopped")
}

/// Restores unattended thermostat settings. Every step is best-effort.
async fn shutdown(
    settings: &Settings,
    thermostat: &dyn ThermostatApi,
    store: &dyn SessionStore,
    cancel: &CancellationToken,
) {
    info!("shutting down");
    let mut tokens = match TokenManager::load(
        &settings.thermostat_name,
        thermostat,
        store,
        cancel,
        false,
    )
    .await
    {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!("could not load session for shutdown: {err}");
            return;
        }
    };

    if let Err(err) = tokens.ensure_valid(true).await {
        warn!("could not validate token for shutdown: {err}");
    }
    if let Err(err) = tokens
        .graceful_shutdown(settings.control.fan.shutdown_minutes)
        .await
    {
        warn!("could not save session on shutdown: {err}");
    }
}

fn spawn_signal_task(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("stop requested");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            warn!("SIGTERM handler unavailable: {err}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
