//! Live data service for the Colony console.
//!
//! Keeps an eventually consistent picture of the rooms and workers behind
//! the resource API and turns everything that happens in them into a
//! short-lived activity feed served by the observer.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `colony-config.yaml` plus environment
//! 3. Spawn the room and worker pollers
//! 4. Spawn the activity engine (live, optionally with simulated extras)
//! 5. Start the observer HTTP/WebSocket server
//! 6. Connect the NATS push transport (optional)
//! 7. Route push notifications to early poller refreshes
//! 8. Feed poll results to the engine until Ctrl-C

mod bridge;
mod client;
mod config;
mod error;
mod transport;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use colony_observer::{AppState, spawn_observer};
use colony_sync::{ActivityEngine, ChannelMux, EventSource, PollHandle, producer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::bridge::{GenerationGate, Resource};
use crate::client::ResourceClient;
use crate::config::{ConfigError, ConsoleConfig};
use crate::error::ConsoleError;
use crate::transport::NatsTransport;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "colony-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the observer cannot start,
/// or the shutdown signal cannot be installed.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("colony-console starting");

    // 2. Load configuration.
    let config = load_config().context("loading configuration")?;
    info!(
        api_url = config.api.url,
        rooms_interval_ms = config.polling.rooms.interval_ms,
        workers_interval_ms = config.polling.workers.interval_ms,
        simulate = config.activity.simulate,
        "Configuration loaded"
    );

    run(config).await.context("running console service")?;

    info!("colony-console shutdown complete");
    Ok(())
}

/// Load `colony-config.yaml` if present, else defaults. Environment
/// overrides apply either way.
fn load_config() -> Result<ConsoleConfig, ConfigError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        ConsoleConfig::from_file(config_path)
    } else {
        info!("Config file not found, using defaults");
        let mut config = ConsoleConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }
}

async fn run(config: ConsoleConfig) -> Result<(), ConsoleError> {
    let mux = ChannelMux::new();
    let client = ResourceClient::new(&config.api)?;

    // 3. Pollers.
    let rooms = PollHandle::spawn(
        "rooms",
        producer({
            let client = client.clone();
            move || {
                let client = client.clone();
                async move { client.list_rooms().await }
            }
        }),
        &config.polling.rooms,
    );
    let workers = PollHandle::spawn(
        "workers",
        producer(move || {
            let client = client.clone();
            async move { client.list_workers().await }
        }),
        &config.polling.workers,
    );

    // 4. Activity engine.
    let source = EventSource::from_flag(config.activity.simulate);
    let simulated = source.is_simulated();
    let engine = ActivityEngine::spawn(&mux, &config.activity, source);
    if simulated {
        info!("Simulated activity enabled alongside live events");
    }

    // 5. Observer.
    let app_state = Arc::new(AppState::new(engine.view()));
    app_state.update_status(|s| s.simulated = simulated).await;
    let observer = spawn_observer(config.observer.clone(), Arc::clone(&app_state))?;

    // 6. Push transport. Polling alone still keeps the data fresh.
    let transport = connect_transport(&config, &mux).await;

    // 7. Push to pull.
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
    let triggers = bridge::refresh_triggers(&mux, &refresh_tx);

    // 8. Main loop.
    let mut rooms_rx = rooms.subscribe();
    let mut workers_rx = workers.subscribe();
    let mut rooms_gate = GenerationGate::default();
    let mut workers_gate = GenerationGate::default();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Console service running, press Ctrl-C to stop");
    let signal = loop {
        tokio::select! {
            biased;
            result = &mut shutdown => break result,
            Ok(()) = rooms_rx.changed() => {
                let state = rooms_rx.borrow_and_update().clone();
                if let Some(fresh) = rooms_gate.fresh(&state) {
                    engine.update_rooms(fresh.clone());
                }
                app_state.update_status(|s| bridge::record_rooms(s, &state)).await;
            }
            Ok(()) = workers_rx.changed() => {
                let state = workers_rx.borrow_and_update().clone();
                if let Some(fresh) = workers_gate.fresh(&state) {
                    engine.observe_workers(fresh.clone());
                }
                app_state.update_status(|s| bridge::record_workers(s, &state)).await;
            }
            Some(resource) = refresh_rx.recv() => match resource {
                Resource::Rooms => rooms.refresh(),
                Resource::Workers => workers.refresh(),
            },
        }
    };
    info!("Shutdown requested");

    drop(triggers);
    observer.abort();
    if let Some(transport) = transport {
        transport.abort();
    }
    rooms.shutdown().await;
    workers.shutdown().await;
    engine.shutdown().await;

    signal.map_err(|source| ConsoleError::Signal { source })
}

/// Connect and start the push transport, or log why it is unavailable.
async fn connect_transport(config: &ConsoleConfig, mux: &ChannelMux) -> Option<JoinHandle<()>> {
    let started = match NatsTransport::connect(&config.transport).await {
        Ok(transport) => transport.spawn(mux.clone()).await,
        Err(e) => Err(e),
    };
    match started {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Push transport unavailable, continuing with polling only");
            None
        }
    }
}
