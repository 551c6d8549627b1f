//! Telemetry server binary for the Homewatt appliance simulator.
//!
//! This is the main entry point that wires together the fleet, the tick
//! scheduler, the subscriber hub, and the HTTP + `WebSocket` server. It
//! loads configuration, starts both halves, and runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `homewatt-config.yaml` (or `HOMEWATT_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Resolve the random seed and build the fleet
//! 4. Create operator state and the subscriber hub
//! 5. Bind and spawn the telemetry server
//! 6. Spawn the tick scheduler
//!
//! # Shutdown Sequence
//!
//! On `Ctrl-C` the operator stop signal fires. The scheduler exits at its
//! next suspension point and is awaited, every subscriber queue is closed
//! so the `WebSocket` tasks end, and the server drains and is awaited.

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use homewatt_core::clock::SystemClock;
use homewatt_core::config::{LogFormat, LoggingConfig, SimulationConfig};
use homewatt_core::fleet::Fleet;
use homewatt_core::operator::OperatorState;
use homewatt_core::runner;
use homewatt_hub::{AppState, SubscriberHub};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ServerAppError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "homewatt-config.yaml";

/// Environment variable naming an alternative configuration file.
const CONFIG_PATH_ENV: &str = "HOMEWATT_CONFIG";

/// Longest the server may take to drain after the scheduler has stopped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Application entry point for the telemetry server.
///
/// # Errors
///
/// Returns an error if configuration, logging, or the server bind fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await?;
    Ok(())
}

async fn run() -> Result<(), ServerAppError> {
    // 1. Load configuration.
    let config_path = config_path(|key| std::env::var(key).ok());
    let (config, loaded_from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;

    info!("homewatt-server starting");
    if loaded_from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    // 3. Resolve the seed and build the fleet.
    let seed = config.simulation.seed.unwrap_or_else(rand::random);
    let mut fleet = Fleet::from_config(&config, seed, Utc::now())?;
    info!(
        seed,
        devices = fleet.len(),
        tick_interval_ms = config.simulation.tick_interval_ms,
        unit_price_per_kwh = config.simulation.unit_price_per_kwh,
        "Fleet initialized"
    );

    // 4. Create operator state and the subscriber hub.
    let operator = Arc::new(OperatorState::new(config.simulation.tick_interval_ms));
    let hub = Arc::new(SubscriberHub::new(config.server.subscriber_buffer));
    let app_state = Arc::new(
        AppState::new(Arc::clone(&hub), Arc::clone(&operator))
            .with_send_timeout(Duration::from_millis(config.server.send_timeout_ms)),
    );

    // 5. Start the telemetry server.
    let server = homewatt_hub::spawn_server(&config.server, app_state).await?;
    info!(addr = %server.addr, "Telemetry server started");

    // 6. Start the tick scheduler.
    let scheduler = {
        let operator = Arc::clone(&operator);
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let clock = SystemClock;
            runner::run_scheduler(&mut fleet, &clock, &operator, hub.as_ref()).await
        })
    };

    // Run until interrupted.
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown requested");

    operator.request_stop();
    let report = scheduler.await?;
    runner::log_scheduler_end(&report);

    let closed = hub.close_all();
    info!(closed, "Subscriber queues closed");

    match tokio::time::timeout(SHUTDOWN_GRACE, server.handle).await {
        Ok(joined) => joined?,
        Err(_elapsed) => warn!("Telemetry server did not drain in time"),
    }

    info!("homewatt-server stopped");
    Ok(())
}

/// Resolve the configuration file path, preferring `HOMEWATT_CONFIG`.
fn config_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup(CONFIG_PATH_ENV)
        .filter(|p| !p.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration from `path`, falling back to defaults if the file
/// does not exist. Environment overrides apply either way.
///
/// Returns the configuration and whether it came from the file.
fn load_config(path: &Path) -> Result<(SimulationConfig, bool), ServerAppError> {
    if path.exists() {
        let config = SimulationConfig::from_file(path)?;
        Ok((config, true))
    } else {
        let mut config = SimulationConfig::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok((config, false))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), ServerAppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| ServerAppError::Logging {
            message: format!("invalid log level {:?}: {e}", logging.level),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match logging.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| ServerAppError::Logging {
        message: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_path_defaults_without_env() {
        assert_eq!(config_path(|_| None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn config_path_honours_env() {
        let path = config_path(|key| (key == CONFIG_PATH_ENV).then(|| "/etc/homewatt.yaml".to_owned()));
        assert_eq!(path, PathBuf::from("/etc/homewatt.yaml"));
    }

    #[test]
    fn blank_env_path_is_ignored() {
        let path = config_path(|_| Some("  ".to_owned()));
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn missing_file_yields_default_fleet() {
        let (config, from_file) =
            load_config(Path::new("/definitely/not/here/homewatt-config.yaml")).unwrap();
        assert!(!from_file);
        assert_eq!(config.fleet.len(), 8);
    }
}
