//! Configuration loading and typed config structures for the Homewatt simulator.
//!
//! The canonical configuration lives in `homewatt-config.yaml` at the
//! working directory. This module defines strongly-typed structs that mirror
//! the YAML structure, and provides a loader that reads and validates the file.
//! Every section is optional; a missing file means the reference fleet of
//! eight household appliances with the default device model.

use std::collections::BTreeSet;
use std::path::Path;

use homewatt_types::ApplianceId;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an impossible simulation.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulator configuration.
///
/// Mirrors the structure of `homewatt-config.yaml`. All fields have
/// defaults matching the reference household.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Run-level settings (seed, tick period, tariff).
    #[serde(default)]
    pub simulation: RunConfig,

    /// Parameters of the per-device state machine.
    #[serde(default)]
    pub device_model: DeviceModelConfig,

    /// The fixed, ordered fleet of appliances.
    #[serde(default = "default_fleet")]
    pub fleet: Vec<ApplianceSpec>,

    /// Telemetry server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `HOMEWATT_HOST` overrides `server.host`
    /// - `HOMEWATT_PORT` overrides `server.port`
    /// - `HOMEWATT_SEED` overrides `simulation.seed`
    ///
    /// The result is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config = Self::from_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Deserialize without validating. An empty or comment-only document
    /// yields the defaults.
    fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: serde_yml::Value = serde_yml::from_str(yaml)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_value(value)?)
    }

    /// Override settings from environment-style lookups.
    ///
    /// `lookup` returns the value for a variable name, or `None` when the
    /// variable is unset. Taking a closure keeps tests free of process-wide
    /// environment mutation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric override does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOMEWATT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("HOMEWATT_PORT") {
            self.server.port = port.trim().parse().map_err(|e| ConfigError::Invalid {
                reason: format!("HOMEWATT_PORT is not a valid port ({port}): {e}"),
            })?;
        }
        if let Some(seed) = lookup("HOMEWATT_SEED") {
            let parsed = seed.trim().parse().map_err(|e| ConfigError::Invalid {
                reason: format!("HOMEWATT_SEED is not a valid u64 ({seed}): {e}"),
            })?;
            self.simulation.seed = Some(parsed);
        }
        Ok(())
    }

    /// Check cross-field invariants the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.tick_interval_ms == 0 {
            return Err(invalid("simulation.tick_interval_ms must be at least 1"));
        }
        if !self.simulation.unit_price_per_kwh.is_finite()
            || self.simulation.unit_price_per_kwh < 0.0
        {
            return Err(invalid("simulation.unit_price_per_kwh must be a non-negative number"));
        }

        self.device_model.validate()?;

        if self.fleet.is_empty() {
            return Err(invalid("fleet must contain at least one appliance"));
        }
        let mut seen = BTreeSet::new();
        for spec in &self.fleet {
            if !seen.insert(&spec.id) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate appliance id {}", spec.id),
                });
            }
            if !spec.max_power.is_finite() || spec.max_power <= 0.0 {
                return Err(ConfigError::Invalid {
                    reason: format!("appliance {} has non-positive max_power", spec.id),
                });
            }
        }

        if self.server.subscriber_buffer == 0 {
            return Err(invalid("server.subscriber_buffer must be at least 1"));
        }
        if self.server.port_attempts == 0 {
            return Err(invalid("server.port_attempts must be at least 1"));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation: RunConfig::default(),
            device_model: DeviceModelConfig::default(),
            fleet: default_fleet(),
            server: ServerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    /// Random seed for reproducibility. A fresh seed is drawn (and logged)
    /// when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Real-time milliseconds slept between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Electricity tariff per kilowatt-hour.
    #[serde(default = "default_unit_price_per_kwh")]
    pub unit_price_per_kwh: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tick_interval_ms: default_tick_interval_ms(),
            unit_price_per_kwh: default_unit_price_per_kwh(),
        }
    }
}

/// Inclusive band of power draw expressed as a fraction of `max_power`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PowerBand {
    /// Lower bound (fraction of capacity).
    pub min: f64,
    /// Upper bound (fraction of capacity).
    pub max: f64,
}

impl PowerBand {
    /// Whether `watts` lies in this band for an appliance of `max_power`.
    pub fn contains(&self, watts: f64, max_power: f64) -> bool {
        watts >= self.min * max_power && watts <= self.max * max_power
    }

    fn is_well_formed(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min > 0.0 && self.min <= self.max
    }
}

/// Parameters of the per-device stochastic state machine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceModelConfig {
    /// Minimum seconds a device must stay on or off before it may flip.
    #[serde(default = "default_min_dwell_secs")]
    pub min_dwell_secs: u64,

    /// Per-tick probability of flipping once the dwell time has elapsed.
    #[serde(default = "default_switch_probability")]
    pub switch_probability: f64,

    /// Per-tick probability of raising an anomaly while on and eligible.
    #[serde(default = "default_anomaly_probability")]
    pub anomaly_probability: f64,

    /// Seconds after an anomaly is raised during which no new one may start.
    #[serde(default = "default_anomaly_cooldown_secs")]
    pub anomaly_cooldown_secs: u64,

    /// Seconds after an anomaly is raised before it clears.
    #[serde(default = "default_anomaly_duration_secs")]
    pub anomaly_duration_secs: u64,

    /// Power band while on and healthy.
    #[serde(default = "default_normal_band")]
    pub normal_band: PowerBand,

    /// Power band while an anomaly is active.
    #[serde(default = "default_anomaly_band")]
    pub anomaly_band: PowerBand,

    /// Centre of the weekly usage profile, as a fraction of a full day at capacity.
    #[serde(default = "default_weekly_baseline_fraction")]
    pub weekly_baseline_fraction: f64,

    /// Half-width of the weekly usage variation, same units as the baseline.
    #[serde(default = "default_weekly_variation_fraction")]
    pub weekly_variation_fraction: f64,
}

impl DeviceModelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("switch_probability", self.switch_probability),
            ("anomaly_probability", self.anomaly_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid {
                    reason: format!("device_model.{name} must lie in [0, 1], got {p}"),
                });
            }
        }
        if !self.normal_band.is_well_formed() {
            return Err(invalid("device_model.normal_band must satisfy 0 < min <= max"));
        }
        if !self.anomaly_band.is_well_formed() {
            return Err(invalid("device_model.anomaly_band must satisfy 0 < min <= max"));
        }
        if self.anomaly_band.min <= self.normal_band.max {
            return Err(invalid(
                "device_model.anomaly_band must lie strictly above normal_band",
            ));
        }
        let low = self.weekly_baseline_fraction - self.weekly_variation_fraction;
        if !low.is_finite() || low < 0.0 || self.weekly_variation_fraction < 0.0 {
            return Err(invalid(
                "device_model weekly baseline minus variation must be non-negative",
            ));
        }
        Ok(())
    }
}

impl Default for DeviceModelConfig {
    fn default() -> Self {
        Self {
            min_dwell_secs: default_min_dwell_secs(),
            switch_probability: default_switch_probability(),
            anomaly_probability: default_anomaly_probability(),
            anomaly_cooldown_secs: default_anomaly_cooldown_secs(),
            anomaly_duration_secs: default_anomaly_duration_secs(),
            normal_band: default_normal_band(),
            anomaly_band: default_anomaly_band(),
            weekly_baseline_fraction: default_weekly_baseline_fraction(),
            weekly_variation_fraction: default_weekly_variation_fraction(),
        }
    }
}

/// Static description of one appliance in the fleet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplianceSpec {
    /// Stable id, unique within the fleet.
    pub id: ApplianceId,
    /// Display name.
    pub name: String,
    /// Rated capacity in watts.
    pub max_power: f64,
    /// Opaque image label passed through to subscribers.
    #[serde(default)]
    pub image_name: String,
}

impl ApplianceSpec {
    /// Build a spec from its parts.
    pub fn new(id: &str, name: &str, max_power: f64, image_name: &str) -> Self {
        Self {
            id: ApplianceId::from(id),
            name: name.to_owned(),
            max_power,
            image_name: image_name.to_owned(),
        }
    }
}

/// Telemetry server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// First port to try.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How many consecutive ports to try when the first is in use.
    #[serde(default = "default_port_attempts")]
    pub port_attempts: u16,

    /// Queue depth per subscriber. A subscriber whose queue is full at
    /// broadcast time is dropped.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Upper bound on a single socket write, in milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            port_attempts: default_port_attempts(),
            subscriber_buffer: default_subscriber_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_tick_interval_ms() -> u64 {
    1_000
}

const fn default_unit_price_per_kwh() -> f64 {
    0.12
}

const fn default_min_dwell_secs() -> u64 {
    300
}

const fn default_switch_probability() -> f64 {
    0.10
}

const fn default_anomaly_probability() -> f64 {
    0.05
}

const fn default_anomaly_cooldown_secs() -> u64 {
    1_800
}

const fn default_anomaly_duration_secs() -> u64 {
    300
}

const fn default_normal_band() -> PowerBand {
    PowerBand { min: 0.5, max: 1.0 }
}

const fn default_anomaly_band() -> PowerBand {
    PowerBand { min: 1.2, max: 1.5 }
}

const fn default_weekly_baseline_fraction() -> f64 {
    0.6
}

const fn default_weekly_variation_fraction() -> f64 {
    0.1
}

/// The reference household fleet.
pub fn default_fleet() -> Vec<ApplianceSpec> {
    vec![
        ApplianceSpec::new("1", "Fan", 75.0, "fan.png"),
        ApplianceSpec::new("2", "Air Conditioner", 1500.0, "AC.png"),
        ApplianceSpec::new("3", "Washing Machine", 500.0, "washingmachine.png"),
        ApplianceSpec::new("4", "Television", 100.0, "TV.png"),
        ApplianceSpec::new("5", "Microwave", 1200.0, "microwave.png"),
        ApplianceSpec::new("6", "Refrigerator", 150.0, "refrigerator.png"),
        ApplianceSpec::new("7", "Laptop Charger", 65.0, "laptop.png"),
        ApplianceSpec::new("8", "Bulb", 60.0, "bulb.png"),
    ]
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8000
}

const fn default_port_attempts() -> u16 {
    10
}

const fn default_subscriber_buffer() -> usize {
    8
}

const fn default_send_timeout_ms() -> u64 {
    2_000
}

fn default_log_level() -> String {
    "info".to_owned()
}
