//! The fixed, ordered collection of simulated appliances.
//!
//! Fleet membership is configuration, not state: the devices are created
//! once from [`ApplianceSpec`]s and live for the whole process. The fleet
//! owns the run's single seeded random stream and advances every device
//! sequentially in configuration order, which is also the canonical order
//! of records in the outgoing message.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::debug;

use crate::config::{ApplianceSpec, ConfigError, SimulationConfig};
use crate::device::{Device, DeviceParams, TelemetryRecord};

/// Immutable point-in-time view of the fleet produced by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetSnapshot {
    /// The instant the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// One record per device, in fleet order.
    pub records: Vec<TelemetryRecord>,
}

/// The simulated appliance fleet.
#[derive(Debug)]
pub struct Fleet {
    devices: Vec<Device>,
    params: DeviceParams,
    rng: SmallRng,
    seed: u64,
    ticks: u64,
}

impl Fleet {
    /// Build a fleet from explicit specs.
    ///
    /// Weekly usage profiles are drawn from the seeded stream at creation,
    /// so the same seed always yields the same profiles.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `specs` is empty.
    pub fn new(
        specs: Vec<ApplianceSpec>,
        params: DeviceParams,
        seed: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        if specs.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "fleet must contain at least one appliance".to_owned(),
            });
        }

        let mut rng = SmallRng::seed_from_u64(seed);
        let devices: Vec<Device> = specs
            .into_iter()
            .map(|spec| Device::new(spec, created_at, &params, &mut rng))
            .collect();

        debug!(devices = devices.len(), seed, "Fleet created");

        Ok(Self {
            devices,
            params,
            rng,
            seed,
            ticks: 0,
        })
    }

    /// Build a fleet from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the device model cannot be resolved or the
    /// fleet is empty.
    pub fn from_config(
        config: &SimulationConfig,
        seed: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        let params =
            DeviceParams::from_config(&config.device_model, config.simulation.unit_price_per_kwh)?;
        Self::new(config.fleet.clone(), params, seed, created_at)
    }

    /// Advance every device once at `now` and collect the records.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> FleetSnapshot {
        let records = self
            .devices
            .iter_mut()
            .map(|device| device.advance(now, &self.params, &mut self.rng))
            .collect();
        self.ticks = self.ticks.saturating_add(1);
        FleetSnapshot {
            taken_at: now,
            records,
        }
    }

    /// The devices in fleet order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Always `false` for a constructed fleet.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The seed the random stream was created from.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of snapshots taken so far.
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The resolved device parameters.
    pub const fn params(&self) -> &DeviceParams {
        &self.params
    }
}
