//! Per-appliance stochastic state machine.
//!
//! A [`Device`] advances exactly once per tick. Each advance runs three
//! phases in a fixed order:
//!
//! 1. **Dwell gate** -- once the device has held its on/off state for at
//!    least the minimum dwell time, it flips with the configured switch
//!    probability.
//! 2. **Power resolution** -- an off device draws nothing and carries no
//!    anomaly. An on device either continues, clears, or raises an anomaly
//!    and draws from the matching power band.
//! 3. **Usage accounting** -- an on device accrues one simulated minute.
//!
//! The anomaly lifecycle is cooldown-based: a raised anomaly clears once
//! the configured duration has passed since it was raised, and no new
//! anomaly may be raised until the cooldown since the last one has passed.
//!
//! Devices never interact and hold no shared state. All randomness comes
//! from the generator passed into [`Device::advance`], so a seeded
//! generator and a scripted clock reproduce a run exactly.

use chrono::{DateTime, TimeDelta, Utc};
use homewatt_types::{ApplianceId, DayOfWeek};
use rand::Rng;

use crate::config::{ApplianceSpec, ConfigError, DeviceModelConfig, PowerBand};

/// Hours in one day, used to scale the weekly usage profile to watt-hours.
const HOURS_PER_DAY: f64 = 24.0;

/// Watts per kilowatt.
const WATTS_PER_KILOWATT: f64 = 1000.0;

/// Resolved, validated parameters shared by every device in a fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceParams {
    /// Minimum time a device must hold its state before it may flip.
    pub min_dwell: TimeDelta,
    /// Per-tick flip probability once the dwell time has elapsed.
    pub switch_probability: f64,
    /// Per-tick anomaly probability while on and out of cooldown.
    pub anomaly_probability: f64,
    /// Time after an anomaly is raised during which none may be raised again.
    pub anomaly_cooldown: TimeDelta,
    /// Time after an anomaly is raised before it clears.
    pub anomaly_duration: TimeDelta,
    /// Power band while on and healthy.
    pub normal_band: PowerBand,
    /// Power band while anomalous.
    pub anomaly_band: PowerBand,
    /// Centre of the weekly profile as a fraction of a full day at capacity.
    pub weekly_baseline_fraction: f64,
    /// Half-width of the weekly profile variation.
    pub weekly_variation_fraction: f64,
    /// Tariff per kilowatt-hour.
    pub unit_price_per_kwh: f64,
}

impl DeviceParams {
    /// Resolve device parameters from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a duration does not fit in a
    /// [`TimeDelta`].
    pub fn from_config(
        model: &DeviceModelConfig,
        unit_price_per_kwh: f64,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            min_dwell: seconds("min_dwell_secs", model.min_dwell_secs)?,
            switch_probability: model.switch_probability,
            anomaly_probability: model.anomaly_probability,
            anomaly_cooldown: seconds("anomaly_cooldown_secs", model.anomaly_cooldown_secs)?,
            anomaly_duration: seconds("anomaly_duration_secs", model.anomaly_duration_secs)?,
            normal_band: model.normal_band,
            anomaly_band: model.anomaly_band,
            weekly_baseline_fraction: model.weekly_baseline_fraction,
            weekly_variation_fraction: model.weekly_variation_fraction,
            unit_price_per_kwh,
        })
    }
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            min_dwell: TimeDelta::minutes(5),
            switch_probability: 0.10,
            anomaly_probability: 0.05,
            anomaly_cooldown: TimeDelta::minutes(30),
            anomaly_duration: TimeDelta::minutes(5),
            normal_band: PowerBand { min: 0.5, max: 1.0 },
            anomaly_band: PowerBand { min: 1.2, max: 1.5 },
            weekly_baseline_fraction: 0.6,
            weekly_variation_fraction: 0.1,
            unit_price_per_kwh: 0.12,
        }
    }
}

fn seconds(field: &str, secs: u64) -> Result<TimeDelta, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| ConfigError::Invalid {
            reason: format!("device_model.{field} is out of range: {secs}"),
        })
}

/// Telemetry emitted by one device for one tick.
///
/// Power and cost carry the same two-decimal precision as the wire, so a
/// subscriber summing the per-appliance values gets the fleet totals.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Stable appliance id.
    pub id: ApplianceId,
    /// Display name.
    pub name: String,
    /// Opaque image label.
    pub image_name: String,
    /// Rated capacity in watts.
    pub max_power: f64,
    /// Whether the device is on.
    pub on: bool,
    /// Instantaneous draw in watts.
    pub current_power: f64,
    /// Accumulated simulated minutes on.
    pub time_used: u64,
    /// When the device last flipped.
    pub last_state_change: DateTime<Utc>,
    /// Whether an anomaly is active.
    pub anomaly: bool,
    /// When the most recent anomaly was raised, if ever.
    pub last_anomaly_at: Option<DateTime<Utc>>,
    /// Number of flips since creation.
    pub cycles: u64,
    /// Seven daily usage values in watt-hours, Monday first.
    pub weekly_usage: [f64; 7],
    /// Instantaneous cost rate (`current_power × unit_price / 1000`),
    /// rounded to two decimals.
    pub cost_per_hour: f64,
}

impl TelemetryRecord {
    /// The weekly profile paired with its day labels.
    pub fn weekly_usage_by_day(&self) -> impl Iterator<Item = (DayOfWeek, f64)> + '_ {
        DayOfWeek::ALL.into_iter().zip(self.weekly_usage)
    }
}

/// One simulated appliance.
#[derive(Debug, Clone)]
pub struct Device {
    spec: ApplianceSpec,
    on: bool,
    current_power: f64,
    time_used: u64,
    last_state_change: DateTime<Utc>,
    anomaly: bool,
    last_anomaly_at: Option<DateTime<Utc>>,
    cycles: u64,
    weekly_usage: [f64; 7],
}

impl Device {
    /// Create a device that is off at `created_at`, with a freshly drawn
    /// weekly usage profile.
    pub fn new<R: Rng + ?Sized>(
        spec: ApplianceSpec,
        created_at: DateTime<Utc>,
        params: &DeviceParams,
        rng: &mut R,
    ) -> Self {
        let weekly_usage = weekly_profile(spec.max_power, params, rng);
        Self {
            spec,
            on: false,
            current_power: 0.0,
            time_used: 0,
            last_state_change: created_at,
            anomaly: false,
            last_anomaly_at: None,
            cycles: 0,
            weekly_usage,
        }
    }

    /// Advance the device by one tick at `now` and return its telemetry.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        params: &DeviceParams,
        rng: &mut R,
    ) -> TelemetryRecord {
        // Dwell gate. The draw happens only once the device is eligible.
        let held_for = now.signed_duration_since(self.last_state_change);
        if held_for >= params.min_dwell && rng.random_bool(params.switch_probability) {
            self.on = !self.on;
            self.last_state_change = now;
            self.cycles = self.cycles.saturating_add(1);
        }

        if self.on {
            self.resolve_power(now, params, rng);
            self.time_used = self.time_used.saturating_add(1);
        } else {
            self.anomaly = false;
            self.current_power = 0.0;
        }

        self.record(params)
    }

    /// Power and anomaly resolution for a device that is on.
    fn resolve_power<R: Rng + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        params: &DeviceParams,
        rng: &mut R,
    ) {
        let since_anomaly = self
            .last_anomaly_at
            .map(|at| now.signed_duration_since(at));

        if self.anomaly {
            if since_anomaly.is_none_or(|elapsed| elapsed > params.anomaly_duration) {
                self.anomaly = false;
                self.current_power = draw(self.spec.max_power, params.normal_band, rng);
            } else {
                self.current_power = draw(self.spec.max_power, params.anomaly_band, rng);
            }
            return;
        }

        let eligible = since_anomaly.is_none_or(|elapsed| elapsed > params.anomaly_cooldown);
        if eligible && rng.random_bool(params.anomaly_probability) {
            self.anomaly = true;
            self.last_anomaly_at = Some(now);
            self.current_power = draw(self.spec.max_power, params.anomaly_band, rng);
        } else {
            self.current_power = draw(self.spec.max_power, params.normal_band, rng);
        }
    }

    fn record(&self, params: &DeviceParams) -> TelemetryRecord {
        TelemetryRecord {
            id: self.spec.id.clone(),
            name: self.spec.name.clone(),
            image_name: self.spec.image_name.clone(),
            max_power: self.spec.max_power,
            on: self.on,
            current_power: self.current_power,
            time_used: self.time_used,
            last_state_change: self.last_state_change,
            anomaly: self.anomaly,
            last_anomaly_at: self.last_anomaly_at,
            cycles: self.cycles,
            weekly_usage: self.weekly_usage,
            cost_per_hour: round2(
                self.current_power * params.unit_price_per_kwh / WATTS_PER_KILOWATT,
            ),
        }
    }

    /// Static description of this device.
    pub const fn spec(&self) -> &ApplianceSpec {
        &self.spec
    }

    /// Whether the device is on.
    pub const fn is_on(&self) -> bool {
        self.on
    }

    /// Whether an anomaly is active.
    pub const fn is_anomalous(&self) -> bool {
        self.anomaly
    }

    /// Instantaneous draw in watts.
    pub const fn current_power(&self) -> f64 {
        self.current_power
    }

    /// Accumulated simulated minutes on.
    pub const fn time_used(&self) -> u64 {
        self.time_used
    }

    /// Number of flips since creation.
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// When the device last flipped.
    pub const fn last_state_change(&self) -> DateTime<Utc> {
        self.last_state_change
    }

    /// The precomputed weekly usage profile.
    pub const fn weekly_usage(&self) -> &[f64; 7] {
        &self.weekly_usage
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Draw a power value from `band` scaled by `max_power`, in hundredths of
/// a watt.
fn draw<R: Rng + ?Sized>(max_power: f64, band: PowerBand, rng: &mut R) -> f64 {
    round2(max_power * rng.random_range(band.min..=band.max))
}

/// Seven daily usage values: baseline plus or minus the configured variation,
/// scaled to a full day at capacity and rounded to two decimals.
fn weekly_profile<R: Rng + ?Sized>(max_power: f64, params: &DeviceParams, rng: &mut R) -> [f64; 7] {
    let low = params.weekly_baseline_fraction - params.weekly_variation_fraction;
    let high = params.weekly_baseline_fraction + params.weekly_variation_fraction;
    let full_day = max_power * HOURS_PER_DAY;
    std::array::from_fn(|_| {
        round2(full_day * rng.random_range(low..=high))
    })
}
