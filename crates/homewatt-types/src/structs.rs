//! Wire-level message structs pushed to telemetry subscribers.
//!
//! One [`FleetMessage`] is produced per tick and delivered, as the same
//! shared instance, to every subscriber live at the start of fan-out.
//! All power values are watts; all monetary values are in the configured
//! currency per hour. Numeric fields are already rounded to two decimals
//! by the time a message is constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{DayOfWeek, PowerStatus};
use crate::ids::ApplianceId;

// ---------------------------------------------------------------------------
// Per-appliance telemetry
// ---------------------------------------------------------------------------

/// One day of the precomputed weekly usage profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DailyUsage {
    /// Day label.
    pub day: DayOfWeek,
    /// Energy used on that day, in watt-hours.
    pub usage: f64,
}

/// Telemetry for a single appliance at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ApplianceTelemetry {
    /// Stable appliance id.
    pub id: ApplianceId,
    /// Display name.
    pub name: String,
    /// Whether the appliance is on.
    pub state: bool,
    /// `"on"` or `"off"`, mirroring `state`.
    pub status: PowerStatus,
    /// Instantaneous power draw in watts.
    pub current_power: f64,
    /// Accumulated simulated minutes spent on.
    #[ts(type = "number")]
    pub time_used: u64,
    /// When the appliance last switched on or off.
    pub last_state_change: DateTime<Utc>,
    /// Opaque image label for dashboards.
    pub image_name: String,
    /// Whether a simulated fault is active.
    pub anomaly: bool,
    /// Seven daily usage values, Monday first, in watt-hours.
    pub weekly_usage: Vec<f64>,
    /// Instantaneous cost rate.
    pub cost_per_hour: f64,
    /// Nominal peak draw (120% of capacity).
    pub peak_power: f64,
    /// Number of on/off flips since the simulation started.
    #[ts(type = "number")]
    pub cycles: u64,
    /// The weekly profile with day labels attached.
    pub weekly_usage_with_days: Vec<DailyUsage>,
}

// ---------------------------------------------------------------------------
// Fleet aggregate
// ---------------------------------------------------------------------------

/// Fleet-wide totals derived from one tick's records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FleetSummary {
    /// Sum of instantaneous power across the fleet, in watts.
    pub total_consumption: f64,
    /// Sum of instantaneous cost rates across the fleet.
    pub total_cost_per_hour: f64,
    /// Number of appliances currently on.
    pub active_appliances: u32,
    /// Number of appliances with an active anomaly.
    pub anomalies_detected: u32,
}

/// The aggregated message broadcast once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FleetMessage {
    /// When the snapshot behind this message was taken.
    pub timestamp: DateTime<Utc>,
    /// Per-appliance records in fleet order.
    pub appliances: Vec<ApplianceTelemetry>,
    /// Fleet-wide totals.
    pub summary: FleetSummary,
}
