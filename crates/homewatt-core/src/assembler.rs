//! Derive the wire-level [`FleetMessage`] from one tick's records.
//!
//! Assembly is a pure function: no I/O, no clock reads, no randomness.
//! Records already carry two-decimal power and cost. Totals are summed from
//! those values and rounded once when the message is emitted, so the summary
//! agrees with the appliance entries it is sent with.

use chrono::{DateTime, Utc};
use homewatt_types::{
    ApplianceTelemetry, DailyUsage, FleetMessage, FleetSummary, PowerStatus,
};

use crate::device::{TelemetryRecord, round2};
use crate::fleet::FleetSnapshot;

/// Nominal peak draw as a multiple of capacity.
const PEAK_POWER_FACTOR: f64 = 1.2;

/// Errors that can occur while assembling a message.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// A numeric field is NaN or infinite and cannot be emitted as JSON.
    #[error("non-finite value in {field} for appliance {appliance}")]
    NonFinite {
        /// The offending field.
        field: &'static str,
        /// The appliance id, or `fleet` for summary totals.
        appliance: String,
    },
}

/// Fleet totals before the final rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FleetTotals {
    /// Sum of instantaneous power in watts.
    pub power: f64,
    /// Sum of instantaneous cost rates.
    pub cost_per_hour: f64,
    /// Devices currently on.
    pub active: u32,
    /// Devices currently anomalous.
    pub anomalous: u32,
}

impl FleetTotals {
    /// Reduce over a tick's records.
    pub fn from_records(records: &[TelemetryRecord]) -> Self {
        records.iter().fold(Self::default(), |mut totals, record| {
            totals.power += record.current_power;
            totals.cost_per_hour += record.cost_per_hour;
            if record.on {
                totals.active = totals.active.saturating_add(1);
            }
            if record.anomaly {
                totals.anomalous = totals.anomalous.saturating_add(1);
            }
            totals
        })
    }

    /// The rounded wire summary.
    pub fn to_summary(self) -> FleetSummary {
        FleetSummary {
            total_consumption: round2(self.power),
            total_cost_per_hour: round2(self.cost_per_hour),
            active_appliances: self.active,
            anomalies_detected: self.anomalous,
        }
    }
}

/// Assemble the broadcast message for `records` taken at `now`.
///
/// # Errors
///
/// Returns [`AssemblyError::NonFinite`] if any emitted number is NaN or
/// infinite.
pub fn assemble(
    records: &[TelemetryRecord],
    now: DateTime<Utc>,
) -> Result<FleetMessage, AssemblyError> {
    let appliances = records
        .iter()
        .map(to_wire)
        .collect::<Result<Vec<_>, _>>()?;

    let totals = FleetTotals::from_records(records);
    finite(totals.power, "total_consumption", "fleet")?;
    finite(totals.cost_per_hour, "total_cost_per_hour", "fleet")?;

    Ok(FleetMessage {
        timestamp: now,
        appliances,
        summary: totals.to_summary(),
    })
}

/// Assemble the message for a whole snapshot.
///
/// # Errors
///
/// See [`assemble`].
pub fn assemble_snapshot(snapshot: &FleetSnapshot) -> Result<FleetMessage, AssemblyError> {
    assemble(&snapshot.records, snapshot.taken_at)
}

fn to_wire(record: &TelemetryRecord) -> Result<ApplianceTelemetry, AssemblyError> {
    let id = record.id.as_str();
    finite(record.current_power, "current_power", id)?;
    finite(record.cost_per_hour, "cost_per_hour", id)?;
    if let Some(bad) = record.weekly_usage.iter().find(|v| !v.is_finite()) {
        finite(*bad, "weekly_usage", id)?;
    }

    Ok(ApplianceTelemetry {
        id: record.id.clone(),
        name: record.name.clone(),
        state: record.on,
        status: PowerStatus::from_state(record.on),
        current_power: record.current_power,
        time_used: record.time_used,
        last_state_change: record.last_state_change,
        image_name: record.image_name.clone(),
        anomaly: record.anomaly,
        weekly_usage: record.weekly_usage.to_vec(),
        cost_per_hour: record.cost_per_hour,
        peak_power: round2(record.max_power * PEAK_POWER_FACTOR),
        cycles: record.cycles,
        weekly_usage_with_days: record
            .weekly_usage_by_day()
            .map(|(day, usage)| DailyUsage { day, usage })
            .collect(),
    })
}

fn finite(value: f64, field: &'static str, appliance: &str) -> Result<(), AssemblyError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AssemblyError::NonFinite {
            field,
            appliance: appliance.to_owned(),
        })
    }
}
