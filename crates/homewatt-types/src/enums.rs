//! Enumeration types carried on the telemetry wire.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Power status
// ---------------------------------------------------------------------------

/// Human-readable on/off status that mirrors the boolean `state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum PowerStatus {
    /// The appliance is drawing power.
    On,
    /// The appliance is switched off and draws nothing.
    Off,
}

impl PowerStatus {
    /// Derive the status from the boolean power state.
    pub const fn from_state(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }

    /// Whether this status means the appliance is on.
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

// ---------------------------------------------------------------------------
// Day of week
// ---------------------------------------------------------------------------

/// Day-of-week label used for the weekly usage profile.
///
/// Serialized as the three-letter English abbreviation (`"Mon"`..`"Sun"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum DayOfWeek {
    /// Monday.
    Mon,
    /// Tuesday.
    Tue,
    /// Wednesday.
    Wed,
    /// Thursday.
    Thu,
    /// Friday.
    Fri,
    /// Saturday.
    Sat,
    /// Sunday.
    Sun,
}

impl DayOfWeek {
    /// All seven days in profile order, Monday first.
    pub const ALL: [Self; 7] = [
        Self::Mon,
        Self::Tue,
        Self::Wed,
        Self::Thu,
        Self::Fri,
        Self::Sat,
        Self::Sun,
    ];
}
