//! Shared wire types for the Homewatt appliance simulator.
//!
//! This crate is the single source of truth for everything a telemetry
//! subscriber sees. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for the dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Subscriber and appliance identifiers
//! - [`enums`] -- Power status and day-of-week labels
//! - [`structs`] -- Per-appliance telemetry and the per-tick fleet message

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{DayOfWeek, PowerStatus};
pub use ids::{ApplianceId, SubscriberId};
pub use structs::{ApplianceTelemetry, DailyUsage, FleetMessage, FleetSummary};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Files are written to `bindings/` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::SubscriberId::export_all();
        let _ = crate::ids::ApplianceId::export_all();

        let _ = crate::enums::PowerStatus::export_all();
        let _ = crate::enums::DayOfWeek::export_all();

        let _ = crate::structs::DailyUsage::export_all();
        let _ = crate::structs::ApplianceTelemetry::export_all();
        let _ = crate::structs::FleetSummary::export_all();
        let _ = crate::structs::FleetMessage::export_all();
    }
}
