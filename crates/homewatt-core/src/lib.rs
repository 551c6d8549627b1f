//! Device model, fleet, and tick scheduler for the Homewatt simulator.
//!
//! This crate owns everything between the wall clock and a finished
//! [`FleetMessage`]: the per-appliance state machine, the ordered fleet
//! that advances it, the pure message assembler, and the perpetual loop
//! that publishes one message per period.
//!
//! # Modules
//!
//! - [`assembler`] -- Pure conversion from raw records to the wire message,
//!   with post-sum rounding of fleet totals.
//! - [`clock`] -- [`Clock`] trait with system and manual implementations.
//! - [`config`] -- Configuration loading from `homewatt-config.yaml` into
//!   strongly-typed structs.
//! - [`device`] -- Single-appliance dwell gate, power draw, and anomaly
//!   lifecycle.
//! - [`fleet`] -- The fixed, ordered device collection and its seeded
//!   random stream.
//! - [`operator`] -- Shared pause, speed, and stop controls.
//! - [`runner`] -- [`run_scheduler`] and the [`TickSink`] seam.
//!
//! [`FleetMessage`]: homewatt_types::FleetMessage
//! [`Clock`]: clock::Clock
//! [`run_scheduler`]: runner::run_scheduler
//! [`TickSink`]: runner::TickSink

pub mod assembler;
pub mod clock;
pub mod config;
pub mod device;
pub mod fleet;
pub mod operator;
pub mod runner;
