//! Subscriber hub and telemetry server for the Homewatt simulator.
//!
//! This crate provides:
//!
//! - **Subscriber hub** ([`SubscriberHub`]): the registry of live
//!   subscribers with non-blocking fan-out and automatic removal of dead
//!   or slow ones. It implements the scheduler's [`TickSink`].
//! - **`WebSocket` endpoint** (`/ws`) streaming one fleet message per tick
//! - **REST endpoints** for the latest message and hub status
//! - **Operator REST endpoints** for pause, resume, and tick speed
//! - **Minimal HTML page** (`GET /`) with live counters and links
//!
//! # Architecture
//!
//! The scheduler publishes into the hub synchronously; each `WebSocket`
//! task owns the receiving end of its own bounded queue and performs the
//! actual socket writes, each bounded by a timeout. A slow client
//! therefore only ever delays itself.
//!
//! [`TickSink`]: homewatt_core::runner::TickSink

pub mod error;
pub mod handlers;
pub mod hub;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use hub::{BroadcastReport, HubError, SubscriberHub, Subscription};
pub use router::build_router;
pub use server::{ServerError, bind_listener, serve};
pub use startup::{RunningServer, StartupError, spawn_server};
pub use state::AppState;
