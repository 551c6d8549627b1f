//! Shared application state for the telemetry server.
//!
//! [`AppState`] holds the subscriber hub that the scheduler publishes into
//! and the operator controls that the REST endpoints drive. Handlers never
//! touch the fleet; everything they report comes from the hub's latest
//! message and counters.

use std::sync::Arc;
use std::time::Duration;

use homewatt_core::operator::OperatorState;

use crate::hub::SubscriberHub;

/// Default bound on a single `WebSocket` frame send.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The subscriber registry.
    pub hub: Arc<SubscriberHub>,
    /// Shared operator control state.
    pub operator: Arc<OperatorState>,
    /// Longest a single frame send may take before the client is dropped.
    pub send_timeout: Duration,
}

impl AppState {
    /// Create application state around an existing hub and operator.
    pub const fn new(hub: Arc<SubscriberHub>, operator: Arc<OperatorState>) -> Self {
        Self {
            hub,
            operator,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Override the per-frame send timeout.
    #[must_use]
    pub const fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }
}
