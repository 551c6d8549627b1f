//! Operator REST API handlers for runtime scheduler control.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/operator/pause` | Pause broadcasting |
//! | `POST` | `/api/operator/resume` | Resume broadcasting |
//! | `POST` | `/api/operator/speed` | Set tick interval (ms) |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use homewatt_core::operator::MIN_TICK_INTERVAL_MS;

use crate::error::ObserverError;
use crate::state::AppState;

/// Request body for `POST /api/operator/speed`.
#[derive(Debug, serde::Deserialize)]
pub struct SetSpeedRequest {
    /// New tick interval in milliseconds (minimum 100).
    pub tick_interval_ms: u64,
}

/// Generic success response.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the operation succeeded.
    ok: bool,
    /// Human-readable message.
    message: String,
}

/// Pause broadcasting. Subscribers stay connected but receive nothing
/// until resumed.
pub async fn pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.operator.pause();
    tracing::info!("Operator paused broadcasting");

    Json(OperatorResponse {
        ok: true,
        message: "Broadcasting paused".to_owned(),
    })
}

/// Resume broadcasting after a pause.
pub async fn resume(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.operator.resume();
    tracing::info!("Operator resumed broadcasting");

    Json(OperatorResponse {
        ok: true,
        message: "Broadcasting resumed".to_owned(),
    })
}

/// Change the tick interval at runtime.
///
/// The new interval takes effect at the next sleep.
pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetSpeedRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    state
        .operator
        .set_tick_interval_ms(body.tick_interval_ms)
        .map_or_else(
            || {
                Err(ObserverError::InvalidRequest(format!(
                    "tick_interval_ms must be at least {MIN_TICK_INTERVAL_MS}"
                )))
            },
            |prev| {
                tracing::info!(
                    previous_interval_ms = prev,
                    new_interval_ms = body.tick_interval_ms,
                    "Operator changed tick interval"
                );
                Ok(Json(serde_json::json!({
                    "ok": true,
                    "message": format!("Tick interval changed from {}ms to {}ms", prev, body.tick_interval_ms),
                    "previous_interval_ms": prev,
                    "new_interval_ms": body.tick_interval_ms,
                })))
            },
        )
}
