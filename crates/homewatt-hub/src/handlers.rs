//! REST API endpoint handlers for the telemetry server.
//!
//! All handlers read from the shared [`AppState`]: the hub's latest
//! message and counters, and the operator controls. None of them touch
//! the fleet or wait on the scheduler.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/fleet` | Most recently broadcast fleet message |
//! | `GET` | `/api/status` | Hub and scheduler status |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use homewatt_core::operator::OperatorStatus;
use serde::Serialize;

use crate::error::ObserverError;
use crate::state::AppState;

/// Response body for `GET /api/status`.
#[derive(Debug, Serialize)]
pub struct HubStatus {
    /// Currently registered subscribers.
    pub subscribers: usize,
    /// Messages broadcast since start.
    pub ticks_published: u64,
    /// Operator control state.
    #[serde(flatten)]
    pub operator: OperatorStatus,
}

impl HubStatus {
    fn capture(state: &AppState) -> Self {
        Self {
            subscribers: state.hub.len(),
            ticks_published: state.hub.ticks_published(),
            operator: OperatorStatus::capture(&state.operator),
        }
    }
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing server status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = HubStatus::capture(&state);
    let subscribers = status.subscribers;
    let ticks = status.ticks_published;
    let interval = status.operator.tick_interval_ms;
    let run_state = if status.operator.paused {
        "PAUSED"
    } else {
        "RUNNING"
    };
    let (consumption, active, anomalies) = state.hub.latest().map_or(
        (String::from("--"), String::from("--"), String::from("--")),
        |m| {
            (
                format!("{:.2} W", m.summary.total_consumption),
                m.summary.active_appliances.to_string(),
                m.summary.anomalies_detected.to_string(),
            )
        },
    );

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Homewatt Telemetry</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
    </style>
</head>
<body>
    <h1>Homewatt Telemetry</h1>
    <p class="subtitle">Simulated appliance fleet stream</p>

    <p>Status: <span class="status">{run_state}</span> every {interval} ms</p>

    <div>
        <div class="metric">
            <div class="label">Subscribers</div>
            <div class="value">{subscribers}</div>
        </div>
        <div class="metric">
            <div class="label">Ticks</div>
            <div class="value">{ticks}</div>
        </div>
        <div class="metric">
            <div class="label">Consumption</div>
            <div class="value">{consumption}</div>
        </div>
        <div class="metric">
            <div class="label">Active</div>
            <div class="value">{active}</div>
        </div>
        <div class="metric">
            <div class="label">Anomalies</div>
            <div class="value">{anomalies}</div>
        </div>
    </div>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/api/fleet">/api/fleet</a> -- Latest fleet message</li>
        <li>GET <a href="/api/status">/api/status</a> -- Hub and scheduler status</li>
        <li>POST /api/operator/pause | resume | speed</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li><code>ws://host:port/ws</code> -- Live fleet telemetry, one message per tick</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/fleet
// ---------------------------------------------------------------------------

/// Return the most recently broadcast fleet message.
///
/// Responds 404 until the first message has been published.
pub async fn get_fleet(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let latest = state
        .hub
        .latest()
        .ok_or_else(|| ObserverError::NotFound("no fleet message published yet".to_owned()))?;
    let body = serde_json::to_value(latest.as_ref())?;
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return subscriber count, broadcast count, and operator state.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HubStatus::capture(&state))
}
