//! Axum router construction for the telemetry server.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, operator, ws};

/// Build the complete Axum router for the telemetry server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws` -- `WebSocket` fleet telemetry stream
/// - `GET /api/fleet` -- latest fleet message
/// - `GET /api/status` -- hub and scheduler status
/// - `POST /api/operator/pause` -- pause broadcasting
/// - `POST /api/operator/resume` -- resume broadcasting
/// - `POST /api/operator/speed` -- change the tick interval
///
/// CORS allows any origin, method, and header.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws", get(ws::ws_telemetry))
        // REST API
        .route("/api/fleet", get(handlers::get_fleet))
        .route("/api/status", get(handlers::get_status))
        // Operator controls
        .route("/api/operator/pause", post(operator::pause))
        .route("/api/operator/resume", post(operator::resume))
        .route("/api/operator/speed", post(operator::set_speed))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
