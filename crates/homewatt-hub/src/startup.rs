//! Server startup helper for embedding in the simulator binary.
//!
//! Provides [`spawn_server`] which binds the listener eagerly and then
//! launches the HTTP + `WebSocket` server on a background Tokio task.
//! The server shuts down gracefully once the operator's stop signal fires.
//!
//! # Usage
//!
//! ```rust,ignore
//! use homewatt_hub::startup::spawn_server;
//!
//! let running = spawn_server(&config.server, state).await?;
//! // ... later, after operator.request_stop():
//! running.handle.await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use homewatt_core::config::ServerSettings;
use tokio::task::JoinHandle;

use crate::server::{self, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// A server running on a background task.
#[derive(Debug)]
pub struct RunningServer {
    /// The address actually bound, after any port fallback.
    pub addr: SocketAddr,
    /// Resolves once the server has shut down.
    pub handle: JoinHandle<()>,
}

/// Bind the listener and spawn the server on a background Tokio task.
///
/// The bind happens before spawning, so a missing port is reported to the
/// caller rather than logged from inside the task.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if no port could be bound.
pub async fn spawn_server(
    settings: &ServerSettings,
    state: Arc<AppState>,
) -> Result<RunningServer, StartupError> {
    let (listener, addr) = server::bind_listener(settings).await?;

    let operator = Arc::clone(&state.operator);
    let shutdown = async move { operator.stopped().await };

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Telemetry server exited with error");
        }
    });

    tracing::info!(%addr, "Telemetry server spawned on background task");

    Ok(RunningServer { addr, handle })
}
