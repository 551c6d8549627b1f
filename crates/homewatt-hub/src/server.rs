//! Telemetry HTTP server lifecycle management.
//!
//! [`bind_listener`] finds a free port, trying consecutive ports when the
//! configured one is taken. [`serve`] runs the Axum server on a bound
//! listener until the supplied shutdown future resolves.

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use homewatt_core::config::ServerSettings;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::router::build_router;
use crate::state::AppState;

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Bind the configured host, starting at the configured port and moving
/// up one port at a time while the address is in use.
///
/// At most `settings.port_attempts` ports are tried.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the host is not a valid address, if a
/// bind fails for any reason other than the address being in use, or if
/// every attempted port is taken.
pub async fn bind_listener(settings: &ServerSettings) -> Result<(TcpListener, SocketAddr), ServerError> {
    let mut port = settings.port;
    for attempt in 1..=settings.port_attempts {
        let addr: SocketAddr = format!("{}:{}", settings.host, port)
            .parse()
            .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let local = listener
                    .local_addr()
                    .map_err(|e| ServerError::Bind(format!("local address unavailable: {e}")))?;
                return Ok((listener, local));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                warn!(%addr, attempt, "Port in use, trying next");
                port = port.checked_add(1).ok_or_else(|| {
                    ServerError::Bind(format!("ran out of ports after {addr}"))
                })?;
            }
            Err(e) => return Err(ServerError::Bind(format!("bind failed on {addr}: {e}"))),
        }
    }

    Err(ServerError::Bind(format!(
        "no free port in {}..{} on {}",
        settings.port, port, settings.host
    )))
}

/// Serve the telemetry API on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if the server encounters a fatal I/O
/// error.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Telemetry server listening");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!("Telemetry server stopped");
    Ok(())
}
