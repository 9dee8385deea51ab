//! Observer HTTP server lifecycle.
//!
//! [`start_server`] binds the listener, serves the router and drains
//! in-flight requests once the operator asks the engine to stop.

use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use colony_ledger::LedgerStore;

use crate::router::build_router;
use crate::state::AppState;

/// Listen address of the Observer server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServerConfig {
    /// Listen on every interface at `port`.
    pub fn on_port(port: u16) -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port,
        }
    }

    fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|source| ServerError::Address { addr: raw, source })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::on_port(8080)
    }
}

/// Serve the Observer API over `state` until a stop is requested.
///
/// # Errors
///
/// Returns [`ServerError`] if the address is malformed, the port cannot
/// be bound, or the accept loop fails.
pub async fn start_server<S: LedgerStore + 'static>(
    config: &ServerConfig,
    state: Arc<AppState<S>>,
) -> Result<(), ServerError> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "Observer server listening");

    let operator = Arc::clone(&state.operator);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { operator.stopped().await })
        .await?;

    info!(%addr, "Observer server stopped");
    Ok(())
}

/// Errors from starting or running the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `host:port` is not a socket address.
    #[error("invalid listen address {addr}: {source}")]
    Address {
        /// The address as configured.
        addr: String,
        /// The parse failure.
        source: AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was refused.
        addr: SocketAddr,
        /// The I/O failure.
        source: std::io::Error,
    },

    /// The accept loop failed.
    #[error("serve error: {0}")]
    Serve(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_host_is_rejected() {
        let config = ServerConfig {
            host: "not a host".to_owned(),
            port: 8080,
        };
        assert!(matches!(config.socket_addr(), Err(ServerError::Address { .. })));
    }

    #[test]
    fn default_listens_everywhere() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.socket_addr().is_ok());
    }
}
