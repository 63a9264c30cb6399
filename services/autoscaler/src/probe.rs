//! Liveness and readiness probe endpoints.
//!
//! Used by the orchestrator to decide whether the process is up. The probes do
//! not look at the scaling loop; readiness is unconditional once listening.

use std::net::SocketAddr;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("port {port} is already in use, cannot start probe server")]
    PortInUse { port: u16 },

    #[error("failed to bind probe server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("probe server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Create the probe routes. Unknown paths get an empty 404.
pub fn routes() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback(not_found)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, "Ready")
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// A bound probe server.
pub struct ProbeServer {
    listener: TcpListener,
}

impl ProbeServer {
    /// Bind on all interfaces.
    pub async fn bind(port: u16) -> Result<Self, ProbeError> {
        Self::bind_addr(SocketAddr::from(([0, 0, 0, 0], port))).await
    }

    pub async fn bind_addr(addr: SocketAddr) -> Result<Self, ProbeError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::AddrInUse {
                ProbeError::PortInUse { port: addr.port() }
            } else {
                ProbeError::Bind { addr, source }
            }
        })?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProbeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until shutdown is signaled.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ProbeError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(addr = %addr, "Starting health probe server");
        }

        axum::serve(self.listener, routes())
            .with_graceful_shutdown(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
                info!("Probe server shutting down");
            })
            .await?;

        Ok(())
    }
}
