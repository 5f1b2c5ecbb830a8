//! Health check HTTP endpoint for deployment platform monitoring.

use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::error::{Result, TutorlyError};

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub build_timestamp: &'static str,
    pub git_commit: &'static str,
}

impl HealthStatus {
    pub fn current() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            build_timestamp: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            git_commit: option_env!("GIT_COMMIT").unwrap_or("unknown"),
        }
    }
}

/// Health check handler with build metadata.
pub async fn health_handler() -> Json<HealthStatus> {
    Json(HealthStatus::current())
}

/// Start a standalone health check HTTP server.
pub async fn start_health_server(port: u16) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/", get(health_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(port = port, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TutorlyError::Io(format!("failed to bind health port {}: {}", port, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| TutorlyError::Io(format!("health check server failed: {}", e)))
}

/// Spawn the health check server as a background task.
pub fn spawn_health_server(port: u16) {
    tokio::spawn(async move {
        if let Err(e) = start_health_server(port).await {
            tracing::error!(error = %e, port = port, "Health check server stopped");
        }
    });
}
