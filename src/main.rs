//! Tutorly web server entry point.
//!
//! Serves the role-gated dashboards and the public tutor marketplace in
//! front of the remote booking API.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorly::api::RemoteApi;
use tutorly::config::TutorlyConfig;
use tutorly::error::{Result, TutorlyError};
use tutorly::gate::AccessGate;
use tutorly::health::spawn_health_server;
use tutorly::session::{HttpSessionProvider, SessionProvider};
use tutorly::web;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // RUST_LOG overrides the default info level, e.g. RUST_LOG=tutorly=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Tutorly starting...");

    let config = TutorlyConfig::from_env()?;
    tracing::info!(
        api_url = %config.api_url,
        protected = config.protected_paths.patterns().len(),
        "Configuration loaded"
    );

    if let Some(port) = config.health_port {
        spawn_health_server(port);
    }

    let sessions: Arc<dyn SessionProvider> = Arc::new(HttpSessionProvider::from_config(&config)?);
    let gate = Arc::new(AccessGate::new(
        sessions.clone(),
        config.protected_paths.clone(),
        config.session_cookie.clone(),
        config.cookie_secure,
    ));
    tracing::info!(cookie = %config.session_cookie, "Access gate initialized");

    let state = web::AppState {
        api: RemoteApi::from_config(&config)?,
        gate,
        sessions,
    };
    let router = web::build_router_with_assets(state, config.public_dir.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.web_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TutorlyError::Io(format!("failed to bind {}: {}", addr, e)))?;
    tracing::info!(port = config.web_port, "Starting web server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TutorlyError::Io(format!("web server error: {}", e)))?;

    tracing::info!("Tutorly stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
