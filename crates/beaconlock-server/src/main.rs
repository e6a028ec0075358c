//! # beaconlock-server
//!
//! HTTP server for configuring and controlling the beaconlock monitor.
//!
//! This binary provides:
//! - REST API to edit the configuration and start/stop monitoring
//! - OpenAPI documentation via Swagger UI at `/swagger-ui`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package beaconlock-server
//!
//! # Production logging
//! BEACONLOCK_ENV=production ./beaconlock-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;

use anyhow::Context;
use beaconlock_core::{config::default_config_path, Config};
use beaconlock_server::api::{self, ApiDoc};
use beaconlock_server::logging;
use beaconlock_server::state::{default_scanner, AppState};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::is_production())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting beaconlock-server");

    let config_path = default_config_path()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    info!(path = %config_path.display(), "Configuration loaded");

    for problem in config.validation_errors() {
        warn!(%problem, "Monitor cannot start until this is fixed via PUT /api/config");
    }

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind_address))?;

    let state = AppState::new(config, config_path, default_scanner()).into_shared();

    let app = api::create_router(state.clone())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutting down never counts as the device walking away.
    let supervisor = state.read().await.supervisor.clone();
    if let Some(summary) = supervisor.stop().await {
        info!(run_id = %summary.run_id, cycles = summary.cycles, "Stopped active monitor run");
    }

    info!("beaconlock-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
