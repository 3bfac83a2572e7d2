//! HTTP transport: runs are started over `POST /api/generate` and their
//! events streamed back as server-sent events.

pub mod api;
pub mod registry;
pub mod sse;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::config::ServerSection;
use crate::scaffold::Coordinator;
pub use api::{AppState, SharedState};
pub use registry::{RunEntry, RunRegistry, RunSummary};

/// Configuration for the HTTP server.
pub struct ServerConfig {
    pub port: u16,
    pub dev_mode: bool,
    /// Open the health endpoint in a browser once listening
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_section(&ServerSection::default())
    }
}

impl ServerConfig {
    pub fn from_section(section: &ServerSection) -> Self {
        Self {
            port: section.port,
            dev_mode: section.dev_mode,
            open_browser: false,
        }
    }
}

/// Build the application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router().with_state(state)
}

/// Serve until Ctrl+C, then cancel every run and destroy every live
/// environment.
pub async fn start_server(config: ServerConfig, coordinator: Coordinator) -> Result<()> {
    let state = Arc::new(AppState::new(Arc::new(coordinator)));

    let mut app = build_router(state.clone());
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    println!("Forge Scaffold running at http://{}", local_addr);
    tracing::info!(%local_addr, dev_mode = config.dev_mode, "Server listening");

    if config.open_browser {
        let url = format!("http://{}/health", local_addr);
        if let Err(e) = open::that(&url) {
            tracing::warn!(error = %e, url, "Failed to open browser");
        }
    }

    // Cancelling runs ends their event streams, which lets open
    // connections drain
    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown_runs(&state).await;
    println!("Server shut down gracefully.");
    Ok(())
}

/// Cancel every run, wait for in-flight runs to tear themselves down, then
/// destroy the environments of the runs that had completed.
async fn shutdown_runs(state: &AppState) {
    state.shutdown.cancel();
    state.tasks.close();
    state.tasks.wait().await;

    let entries = state.registry.drain().await;
    let mut destroyed = 0;
    for entry in entries {
        if entry.handle.is_some() {
            state.coordinator.teardown(entry.handle.as_ref()).await;
            destroyed += 1;
        }
    }
    tracing::info!(destroyed, "Live environments released");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
