//! Web server, pages and API endpoints for the AGRIna dashboard.
//!
//! Server-rendered pages, form posts, a JSON API and a WebSocket channel for
//! live readings, all sharing one [`AppState`].

pub mod config;
pub mod export;
pub mod forms;
pub mod handlers;
pub mod pages;
pub mod router;
pub mod state;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;
pub use state::{AppState, ClientRegistry, LiveClient};

use crate::error::{DashboardError, Result};
use std::net::SocketAddr;
use tracing::info;

/// Serve the dashboard until the listener fails.
pub async fn start_web_server(state: AppState) -> Result<()> {
    let bind = state.config.bind_address();
    let app = create_app(state)?;

    let addr = bind
        .parse::<SocketAddr>()
        .map_err(|e| DashboardError::config_error(format!("Invalid bind address: {}", e)))?;

    info!("Starting AGRIna dashboard on http://{}", addr);
    info!("Sign in at http://{}/login", addr);
    info!("API endpoint: http://{}/api/devices", addr);
    info!("WebSocket endpoint: ws://{}/ws/live", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DashboardError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DashboardError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
