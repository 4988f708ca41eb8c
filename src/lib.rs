//! # AGRIna - Soil Telemetry Dashboard
//!
//! A web dashboard for field soil sensors: live pH, temperature and NPK
//! readings per device, online/offline status, historical logs with daily
//! trends, data export and account settings.
//!
//! ## Features
//!
//! - **Live readings**: poll and push deliveries reconciled per device, streamed over WebSocket
//! - **Connection status**: online/offline derived from the age of the latest reading
//! - **History and export**: filtered logs, daily averages, CSV and JSON downloads
//! - **Sessions**: cookie-based sign-in with an auth gate in front of every page
//! - **Library + Binary**: embed the router or run the `agrina` server
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agrina::{start_web_server, AppState, LocalAuth, MemoryStore, WebConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WebConfig::default().with_session_secret("change-me-to-a-long-secret");
//!     let auth = LocalAuth::new(&config.resolve_session_secret(), config.session_ttl());
//!     let state = AppState::new(Arc::new(MemoryStore::new()), Arc::new(auth), config);
//!
//!     // Serve the dashboard on port 8080
//!     start_web_server(state).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod error;
pub mod live;
pub mod model;
pub mod simulator;
pub mod store;
pub mod web;

// Re-export public API
pub use auth::{AuthProvider, AuthUser, CurrentUser, LocalAuth, Session};
pub use error::{DashboardError, Result};
pub use live::{
    evaluate, start_live_feed, supersedes, ConnectionStatus, FeedOptions, LiveFeedHandle,
    LiveReadingState, LiveUpdate,
};
pub use model::{Device, Profile, SensorReading, UserPreferences};
pub use simulator::{seed_demo, ReadingSimulator};
pub use store::{DataStore, MemoryStore, ReadingQuery};
pub use web::{create_app, start_web_server, AppState, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;

/// The default name of the session cookie
pub const DEFAULT_COOKIE_NAME: &str = "agrina-session";

/// The default live-feed poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// The default status re-evaluation interval in milliseconds
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 5000;
