//! Web application router and middleware setup.

use crate::auth::session_gate;
use crate::error::Result;
use crate::web::state::AppState;
use crate::web::{export, forms, handlers, websocket};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Create the main axum application with all routes and middleware.
pub fn create_app(state: AppState) -> Result<Router> {
    let config = state.config.clone();

    let mut app = Router::new()
        // Pages
        .route("/", get(handlers::landing))
        .route("/login", get(handlers::login).post(forms::sign_in))
        .route("/signup", post(forms::sign_up))
        .route("/logout", post(forms::sign_out))
        .route("/dashboard", get(handlers::dashboard))
        .route("/home", get(handlers::dashboard))
        .route("/live-readings", get(handlers::live_readings))
        .route("/historical-logs", get(handlers::historical_logs))
        .route("/history", get(handlers::historical_logs))
        .route("/export-data", get(handlers::export_data))
        .route("/export", get(handlers::export_data))
        .route("/export-data/download", get(export::download))
        .route("/settings", get(handlers::settings))
        .route("/settings/profile", post(forms::update_profile))
        .route("/settings/device", post(forms::update_device))
        .route("/settings/preferences", post(forms::update_preferences))
        .route("/devices", post(forms::create_device))
        .route("/about", get(handlers::about))
        // API routes
        .route("/api/health", get(handlers::health_check))
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/devices/:id/latest", get(handlers::device_latest))
        .route("/api/readings", get(handlers::list_readings))
        .route("/api/trends", get(handlers::trends))
        // WebSocket route
        .route("/ws/live", get(websocket::live_socket_handler));

    if let Some(static_path) = &config.static_path {
        let static_path = PathBuf::from(static_path);
        if static_path.exists() {
            info!("Serving static files from: {:?}", static_path);
            app = app.nest_service("/static", ServeDir::new(&static_path));
        } else {
            warn!("Static path {:?} does not exist, skipping", static_path);
        }
    }

    app = app.layer(middleware::from_fn_with_state(state.clone(), session_gate));

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let app = app
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state);

    Ok(app)
}
