//! Error handling for the AGRIna dashboard crate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

/// A specialized `Result` type for AGRIna operations.
pub type Result<T> = std::result::Result<T, DashboardError>;

/// The main error type for dashboard operations.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input failed validation (form fields, query parameters)
    #[error("{0}")]
    Validation(String),

    /// A record that was asked for does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record clashes with an existing one
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No usable session accompanies the request
    #[error("Not authenticated")]
    Unauthenticated,

    /// Sign-in was attempted with a wrong e-mail or password
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Session token could not be issued or verified
    #[error("Session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Password hashing failed
    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    /// Backing store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DashboardError {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new store error
    pub fn store_error(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status the JSON API answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated | Self::InvalidCredentials | Self::Token(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<toml::de::Error> for DashboardError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DashboardError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            DashboardError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DashboardError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            DashboardError::not_found("device").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DashboardError::conflict("serial").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            DashboardError::store_error("down").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_is_bare() {
        let err = DashboardError::validation("Name and Serial Number are required");
        assert_eq!(err.to_string(), "Name and Serial Number are required");
    }
}
