//! Web server configuration.

use crate::error::{DashboardError, Result};
use crate::live::FeedOptions;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Placeholder printed instead of the session secret.
pub const REDACTED: &str = "<redacted>";

/// Upper bound for session lifetimes and refresh windows, one year.
pub const MAX_SESSION_SECS: u64 = 60 * 60 * 24 * 365;

/// Configuration for the web server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Host to bind the server to
    pub host: String,
    /// Port to bind the server to
    pub port: u16,
    /// Whether to enable CORS
    pub enable_cors: bool,
    /// Path to serve static files from
    pub static_path: Option<String>,
    /// Maximum number of WebSocket connections
    pub max_websocket_connections: usize,
    /// Key used to sign session tokens; generated at startup when absent
    pub session_secret: Option<String>,
    /// Lifetime of a session token in seconds
    pub session_ttl_secs: u64,
    /// Sessions closer than this to expiry are refreshed by the gate
    pub refresh_window_secs: u64,
    /// Name of the session cookie
    pub cookie_name: String,
    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,
    /// Live feed poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Live feed status tick in milliseconds
    pub status_interval_ms: u64,
    /// Offline tolerance per registered device in seconds
    pub offline_secs_per_device: u64,
    /// Demo simulator insert interval in milliseconds
    pub simulate_interval_ms: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_WEB_PORT,
            enable_cors: true,
            static_path: None,
            max_websocket_connections: 100,
            session_secret: None,
            session_ttl_secs: 60 * 60 * 24 * 7,
            refresh_window_secs: 60 * 60,
            cookie_name: crate::DEFAULT_COOKIE_NAME.to_string(),
            cookie_secure: false,
            poll_interval_ms: crate::DEFAULT_POLL_INTERVAL_MS,
            status_interval_ms: crate::DEFAULT_STATUS_INTERVAL_MS,
            offline_secs_per_device: crate::live::DEFAULT_OFFLINE_SECS_PER_DEVICE,
            simulate_interval_ms: 10_000,
        }
    }
}

impl WebConfig {
    /// Create a new web configuration with custom host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Load a configuration from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::config_error(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the host for the web server.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port for the web server.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable_cors: bool) -> Self {
        self.enable_cors = enable_cors;
        self
    }

    /// Set the static files path.
    pub fn with_static_path(mut self, path: Option<String>) -> Self {
        self.static_path = path;
        self
    }

    /// Set the maximum number of WebSocket connections.
    pub fn with_max_websocket_connections(mut self, max: usize) -> Self {
        self.max_websocket_connections = max;
        self
    }

    /// Set the key used to sign session tokens.
    pub fn with_session_secret(mut self, secret: impl Into<String>) -> Self {
        self.session_secret = Some(secret.into());
        self
    }

    /// Set the live feed poll and status intervals.
    pub fn with_live_intervals(mut self, poll_ms: u64, status_ms: u64) -> Self {
        self.poll_interval_ms = poll_ms;
        self.status_interval_ms = status_ms;
        self
    }

    /// Set the demo simulator interval.
    pub fn with_simulate_interval(mut self, interval_ms: u64) -> Self {
        self.simulate_interval_ms = interval_ms;
        self
    }

    /// Get the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cookie_name.trim().is_empty() {
            return Err(DashboardError::config_error("cookie_name must not be empty"));
        }
        if self.session_ttl_secs == 0 {
            return Err(DashboardError::config_error("session_ttl_secs must be positive"));
        }
        if self.session_ttl_secs > MAX_SESSION_SECS || self.refresh_window_secs > MAX_SESSION_SECS {
            return Err(DashboardError::config_error(format!(
                "session_ttl_secs and refresh_window_secs must not exceed {}",
                MAX_SESSION_SECS
            )));
        }
        // Otherwise every fresh session already sits inside the window
        if self.refresh_window_secs >= self.session_ttl_secs {
            return Err(DashboardError::config_error(
                "refresh_window_secs must be shorter than session_ttl_secs",
            ));
        }
        if self.poll_interval_ms == 0 || self.status_interval_ms == 0 {
            return Err(DashboardError::config_error(
                "live feed intervals must be positive",
            ));
        }
        if self.simulate_interval_ms == 0 {
            return Err(DashboardError::config_error(
                "simulate_interval_ms must be positive",
            ));
        }
        if self
            .session_secret
            .as_deref()
            .is_some_and(|secret| secret.len() < 16)
        {
            return Err(DashboardError::config_error(
                "session_secret must be at least 16 characters",
            ));
        }
        Ok(())
    }

    /// The configured session secret, or a random one for this process.
    pub fn resolve_session_secret(&self) -> String {
        match &self.session_secret {
            Some(secret) => secret.clone(),
            None => rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(48)
                .map(char::from)
                .collect(),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        bounded_secs(self.session_ttl_secs)
    }

    pub fn refresh_window(&self) -> chrono::Duration {
        bounded_secs(self.refresh_window_secs)
    }

    /// Timing for live feeds started by the WebSocket channel.
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            status_interval: Duration::from_millis(self.status_interval_ms),
            offline_secs_per_device: self.offline_secs_per_device,
        }
    }

    /// The configuration as TOML, with the session secret replaced.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.session_secret.is_some() {
            shown.session_secret = Some(REDACTED.to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

fn bounded_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_SESSION_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: WebConfig = toml::from_str("port = 9000\ncookie_secure = true\n").unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.cookie_secure);
        assert_eq!(config.cookie_name, "agrina-session");
        assert_eq!(config.poll_interval_ms, 5000);
    }

    #[test]
    fn test_redacted_dump_hides_secret() {
        let config = WebConfig::default().with_session_secret("a-very-long-secret-value");
        let dumped = config.to_redacted_toml().unwrap();
        assert!(!dumped.contains("a-very-long-secret-value"));
        assert!(dumped.contains(REDACTED));
        let parsed: WebConfig = toml::from_str(&dumped).unwrap();
        assert_eq!(parsed.port, config.port);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(WebConfig::default().validate().is_ok());
        assert!(WebConfig::default().with_session_secret("short").validate().is_err());
        assert!(WebConfig::default().with_live_intervals(0, 5000).validate().is_err());

        let window_covers_ttl = WebConfig {
            session_ttl_secs: 1800,
            refresh_window_secs: 3600,
            ..Default::default()
        };
        assert!(window_covers_ttl.validate().is_err());
    }

    #[test]
    fn test_huge_durations_are_rejected_and_clamped() {
        let config: WebConfig = toml::from_str(
            "session_ttl_secs = 9223372036854775807\nrefresh_window_secs = 9223372036854775806\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
        assert_eq!(config.session_ttl(), chrono::Duration::seconds(MAX_SESSION_SECS as i64));
        assert_eq!(config.refresh_window(), chrono::Duration::seconds(MAX_SESSION_SECS as i64));

        let year = WebConfig {
            session_ttl_secs: MAX_SESSION_SECS,
            ..Default::default()
        };
        assert!(year.validate().is_ok());
    }

    #[test]
    fn test_generated_secret() {
        let config = WebConfig::default();
        let a = config.resolve_session_secret();
        assert_eq!(a.len(), 48);
        assert_ne!(a, config.resolve_session_secret());
        assert_eq!(
            config.with_session_secret("fixed-secret-0123456").resolve_session_secret(),
            "fixed-secret-0123456"
        );
    }

    #[test]
    fn test_feed_options_from_config() {
        let options = WebConfig::default().with_live_intervals(100, 200).feed_options();
        assert_eq!(options.poll_interval, Duration::from_millis(100));
        assert_eq!(options.status_interval, Duration::from_millis(200));
        assert_eq!(options.offline_secs_per_device, 60);
    }
}
