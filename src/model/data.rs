//! Record types for devices, readings and user settings.

use super::time::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unit a device's temperatures are displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    /// Parse a form value such as `C`, `celsius`, `F` or `fahrenheit`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "c" | "celsius" => Some(Self::Celsius),
            "f" | "fahrenheit" => Some(Self::Fahrenheit),
            _ => None,
        }
    }

    /// Convert a Celsius value into this unit.
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Celsius => "C",
            Self::Fahrenheit => "F",
        }
    }
}

/// Geographic position of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A field sensor unit and its deployment details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub serial_number: String,
    pub name: String,
    /// Deployment status, usually "Active", "Inactive" or "Maintenance"
    pub status: String,
    pub firmware_version: Option<String>,
    /// Last time telemetry arrived from the device
    pub last_seen: Option<DateTime<Utc>>,
    pub update_interval_seconds: u32,
    pub temperature_unit: TemperatureUnit,
    pub auto_sync: bool,
    pub lot_owner: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub coordinates: Option<Coordinates>,
    pub crop_type: Option<String>,
    pub field_description: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Whether the device is marked active and `now` falls inside its deployment window.
    pub fn is_active_deployment(&self, now: DateTime<Utc>) -> bool {
        if !self.status.eq_ignore_ascii_case("active") {
            return false;
        }
        let started = self.start_date.map_or(true, |start| start <= now);
        let not_ended = self.end_date.map_or(true, |end| end >= now);
        started && not_ended
    }
}

/// Fields for registering a new deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDevice {
    pub serial_number: String,
    pub name: String,
    pub status: String,
    pub firmware_version: String,
    pub update_interval_seconds: u32,
    pub auto_sync: bool,
    pub lot_owner: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub coordinates: Option<Coordinates>,
    pub crop_type: Option<String>,
    pub field_description: Option<String>,
    pub notes: Option<String>,
}

/// Changes made from the device settings form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettingsUpdate {
    pub name: String,
    pub update_interval_seconds: u32,
    pub temperature_unit: TemperatureUnit,
    pub auto_sync: bool,
}

/// One timestamped soil measurement.
///
/// `recorded_at` is kept exactly as the store delivered it; use
/// [`SensorReading::recorded_instant`] to interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: i64,
    pub device_id: Uuid,
    pub recorded_at: Option<String>,
    pub ph: f64,
    /// Soil temperature in Celsius
    pub temperature: f64,
    /// Nitrogen in ppm
    pub nitrogen: f64,
    /// Phosphorus in ppm
    pub phosphorus: f64,
    /// Potassium in ppm
    pub potassium: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_quality: Option<i32>,
}

impl SensorReading {
    /// The reading's timestamp, with offset-less values taken as UTC.
    pub fn recorded_instant(&self) -> Option<DateTime<Utc>> {
        self.recorded_at.as_deref().and_then(parse_timestamp)
    }
}

/// A reading about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub device_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub ph: f64,
    pub temperature: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub signal_quality: Option<i32>,
}

/// Account role shown on the settings page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "System Administrator"),
            Self::Viewer => write!(f, "Viewer"),
        }
    }
}

/// Per-user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub company: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Name used in greetings; falls back to the e-mail, then a generic label.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or("AGRIna user")
    }
}

/// Changes made from the profile form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub company: Option<String>,
}

/// Notification and data preferences of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: Uuid,
    pub alerts_enabled: bool,
    pub email_notifications: bool,
    pub data_retention_days: u32,
    pub timezone: String,
}

impl UserPreferences {
    /// Preferences used until the user saves their own.
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            alerts_enabled: true,
            email_notifications: false,
            data_retention_days: 90,
            timezone: "UTC".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn device() -> Device {
        Device {
            id: Uuid::new_v4(),
            serial_number: "AGR-0001".to_string(),
            name: "Field 1".to_string(),
            status: "Active".to_string(),
            firmware_version: None,
            last_seen: None,
            update_interval_seconds: 300,
            temperature_unit: TemperatureUnit::Celsius,
            auto_sync: true,
            lot_owner: None,
            start_date: None,
            end_date: None,
            coordinates: None,
            crop_type: None,
            field_description: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_deployment_window() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let mut dev = device();
        assert!(dev.is_active_deployment(now));

        dev.end_date = Some(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
        assert!(!dev.is_active_deployment(now));

        dev.end_date = None;
        dev.start_date = Some(Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap());
        assert!(!dev.is_active_deployment(now));

        dev.start_date = None;
        dev.status = "Maintenance".to_string();
        assert!(!dev.is_active_deployment(now));
    }

    #[test]
    fn test_temperature_unit() {
        assert_eq!(TemperatureUnit::parse("F"), Some(TemperatureUnit::Fahrenheit));
        assert_eq!(TemperatureUnit::parse("celsius"), Some(TemperatureUnit::Celsius));
        assert_eq!(TemperatureUnit::parse("kelvin"), None);
        assert_eq!(TemperatureUnit::Fahrenheit.from_celsius(25.0), 77.0);
        assert_eq!(
            serde_json::to_string(&TemperatureUnit::Fahrenheit).unwrap(),
            "\"F\""
        );
    }

    #[test]
    fn test_profile_display_name_fallbacks() {
        let mut profile = Profile {
            id: Uuid::new_v4(),
            full_name: Some("  ".to_string()),
            email: Some("ana@farm.ph".to_string()),
            role: Role::Viewer,
            company: None,
            updated_at: None,
        };
        assert_eq!(profile.display_name(), "ana@farm.ph");
        profile.full_name = Some("Ana Reyes".to_string());
        assert_eq!(profile.display_name(), "Ana Reyes");
        profile.full_name = None;
        profile.email = None;
        assert_eq!(profile.display_name(), "AGRIna user");
    }
}
