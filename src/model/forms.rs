//! Submitted form payloads and their validation into typed updates.

use super::data::{
    Coordinates, DeviceSettingsUpdate, NewDevice, ProfileUpdate, TemperatureUnit,
    UserPreferences,
};
use super::time::parse_date_or_timestamp;
use crate::error::{DashboardError, Result};
use serde::Deserialize;
use uuid::Uuid;

pub const DEFAULT_UPDATE_INTERVAL_SECONDS: u32 = 300;
pub const DEFAULT_FIRMWARE_VERSION: &str = "1.0.0";
pub const DEFAULT_DEVICE_STATUS: &str = "Active";
pub const MIN_PASSWORD_LEN: usize = 6;

/// Trimmed, non-empty text or `None`.
fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// HTML checkboxes are only submitted when ticked.
fn checked(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some("on" | "true" | "1"))
}

fn interval(value: Option<String>) -> Result<u32> {
    match text(value) {
        None => Ok(DEFAULT_UPDATE_INTERVAL_SECONDS),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|secs| (1..=86_400).contains(secs))
            .ok_or_else(|| {
                DashboardError::validation("Update interval must be between 1 and 86400 seconds")
            }),
    }
}

/// The "new deployment" form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentForm {
    pub name: Option<String>,
    pub serial_number: Option<String>,
    pub status: Option<String>,
    pub firmware_version: Option<String>,
    pub update_interval_seconds: Option<String>,
    pub auto_sync: Option<String>,
    pub lot_owner: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub crop_type: Option<String>,
    pub field_description: Option<String>,
    pub notes: Option<String>,
}

impl DeploymentForm {
    pub fn validate(self) -> Result<NewDevice> {
        let auto_sync = checked(&self.auto_sync);
        let (name, serial_number) = match (text(self.name), text(self.serial_number)) {
            (Some(name), Some(serial)) => (name, serial),
            _ => {
                return Err(DashboardError::validation(
                    "Name and Serial Number are required",
                ))
            }
        };

        let start_date = optional_date(self.start_date, "Start date")?;
        let end_date = optional_date(self.end_date, "End date")?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(DashboardError::validation(
                    "End date must not be before start date",
                ));
            }
        }

        Ok(NewDevice {
            serial_number,
            name,
            status: text(self.status).unwrap_or_else(|| DEFAULT_DEVICE_STATUS.to_string()),
            firmware_version: text(self.firmware_version)
                .unwrap_or_else(|| DEFAULT_FIRMWARE_VERSION.to_string()),
            update_interval_seconds: interval(self.update_interval_seconds)?,
            auto_sync,
            lot_owner: text(self.lot_owner),
            start_date,
            end_date,
            coordinates: coordinates(self.lat, self.lng)?,
            crop_type: text(self.crop_type),
            field_description: text(self.field_description),
            notes: text(self.notes),
        })
    }
}

fn optional_date(
    value: Option<String>,
    label: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    match text(value) {
        None => Ok(None),
        Some(raw) => parse_date_or_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| DashboardError::validation(format!("{} is not a valid date", label))),
    }
}

fn coordinates(lat: Option<String>, lng: Option<String>) -> Result<Option<Coordinates>> {
    let (lat, lng) = match (text(lat), text(lng)) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => return Ok(None),
    };
    let lat: f64 = lat
        .parse()
        .ok()
        .filter(|v: &f64| (-90.0..=90.0).contains(v))
        .ok_or_else(|| DashboardError::validation("Latitude must be between -90 and 90"))?;
    let lng: f64 = lng
        .parse()
        .ok()
        .filter(|v: &f64| (-180.0..=180.0).contains(v))
        .ok_or_else(|| DashboardError::validation("Longitude must be between -180 and 180"))?;
    Ok(Some(Coordinates { lat, lng }))
}

/// Device settings form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceSettingsForm {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub update_interval: Option<String>,
    pub temperature_unit: Option<String>,
    pub auto_sync: Option<String>,
}

impl DeviceSettingsForm {
    pub fn validate(self) -> Result<(Uuid, DeviceSettingsUpdate)> {
        let device_id = text(self.device_id)
            .ok_or_else(|| DashboardError::validation("Device ID missing"))?;
        let device_id = Uuid::parse_str(&device_id)
            .map_err(|_| DashboardError::validation("Device ID is not valid"))?;
        let name = text(self.device_name)
            .ok_or_else(|| DashboardError::validation("Device name is required"))?;
        let temperature_unit = match text(self.temperature_unit) {
            None => TemperatureUnit::default(),
            Some(raw) => TemperatureUnit::parse(&raw)
                .ok_or_else(|| DashboardError::validation("Unknown temperature unit"))?,
        };

        Ok((
            device_id,
            DeviceSettingsUpdate {
                name,
                update_interval_seconds: interval(self.update_interval)?,
                temperature_unit,
                auto_sync: checked(&self.auto_sync),
            },
        ))
    }
}

/// Profile form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    pub full_name: Option<String>,
    pub company: Option<String>,
}

impl ProfileForm {
    pub fn into_update(self) -> ProfileUpdate {
        ProfileUpdate {
            full_name: text(self.full_name),
            company: text(self.company),
        }
    }
}

/// Notification and data preferences form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesForm {
    pub alerts_enabled: Option<String>,
    pub email_notifications: Option<String>,
    pub data_retention: Option<String>,
    pub timezone: Option<String>,
}

impl PreferencesForm {
    pub fn validate(self, user_id: Uuid) -> Result<UserPreferences> {
        let defaults = UserPreferences::defaults_for(user_id);
        let data_retention_days = match text(self.data_retention) {
            None => defaults.data_retention_days,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|days| (1..=3650).contains(days))
                .ok_or_else(|| {
                    DashboardError::validation("Data retention must be between 1 and 3650 days")
                })?,
        };
        let timezone = text(self.timezone).unwrap_or(defaults.timezone);
        if timezone.len() > 64 {
            return Err(DashboardError::validation("Timezone is not valid"));
        }

        Ok(UserPreferences {
            user_id,
            alerts_enabled: checked(&self.alerts_enabled),
            email_notifications: checked(&self.email_notifications),
            data_retention_days,
            timezone,
        })
    }
}

/// Sign-in form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub redirected_from: Option<String>,
}

/// Sign-up form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupForm {
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl SignupForm {
    /// Returns `(full_name, email, password)`.
    pub fn validate(self) -> Result<(Option<String>, String, String)> {
        let email = self.email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(DashboardError::validation("A valid e-mail address is required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DashboardError::validation(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok((text(self.name), email, self.password))
    }
}
