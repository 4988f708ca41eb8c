//! Records consumed by the dashboard and the rules that interpret them.
//!
//! The backing store owns these entities; this module only defines their
//! shape, how form input becomes a valid update, how timestamps are read and
//! how soil values are rated.

pub mod agronomy;
pub mod data;
pub mod forms;
pub mod time;

// Re-export commonly used items
pub use data::{
    Coordinates, Device, DeviceSettingsUpdate, NewDevice, NewReading, Profile, ProfileUpdate,
    Role, SensorReading, TemperatureUnit, UserPreferences,
};
pub use time::parse_timestamp;
