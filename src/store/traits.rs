//! Traits for the backing data store.

use crate::error::Result;
use crate::model::{
    Device, DeviceSettingsUpdate, NewDevice, NewReading, Profile, ProfileUpdate, SensorReading,
    UserPreferences,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on rows a limited listing may return.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Sort direction on `recorded_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Ascending,
    #[default]
    Descending,
}

/// Filter for reading listings: device, inclusive time range, order and limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingQuery {
    pub device_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub order: Order,
    pub limit: Option<usize>,
}

impl ReadingQuery {
    pub fn for_device(device_id: Uuid) -> Self {
        Self {
            device_id: Some(device_id),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a reading passes the device and time filters.
    ///
    /// Readings whose timestamp cannot be parsed only pass when no time
    /// bound is set.
    pub fn matches(&self, reading: &SensorReading) -> bool {
        if self.device_id.is_some_and(|id| id != reading.device_id) {
            return false;
        }
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        match reading.recorded_instant() {
            Some(at) => {
                self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
            }
            None => false,
        }
    }

    /// Limit actually applied, capped at [`MAX_QUERY_LIMIT`]. `None` means
    /// every matching row.
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.map(|limit| limit.min(MAX_QUERY_LIMIT))
    }
}

/// Table-style access to devices, readings, profiles and preferences, plus
/// push notification of inserted readings.
///
/// Implementations must be cheap to share behind an `Arc`; every handler and
/// live feed holds one.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// All devices, oldest first.
    async fn list_devices(&self) -> Result<Vec<Device>>;

    async fn get_device(&self, id: Uuid) -> Result<Option<Device>>;

    async fn device_count(&self) -> Result<usize>;

    /// Register a new deployment. Serial numbers are unique.
    async fn create_device(&self, device: NewDevice) -> Result<Device>;

    async fn update_device_settings(&self, id: Uuid, update: DeviceSettingsUpdate)
        -> Result<Device>;

    /// Record that telemetry arrived from a device.
    async fn touch_device(&self, id: Uuid, seen_at: DateTime<Utc>) -> Result<()>;

    /// Insert a reading and notify subscribers.
    async fn insert_reading(&self, reading: NewReading) -> Result<SensorReading>;

    /// The reading with the greatest `recorded_at` for a device.
    async fn latest_reading(&self, device_id: Uuid) -> Result<Option<SensorReading>>;

    async fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<SensorReading>>;

    /// Number of readings passing the device and time filters, ignoring the limit.
    async fn count_readings(&self, query: &ReadingQuery) -> Result<usize>;

    /// Stream of readings inserted from now on, optionally for one device only.
    ///
    /// Dropping the stream ends the subscription.
    async fn subscribe_readings(
        &self,
        device_id: Option<Uuid>,
    ) -> Result<BoxStream<'static, SensorReading>>;

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;

    async fn upsert_profile(&self, profile: Profile) -> Result<()>;

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Profile>;

    /// Stored preferences, or the defaults when the user never saved any.
    async fn get_preferences(&self, user_id: Uuid) -> Result<UserPreferences>;

    async fn upsert_preferences(&self, preferences: UserPreferences) -> Result<()>;
}
