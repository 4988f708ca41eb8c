//! In-process implementation of [`DataStore`].
//!
//! Tables live behind a single `RwLock`; inserted readings are fanned out to
//! subscribers through a broadcast channel, the same way the hosted store
//! delivers insert notifications. The readings table is capped; once full,
//! the oldest inserted rows are dropped.

use crate::error::{DashboardError, Result};
use crate::model::{
    Device, DeviceSettingsUpdate, NewDevice, NewReading, Profile, ProfileUpdate, SensorReading,
    UserPreferences,
};
use crate::store::traits::{DataStore, Order, ReadingQuery};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{future, stream::BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};
use uuid::Uuid;

const INSERT_CHANNEL_CAPACITY: usize = 256;

/// Readings kept by [`MemoryStore::new`].
pub const DEFAULT_READING_CAP: usize = 100_000;

#[derive(Default)]
struct Tables {
    devices: Vec<Device>,
    readings: VecDeque<SensorReading>,
    next_reading_id: i64,
    profiles: HashMap<Uuid, Profile>,
    preferences: HashMap<Uuid, UserPreferences>,
}

impl Tables {
    fn push_reading(&mut self, reading: SensorReading, cap: usize) {
        while self.readings.len() >= cap {
            if let Some(dropped) = self.readings.pop_front() {
                debug!("Reading cap reached, dropped reading {}", dropped.id);
            }
        }
        self.readings.push_back(reading);
    }
}

/// Store keeping every table in memory.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    inserts: broadcast::Sender<SensorReading>,
    reading_cap: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (inserts, _rx) = broadcast::channel(INSERT_CHANNEL_CAPACITY);
        Self {
            tables: RwLock::new(Tables {
                next_reading_id: 1,
                ..Default::default()
            }),
            inserts,
            reading_cap: DEFAULT_READING_CAP,
        }
    }

    /// Keep at most `cap` readings (at least one).
    pub fn with_reading_cap(mut self, cap: usize) -> Self {
        self.reading_cap = cap.max(1);
        self
    }

    /// Number of stored readings.
    pub async fn reading_count(&self) -> usize {
        self.tables.read().await.readings.len()
    }

    /// Insert a row exactly as another client wrote it, keeping its
    /// `recorded_at` text untouched. The row id is reassigned.
    pub async fn insert_raw(&self, mut reading: SensorReading) -> Result<SensorReading> {
        {
            let mut tables = self.tables.write().await;
            if !tables.devices.iter().any(|d| d.id == reading.device_id) {
                return Err(DashboardError::not_found(format!(
                    "device {}",
                    reading.device_id
                )));
            }
            reading.id = tables.next_reading_id;
            tables.next_reading_id += 1;
            tables.push_reading(reading.clone(), self.reading_cap);
        }
        self.notify(&reading);
        Ok(reading)
    }

    fn notify(&self, reading: &SensorReading) {
        // No receivers is the normal state when nobody watches the live view.
        match self.inserts.send(reading.clone()) {
            Ok(receivers) => debug!(
                "Notified {} subscribers of reading {} for device {}",
                receivers, reading.id, reading.device_id
            ),
            Err(_) => debug!("No subscribers for reading {}", reading.id),
        }
    }

    /// Number of live insert subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inserts.receiver_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn device_mut<'a>(tables: &'a mut Tables, id: Uuid) -> Result<&'a mut Device> {
    tables
        .devices
        .iter_mut()
        .find(|d| d.id == id)
        .ok_or_else(|| DashboardError::not_found(format!("device {}", id)))
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        Ok(self.tables.read().await.devices.clone())
    }

    async fn get_device(&self, id: Uuid) -> Result<Option<Device>> {
        let tables = self.tables.read().await;
        Ok(tables.devices.iter().find(|d| d.id == id).cloned())
    }

    async fn device_count(&self) -> Result<usize> {
        Ok(self.tables.read().await.devices.len())
    }

    async fn create_device(&self, new: NewDevice) -> Result<Device> {
        let mut tables = self.tables.write().await;
        if tables
            .devices
            .iter()
            .any(|d| d.serial_number.eq_ignore_ascii_case(&new.serial_number))
        {
            return Err(DashboardError::conflict(format!(
                "a device with serial number {} already exists",
                new.serial_number
            )));
        }

        let device = Device {
            id: Uuid::new_v4(),
            serial_number: new.serial_number,
            name: new.name,
            status: new.status,
            firmware_version: Some(new.firmware_version),
            last_seen: None,
            update_interval_seconds: new.update_interval_seconds,
            temperature_unit: Default::default(),
            auto_sync: new.auto_sync,
            lot_owner: new.lot_owner,
            start_date: new.start_date,
            end_date: new.end_date,
            coordinates: new.coordinates,
            crop_type: new.crop_type,
            field_description: new.field_description,
            notes: new.notes,
            created_at: Utc::now(),
        };
        tables.devices.push(device.clone());
        Ok(device)
    }

    async fn update_device_settings(
        &self,
        id: Uuid,
        update: DeviceSettingsUpdate,
    ) -> Result<Device> {
        let mut tables = self.tables.write().await;
        let device = device_mut(&mut tables, id)?;
        device.name = update.name;
        device.update_interval_seconds = update.update_interval_seconds;
        device.temperature_unit = update.temperature_unit;
        device.auto_sync = update.auto_sync;
        Ok(device.clone())
    }

    async fn touch_device(&self, id: Uuid, seen_at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let device = device_mut(&mut tables, id)?;
        if device.last_seen.map_or(true, |seen| seen < seen_at) {
            device.last_seen = Some(seen_at);
        }
        Ok(())
    }

    async fn insert_reading(&self, new: NewReading) -> Result<SensorReading> {
        let reading = {
            let mut tables = self.tables.write().await;
            let device = device_mut(&mut tables, new.device_id)?;
            if device.last_seen.map_or(true, |seen| seen < new.recorded_at) {
                device.last_seen = Some(new.recorded_at);
            }

            let reading = SensorReading {
                id: tables.next_reading_id,
                device_id: new.device_id,
                recorded_at: Some(new.recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
                ph: new.ph,
                temperature: new.temperature,
                nitrogen: new.nitrogen,
                phosphorus: new.phosphorus,
                potassium: new.potassium,
                signal_quality: new.signal_quality,
            };
            tables.next_reading_id += 1;
            tables.push_reading(reading.clone(), self.reading_cap);
            reading
        };
        self.notify(&reading);
        Ok(reading)
    }

    async fn latest_reading(&self, device_id: Uuid) -> Result<Option<SensorReading>> {
        let tables = self.tables.read().await;
        Ok(tables
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .max_by_key(|r| r.recorded_instant())
            .cloned())
    }

    async fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<SensorReading>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<SensorReading> = tables
            .readings
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        // Stable sort keeps insertion order between equal timestamps.
        rows.sort_by_key(|r| r.recorded_instant());
        if query.order == Order::Descending {
            rows.reverse();
        }
        if let Some(limit) = query.effective_limit() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn count_readings(&self, query: &ReadingQuery) -> Result<usize> {
        let tables = self.tables.read().await;
        Ok(tables.readings.iter().filter(|r| query.matches(r)).count())
    }

    async fn subscribe_readings(
        &self,
        device_id: Option<Uuid>,
    ) -> Result<BoxStream<'static, SensorReading>> {
        let stream = BroadcastStream::new(self.inserts.subscribe()).filter_map(move |item| {
            let keep = match item {
                Ok(reading) if device_id.map_or(true, |id| id == reading.device_id) => {
                    Some(reading)
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Insert subscriber lagged, skipped {} readings", skipped);
                    None
                }
            };
            future::ready(keep)
        });
        Ok(stream.boxed())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<()> {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.id, profile);
        Ok(())
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Profile> {
        let mut tables = self.tables.write().await;
        let profile = tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| DashboardError::not_found(format!("profile {}", user_id)))?;
        profile.full_name = update.full_name;
        profile.company = update.company;
        profile.updated_at = Some(Utc::now());
        Ok(profile.clone())
    }

    async fn get_preferences(&self, user_id: Uuid) -> Result<UserPreferences> {
        let tables = self.tables.read().await;
        Ok(tables
            .preferences
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserPreferences::defaults_for(user_id)))
    }

    async fn upsert_preferences(&self, preferences: UserPreferences) -> Result<()> {
        self.tables
            .write()
            .await
            .preferences
            .insert(preferences.user_id, preferences);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, TemperatureUnit};
    use chrono::{Duration, TimeZone};

    fn new_device(serial: &str) -> NewDevice {
        NewDevice {
            serial_number: serial.to_string(),
            name: format!("Sensor {}", serial),
            status: "Active".to_string(),
            firmware_version: "1.0.0".to_string(),
            update_interval_seconds: 300,
            auto_sync: true,
            lot_owner: None,
            start_date: None,
            end_date: None,
            coordinates: None,
            crop_type: Some("Rice".to_string()),
            field_description: None,
            notes: None,
        }
    }

    fn reading_at(device_id: Uuid, at: DateTime<Utc>, ph: f64) -> NewReading {
        NewReading {
            device_id,
            recorded_at: at,
            ph,
            temperature: 25.0,
            nitrogen: 45.0,
            phosphorus: 28.0,
            potassium: 180.0,
            signal_quality: Some(80),
        }
    }

    #[tokio::test]
    async fn test_duplicate_serial_is_conflict() {
        let store = MemoryStore::new();
        store.create_device(new_device("AGR-1")).await.unwrap();
        let err = store.create_device(new_device("agr-1")).await.unwrap_err();
        assert!(matches!(err, DashboardError::Conflict(_)));
        assert_eq!(store.device_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latest_reading_is_max_recorded_at() {
        let store = MemoryStore::new();
        let device = store.create_device(new_device("AGR-1")).await.unwrap();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        store
            .insert_reading(reading_at(device.id, base + Duration::minutes(10), 6.5))
            .await
            .unwrap();
        // Arrives later but was recorded earlier.
        store
            .insert_reading(reading_at(device.id, base, 6.1))
            .await
            .unwrap();

        let latest = store.latest_reading(device.id).await.unwrap().unwrap();
        assert_eq!(latest.ph, 6.5);

        let seen = store.get_device(device.id).await.unwrap().unwrap();
        assert_eq!(seen.last_seen, Some(base + Duration::minutes(10)));
    }

    #[tokio::test]
    async fn test_reading_cap_drops_oldest() {
        let store = MemoryStore::new().with_reading_cap(3);
        let device = store.create_device(new_device("AGR-1")).await.unwrap();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        for minute in 0..5 {
            store
                .insert_reading(reading_at(device.id, base + Duration::minutes(minute), 6.0))
                .await
                .unwrap();
        }
        assert_eq!(store.reading_count().await, 3);

        let rows = store
            .query_readings(&ReadingQuery::for_device(device.id).with_order(Order::Ascending))
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(
            store.latest_reading(device.id).await.unwrap().unwrap().id,
            5
        );
    }

    #[tokio::test]
    async fn test_insert_for_unknown_device_fails() {
        let store = MemoryStore::new();
        let err = store
            .insert_reading(reading_at(Uuid::new_v4(), Utc::now(), 6.5))
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = MemoryStore::new();
        let a = store.create_device(new_device("AGR-A")).await.unwrap();
        let b = store.create_device(new_device("AGR-B")).await.unwrap();
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        for hour in 0..5 {
            store
                .insert_reading(reading_at(a.id, base + Duration::hours(hour), 6.0))
                .await
                .unwrap();
        }
        store
            .insert_reading(reading_at(b.id, base, 7.0))
            .await
            .unwrap();

        let query = ReadingQuery::for_device(a.id)
            .with_range(Some(base + Duration::hours(1)), Some(base + Duration::hours(3)))
            .with_order(Order::Ascending);
        let rows = store.query_readings(&query).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].recorded_instant() < rows[2].recorded_instant());

        let newest_two = store
            .query_readings(&ReadingQuery::default().with_limit(2))
            .await
            .unwrap();
        assert_eq!(newest_two.len(), 2);
        assert_eq!(
            newest_two[0].recorded_instant(),
            Some(base + Duration::hours(4))
        );
    }

    #[tokio::test]
    async fn test_subscription_filters_by_device() {
        let store = MemoryStore::new();
        let a = store.create_device(new_device("AGR-A")).await.unwrap();
        let b = store.create_device(new_device("AGR-B")).await.unwrap();
        let mut stream = store.subscribe_readings(Some(a.id)).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);

        store
            .insert_reading(reading_at(b.id, Utc::now(), 7.0))
            .await
            .unwrap();
        store
            .insert_reading(reading_at(a.id, Utc::now(), 6.4))
            .await
            .unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(received.device_id, a.id);
        assert_eq!(received.ph, 6.4);

        drop(stream);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_profile_and_preferences() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        assert!(store.get_profile(user).await.unwrap().is_none());
        assert_eq!(
            store.get_preferences(user).await.unwrap(),
            UserPreferences::defaults_for(user)
        );

        store
            .upsert_profile(Profile {
                id: user,
                full_name: Some("Ana".to_string()),
                email: Some("ana@farm.ph".to_string()),
                role: Role::Admin,
                company: None,
                updated_at: None,
            })
            .await
            .unwrap();
        let updated = store
            .update_profile(
                user,
                ProfileUpdate {
                    full_name: Some("Ana Reyes".to_string()),
                    company: Some("AGRIna".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Ana Reyes"));
        assert!(updated.updated_at.is_some());

        let err = store
            .update_profile(Uuid::new_v4(), ProfileUpdate { full_name: None, company: None })
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_device_settings() {
        let store = MemoryStore::new();
        let device = store.create_device(new_device("AGR-1")).await.unwrap();
        let updated = store
            .update_device_settings(
                device.id,
                DeviceSettingsUpdate {
                    name: "North plot".to_string(),
                    update_interval_seconds: 60,
                    temperature_unit: TemperatureUnit::Fahrenheit,
                    auto_sync: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "North plot");
        assert_eq!(updated.temperature_unit, TemperatureUnit::Fahrenheit);
        assert_eq!(updated.serial_number, "AGR-1");
    }
}
