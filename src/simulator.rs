//! Demo data and synthetic telemetry.
//!
//! `--demo` seeds an admin account and two field devices with a backfilled
//! day of readings; the simulator then keeps inserting readings so the live
//! view has something to show without real hardware.

use crate::auth::AuthProvider;
use crate::error::{DashboardError, Result};
use crate::model::{Coordinates, NewDevice, NewReading, Profile, Role, SensorReading};
use crate::store::DataStore;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEMO_ADMIN_EMAIL: &str = "admin@agrina.local";
pub const DEMO_ADMIN_PASSWORD: &str = "agrina-demo";

const BACKFILL_HOURS: i64 = 24;
const BACKFILL_STEP_MINUTES: i64 = 30;

/// What [`seed_demo`] created.
#[derive(Debug, Clone)]
pub struct DemoSeed {
    pub admin_id: Option<Uuid>,
    pub device_ids: Vec<Uuid>,
    pub readings: usize,
}

fn demo_devices(now: DateTime<Utc>) -> Vec<NewDevice> {
    vec![
        NewDevice {
            serial_number: "AGR-DEMO001".to_string(),
            name: "North Field Sensor".to_string(),
            status: "Active".to_string(),
            firmware_version: "1.0.0".to_string(),
            update_interval_seconds: 60,
            auto_sync: true,
            lot_owner: Some("Dela Cruz Farm".to_string()),
            start_date: Some(now - Duration::days(30)),
            end_date: Some(now + Duration::days(60)),
            coordinates: Some(Coordinates {
                lat: 14.1675,
                lng: 121.2431,
            }),
            crop_type: Some("Rice".to_string()),
            field_description: Some("Irrigated lowland paddy".to_string()),
            notes: None,
        },
        NewDevice {
            serial_number: "AGR-DEMO002".to_string(),
            name: "Orchard Sensor".to_string(),
            status: "Active".to_string(),
            firmware_version: "1.0.0".to_string(),
            update_interval_seconds: 300,
            auto_sync: false,
            lot_owner: Some("Santos Orchard".to_string()),
            start_date: Some(now - Duration::days(10)),
            end_date: None,
            coordinates: Some(Coordinates {
                lat: 14.2091,
                lng: 121.1655,
            }),
            crop_type: Some("Mango".to_string()),
            field_description: None,
            notes: Some("Sloped terrain, check drainage".to_string()),
        },
    ]
}

/// Soil values drifting in small random steps within plausible bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilSample {
    pub ph: f64,
    pub temperature: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
}

impl SoilSample {
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            ph: rng.gen_range(5.8..7.2),
            temperature: rng.gen_range(22.0..30.0),
            nitrogen: rng.gen_range(30.0..60.0),
            phosphorus: rng.gen_range(15.0..40.0),
            potassium: rng.gen_range(120.0..250.0),
        }
    }

    pub fn from_reading(reading: &SensorReading) -> Self {
        Self {
            ph: reading.ph,
            temperature: reading.temperature,
            nitrogen: reading.nitrogen,
            phosphorus: reading.phosphorus,
            potassium: reading.potassium,
        }
    }

    /// Next sample of the walk.
    pub fn step<R: Rng>(self, rng: &mut R) -> Self {
        Self {
            ph: drift(rng, self.ph, 0.05, 4.0, 9.0),
            temperature: drift(rng, self.temperature, 0.3, 5.0, 45.0),
            nitrogen: drift(rng, self.nitrogen, 1.5, 0.0, 200.0),
            phosphorus: drift(rng, self.phosphorus, 1.0, 0.0, 150.0),
            potassium: drift(rng, self.potassium, 4.0, 0.0, 600.0),
        }
    }

    pub fn into_reading(self, device_id: Uuid, recorded_at: DateTime<Utc>, signal: i32) -> NewReading {
        NewReading {
            device_id,
            recorded_at,
            ph: self.ph,
            temperature: self.temperature,
            nitrogen: self.nitrogen,
            phosphorus: self.phosphorus,
            potassium: self.potassium,
            signal_quality: Some(signal),
        }
    }
}

/// Move `value` by at most `delta`, clamped and rounded to two decimals.
fn drift<R: Rng>(rng: &mut R, value: f64, delta: f64, min: f64, max: f64) -> f64 {
    let moved = value + rng.gen_range(-delta..=delta);
    (moved.clamp(min, max) * 100.0).round() / 100.0
}

/// Seed the demo admin account, devices and a day of readings.
///
/// Devices whose serial already exists are left alone, so seeding twice is
/// harmless.
pub async fn seed_demo(
    store: &dyn DataStore,
    auth: &dyn AuthProvider,
    now: DateTime<Utc>,
) -> Result<DemoSeed> {
    let admin_id = match auth.sign_up(DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD).await {
        Ok(user) => {
            store
                .upsert_profile(Profile {
                    id: user.id,
                    full_name: Some("Demo Admin".to_string()),
                    email: Some(user.email.clone()),
                    role: Role::Admin,
                    company: Some("AGRIna".to_string()),
                    updated_at: Some(now),
                })
                .await?;
            info!("Seeded demo account {}", user.email);
            Some(user.id)
        }
        Err(DashboardError::Conflict(_)) => {
            debug!("Demo account already present");
            None
        }
        Err(e) => return Err(e),
    };

    let existing = store.list_devices().await?;
    let mut rng = StdRng::from_entropy();
    let mut device_ids = Vec::new();
    let mut readings = 0;

    for new_device in demo_devices(now) {
        if existing
            .iter()
            .any(|device| device.serial_number == new_device.serial_number)
        {
            continue;
        }
        let device = store.create_device(new_device).await?;
        let mut sample = SoilSample::random(&mut rng);
        let mut at = now - Duration::hours(BACKFILL_HOURS);
        while at <= now {
            let signal = rng.gen_range(55..=98);
            store
                .insert_reading(sample.into_reading(device.id, at, signal))
                .await?;
            readings += 1;
            sample = sample.step(&mut rng);
            at += Duration::minutes(BACKFILL_STEP_MINUTES);
        }
        info!("Seeded demo device {} ({})", device.serial_number, device.id);
        device_ids.push(device.id);
    }

    Ok(DemoSeed {
        admin_id,
        device_ids,
        readings,
    })
}

/// Synthetic telemetry for every active device.
pub struct ReadingSimulator {
    store: Arc<dyn DataStore>,
    rng: StdRng,
    samples: HashMap<Uuid, SoilSample>,
}

impl ReadingSimulator {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            rng: StdRng::from_entropy(),
            samples: HashMap::new(),
        }
    }

    /// Insert one reading per active device; returns how many were inserted.
    pub async fn step(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let devices = self.store.list_devices().await?;
        let mut inserted = 0;
        for device in devices.iter().filter(|d| d.status.eq_ignore_ascii_case("active")) {
            let current = match self.samples.get(&device.id) {
                Some(sample) => *sample,
                None => match self.store.latest_reading(device.id).await? {
                    Some(reading) => SoilSample::from_reading(&reading),
                    None => SoilSample::random(&mut self.rng),
                },
            };
            let next = current.step(&mut self.rng);
            let signal = self.rng.gen_range(55..=98);
            self.store
                .insert_reading(next.into_reading(device.id, now, signal))
                .await?;
            self.samples.insert(device.id, next);
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Run [`ReadingSimulator::step`] every `interval` until the task is aborted.
    pub fn spawn(mut self, interval: std::time::Duration) -> JoinHandle<()> {
        info!("Demo simulator inserting readings every {:?}", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.step(Utc::now()).await {
                    Ok(count) => debug!("Simulated {} readings", count),
                    Err(e) => warn!("Simulated reading failed: {}", e),
                }
            }
        })
    }
}
