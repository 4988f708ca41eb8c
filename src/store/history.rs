//! History views over the store: joined log rows, daily trends and the
//! dashboard summary.

use crate::error::Result;
use crate::live::status::{evaluate, offline_threshold_secs, ConnectionStatus};
use crate::model::{Device, SensorReading};
use crate::store::traits::{DataStore, ReadingQuery};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Rows shown on the history page when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// A reading joined with the device it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub reading: SensorReading,
    pub device_name: Option<String>,
    pub device_serial: Option<String>,
    pub lot_owner: Option<String>,
}

/// Per-day averages of every measured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub day: NaiveDate,
    pub samples: usize,
    pub ph: f64,
    pub temperature: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
}

/// A device with its latest reading and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOverview {
    pub device: Device,
    pub latest: Option<SensorReading>,
    pub status: ConnectionStatus,
}

/// Totals shown at the top of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_devices: usize,
    pub online_devices: usize,
    pub active_deployments: usize,
    pub readings_last_24h: usize,
    pub threshold_secs: i64,
    pub devices: Vec<DeviceOverview>,
}

/// Average and range of one measured value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl ValueStats {
    /// Stats over the finite values, or `None` when there are none.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values.into_iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }
        (count > 0).then(|| Self {
            avg: sum / count as f64,
            min,
            max,
        })
    }
}

/// Summary of everything a deployment has reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStats {
    pub readings: usize,
    pub ph: Option<ValueStats>,
    pub temperature: Option<ValueStats>,
    pub nitrogen: Option<ValueStats>,
    pub phosphorus: Option<ValueStats>,
    pub potassium: Option<ValueStats>,
    pub latest_at: Option<DateTime<Utc>>,
}

impl DeploymentStats {
    /// N:P:K averages in tens of mg/kg, rounded.
    pub fn npk_ratio(&self) -> Option<(i64, i64, i64)> {
        let tens = |stats: Option<ValueStats>| stats.map(|s| (s.avg / 10.0).round() as i64);
        Some((
            tens(self.nitrogen)?,
            tens(self.phosphorus)?,
            tens(self.potassium)?,
        ))
    }
}

/// Statistics over one device's readings.
pub fn deployment_stats(readings: &[SensorReading]) -> DeploymentStats {
    DeploymentStats {
        readings: readings.len(),
        ph: ValueStats::of(readings.iter().map(|r| r.ph)),
        temperature: ValueStats::of(readings.iter().map(|r| r.temperature)),
        nitrogen: ValueStats::of(readings.iter().map(|r| r.nitrogen)),
        phosphorus: ValueStats::of(readings.iter().map(|r| r.phosphorus)),
        potassium: ValueStats::of(readings.iter().map(|r| r.potassium)),
        latest_at: readings.iter().filter_map(|r| r.recorded_instant()).max(),
    }
}

/// [`deployment_stats`] for each device, keyed by device id.
pub async fn deployment_stats_by_device(
    store: &dyn DataStore,
    devices: &[Device],
) -> Result<HashMap<Uuid, DeploymentStats>> {
    let mut stats = HashMap::with_capacity(devices.len());
    for device in devices {
        let readings = store
            .query_readings(&ReadingQuery::for_device(device.id))
            .await?;
        stats.insert(device.id, deployment_stats(&readings));
    }
    Ok(stats)
}

/// Inclusive bounds for a `from`/`to` day pair: start of `from` up to the last
/// instant of `to`.
pub fn day_bounds(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let start = from
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc());
    let end = to
        .and_then(|day| day.and_hms_milli_opt(23, 59, 59, 999))
        .map(|naive| naive.and_utc());
    (start, end)
}

/// Readings matching `query`, each joined with its device.
pub async fn history_log(store: &dyn DataStore, query: &ReadingQuery) -> Result<Vec<LogEntry>> {
    let devices: HashMap<_, _> = store
        .list_devices()
        .await?
        .into_iter()
        .map(|device| (device.id, device))
        .collect();
    let readings = store.query_readings(query).await?;

    Ok(readings
        .into_iter()
        .map(|reading| {
            let device = devices.get(&reading.device_id);
            LogEntry {
                device_name: device.map(|d| d.name.clone()),
                device_serial: device.map(|d| d.serial_number.clone()),
                lot_owner: device.and_then(|d| d.lot_owner.clone()),
                reading,
            }
        })
        .collect())
}

#[derive(Default)]
struct DayTotals {
    samples: usize,
    ph: f64,
    temperature: f64,
    nitrogen: f64,
    phosphorus: f64,
    potassium: f64,
}

/// Average readings per UTC day, oldest day first.
///
/// Readings whose timestamp cannot be parsed are left out.
pub fn daily_trends(readings: &[SensorReading]) -> Vec<TrendPoint> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for reading in readings {
        let Some(at) = reading.recorded_instant() else {
            continue;
        };
        let totals = days.entry(at.date_naive()).or_default();
        totals.samples += 1;
        totals.ph += reading.ph;
        totals.temperature += reading.temperature;
        totals.nitrogen += reading.nitrogen;
        totals.phosphorus += reading.phosphorus;
        totals.potassium += reading.potassium;
    }

    days.into_iter()
        .map(|(day, totals)| {
            let n = totals.samples as f64;
            TrendPoint {
                day,
                samples: totals.samples,
                ph: totals.ph / n,
                temperature: totals.temperature / n,
                nitrogen: totals.nitrogen / n,
                phosphorus: totals.phosphorus / n,
                potassium: totals.potassium / n,
            }
        })
        .collect()
}

/// Build the dashboard totals and per-device cards as of `now`.
pub async fn dashboard_summary(
    store: &dyn DataStore,
    now: DateTime<Utc>,
    offline_secs_per_device: u64,
) -> Result<DashboardSummary> {
    let devices = store.list_devices().await?;
    let threshold_secs = offline_threshold_secs(devices.len(), offline_secs_per_device);

    let mut overviews = Vec::with_capacity(devices.len());
    for device in devices {
        let latest = store.latest_reading(device.id).await?;
        let status = evaluate(latest.as_ref(), now, threshold_secs);
        overviews.push(DeviceOverview {
            device,
            latest,
            status,
        });
    }

    let last_day = ReadingQuery::default().with_range(Some(now - Duration::hours(24)), Some(now));
    let readings_last_24h = store.count_readings(&last_day).await?;

    Ok(DashboardSummary {
        total_devices: overviews.len(),
        online_devices: overviews.iter().filter(|o| o.status.is_online()).count(),
        active_deployments: overviews
            .iter()
            .filter(|o| o.device.is_active_deployment(now))
            .count(),
        readings_last_24h,
        threshold_secs,
        devices: overviews,
    })
}
