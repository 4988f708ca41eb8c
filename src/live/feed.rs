//! Per-device live feed: poll timer, insert subscription and status tick in
//! one task.
//!
//! All three sources are multiplexed with `tokio::select!` inside a single
//! task that owns the [`LiveReadingState`], so no lock guards it. Dropping the
//! [`LiveFeedHandle`] aborts the task, which drops the timers and the
//! subscription with it.

use crate::error::Result;
use crate::live::reconcile::{LiveReadingState, ReadingSource};
use crate::live::status::{evaluate, offline_threshold_secs, ConnectionStatus};
use crate::model::SensorReading;
use crate::store::DataStore;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Timing of a live feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    /// How often the latest reading is fetched
    pub poll_interval: Duration,
    /// How often the status is recomputed without new data
    pub status_interval: Duration,
    /// Offline tolerance per registered device, in seconds
    pub offline_secs_per_device: u64,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(crate::DEFAULT_POLL_INTERVAL_MS),
            status_interval: Duration::from_millis(crate::DEFAULT_STATUS_INTERVAL_MS),
            offline_secs_per_device: crate::live::status::DEFAULT_OFFLINE_SECS_PER_DEVICE,
        }
    }
}

/// What caused a [`LiveUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    Initial,
    Poll,
    Push,
    Tick,
}

impl From<ReadingSource> for UpdateSource {
    fn from(source: ReadingSource) -> Self {
        match source {
            ReadingSource::Poll => Self::Poll,
            ReadingSource::Push => Self::Push,
        }
    }
}

/// State of one device's live view, sent to the consumer on every change and
/// every status tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    pub device_id: Uuid,
    pub reading: Option<SensorReading>,
    pub status: ConnectionStatus,
    pub threshold_secs: i64,
    pub last_updated_at: DateTime<Utc>,
    pub source: UpdateSource,
}

/// Owner of a running feed. Dropping it stops the feed.
#[derive(Debug)]
pub struct LiveFeedHandle {
    device_id: Uuid,
    task: JoinHandle<()>,
}

impl LiveFeedHandle {
    pub fn device_id(&self) -> Uuid {
        self.device_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LiveFeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Latest reading of a device with its status, for one-off rendering.
pub async fn latest_with_status(
    store: &dyn DataStore,
    device_id: Uuid,
    offline_secs_per_device: u64,
) -> Result<(Option<SensorReading>, ConnectionStatus, i64)> {
    let threshold = offline_threshold_secs(store.device_count().await?, offline_secs_per_device);
    let reading = store.latest_reading(device_id).await?;
    let status = evaluate(reading.as_ref(), Utc::now(), threshold);
    Ok((reading, status, threshold))
}

/// Start the live feed for `device_id`, delivering updates into `updates`.
///
/// The insert subscription is opened before the first fetch so no reading
/// can fall between the two. The first update is sent with
/// [`UpdateSource::Initial`] whether or not a reading exists.
pub async fn start_live_feed(
    store: Arc<dyn DataStore>,
    device_id: Uuid,
    options: FeedOptions,
    updates: mpsc::Sender<LiveUpdate>,
) -> Result<LiveFeedHandle> {
    let inserts = store.subscribe_readings(Some(device_id)).await?;
    let device_count = store.device_count().await?;
    let mut state = LiveReadingState::new(device_id, Utc::now());
    if let Some(reading) = store.latest_reading(device_id).await? {
        state.offer(reading, Utc::now());
    }

    info!("Starting live feed for device {}", device_id);
    let task = tokio::spawn(run_feed(
        store,
        state,
        inserts,
        device_count,
        options,
        updates,
    ));

    Ok(LiveFeedHandle { device_id, task })
}

async fn run_feed(
    store: Arc<dyn DataStore>,
    mut state: LiveReadingState,
    mut inserts: futures_util::stream::BoxStream<'static, SensorReading>,
    device_count: usize,
    options: FeedOptions,
    updates: mpsc::Sender<LiveUpdate>,
) {
    let device_id = state.device_id();
    let mut threshold = offline_threshold_secs(device_count, options.offline_secs_per_device);

    if updates
        .send(snapshot(&state, threshold, UpdateSource::Initial))
        .await
        .is_err()
    {
        return;
    }

    // The initial fetch already happened; start both timers one period out.
    let mut poll = time::interval_at(Instant::now() + options.poll_interval, options.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick = time::interval_at(
        Instant::now() + options.status_interval,
        options.status_interval,
    );
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut push_open = true;

    loop {
        let update = tokio::select! {
            _ = poll.tick() => {
                match store.device_count().await {
                    Ok(count) => threshold = offline_threshold_secs(count, options.offline_secs_per_device),
                    Err(e) => warn!("Failed to count devices for feed {}: {}", device_id, e),
                }
                match store.latest_reading(device_id).await {
                    Ok(Some(reading)) => accept(&mut state, reading, ReadingSource::Poll, threshold),
                    Ok(None) => None,
                    Err(e) => {
                        warn!("Poll failed for device {}: {}", device_id, e);
                        None
                    }
                }
            }
            pushed = inserts.next(), if push_open => match pushed {
                Some(reading) => accept(&mut state, reading, ReadingSource::Push, threshold),
                None => {
                    warn!("Insert subscription for device {} closed, polling only", device_id);
                    push_open = false;
                    None
                }
            },
            _ = tick.tick() => Some(snapshot(&state, threshold, UpdateSource::Tick)),
        };

        if let Some(update) = update {
            if updates.send(update).await.is_err() {
                debug!("Live feed consumer for device {} went away", device_id);
                break;
            }
        }
    }

    info!("Live feed for device {} stopped", device_id);
}

fn accept(
    state: &mut LiveReadingState,
    reading: SensorReading,
    source: ReadingSource,
    threshold: i64,
) -> Option<LiveUpdate> {
    let recorded_at = reading.recorded_at.clone();
    if state.offer(reading, Utc::now()) {
        debug!(
            "Device {} reading {:?} taken from {:?}",
            state.device_id(),
            recorded_at,
            source
        );
        Some(snapshot(state, threshold, source.into()))
    } else {
        None
    }
}

fn snapshot(state: &LiveReadingState, threshold: i64, source: UpdateSource) -> LiveUpdate {
    LiveUpdate {
        device_id: state.device_id(),
        reading: state.current().cloned(),
        status: evaluate(state.current(), Utc::now(), threshold),
        threshold_secs: threshold,
        last_updated_at: state.last_updated_at(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewDevice, NewReading};
    use crate::store::MemoryStore;

    async fn store_with_device() -> (Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let device = store
            .create_device(NewDevice {
                serial_number: "AGR-T1".to_string(),
                name: "Test".to_string(),
                status: "Active".to_string(),
                firmware_version: "1.0.0".to_string(),
                update_interval_seconds: 5,
                auto_sync: true,
                lot_owner: None,
                start_date: None,
                end_date: None,
                coordinates: None,
                crop_type: None,
                field_description: None,
                notes: None,
            })
            .await
            .unwrap();
        (store, device.id)
    }

    fn new_reading(device_id: Uuid, recorded_at: DateTime<Utc>, ph: f64) -> NewReading {
        NewReading {
            device_id,
            recorded_at,
            ph,
            temperature: 26.0,
            nitrogen: 50.0,
            phosphorus: 25.0,
            potassium: 200.0,
            signal_quality: None,
        }
    }

    fn slow_options() -> FeedOptions {
        FeedOptions {
            poll_interval: Duration::from_secs(3600),
            status_interval: Duration::from_secs(3600),
            offline_secs_per_device: 60,
        }
    }

    #[tokio::test]
    async fn test_initial_update_without_reading_is_never() {
        let (store, device_id) = store_with_device().await;
        let (tx, mut rx) = mpsc::channel(8);
        let _handle = start_live_feed(store, device_id, slow_options(), tx)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.source, UpdateSource::Initial);
        assert!(first.reading.is_none());
        assert_eq!(first.status, ConnectionStatus::Never);
        assert_eq!(first.threshold_secs, 60);
    }

    #[tokio::test]
    async fn test_push_is_reflected_immediately() {
        let (store, device_id) = store_with_device().await;
        store
            .insert_reading(new_reading(device_id, Utc::now() - chrono::Duration::seconds(30), 6.1))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let _handle = start_live_feed(store.clone(), device_id, slow_options(), tx)
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.reading.as_ref().unwrap().ph, 6.1);

        store
            .insert_reading(new_reading(device_id, Utc::now(), 6.7))
            .await
            .unwrap();
        let pushed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed.source, UpdateSource::Push);
        assert_eq!(pushed.reading.unwrap().ph, 6.7);
        assert!(pushed.status.is_online());
    }

    #[tokio::test]
    async fn test_stale_push_is_not_forwarded() {
        let (store, device_id) = store_with_device().await;
        let now = Utc::now();
        store
            .insert_reading(new_reading(device_id, now, 6.5))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let _handle = start_live_feed(store.clone(), device_id, slow_options(), tx)
            .await
            .unwrap();
        rx.recv().await.unwrap();

        store
            .insert_reading(new_reading(device_id, now - chrono::Duration::minutes(5), 5.0))
            .await
            .unwrap();
        let nothing = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(nothing.is_err(), "older reading must not produce an update");
    }

    #[tokio::test]
    async fn test_status_tick_reports_offline() {
        let (store, device_id) = store_with_device().await;
        store
            .insert_reading(new_reading(device_id, Utc::now() - chrono::Duration::minutes(10), 6.5))
            .await
            .unwrap();

        let options = FeedOptions {
            status_interval: Duration::from_millis(20),
            ..slow_options()
        };
        let (tx, mut rx) = mpsc::channel(8);
        let _handle = start_live_feed(store, device_id, options, tx).await.unwrap();
        rx.recv().await.unwrap();

        let tick = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tick.source, UpdateSource::Tick);
        assert!(matches!(tick.status, ConnectionStatus::Offline { .. }));
    }

    #[tokio::test]
    async fn test_dropping_handle_releases_subscription() {
        let (store, device_id) = store_with_device().await;
        let (tx, mut rx) = mpsc::channel(8);
        let handle = start_live_feed(store.clone(), device_id, slow_options(), tx)
            .await
            .unwrap();
        rx.recv().await.unwrap();
        assert_eq!(store.subscriber_count(), 1);

        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription should be released after the handle is dropped");
    }

    #[tokio::test]
    async fn test_feed_stops_when_consumer_leaves() {
        let (store, device_id) = store_with_device().await;
        let options = FeedOptions {
            status_interval: Duration::from_millis(10),
            ..slow_options()
        };
        let (tx, rx) = mpsc::channel(1);
        let handle = start_live_feed(store, device_id, options, tx).await.unwrap();
        drop(rx);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("feed should stop once nobody listens");
    }
}
