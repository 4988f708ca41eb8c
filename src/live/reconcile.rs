//! Merge of polled and pushed readings into one freshest reading.
//!
//! Both sources may deliver the same row, in any order. The held reading is
//! only ever replaced by a strictly newer `recorded_at`, so the result does
//! not depend on which source arrives first.

use crate::model::SensorReading;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Where a candidate reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    Poll,
    Push,
}

/// Freshest known reading for one device.
#[derive(Debug, Clone)]
pub struct LiveReadingState {
    device_id: Uuid,
    current: Option<SensorReading>,
    last_updated_at: DateTime<Utc>,
}

impl LiveReadingState {
    pub fn new(device_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            current: None,
            last_updated_at: now,
        }
    }

    pub fn device_id(&self) -> Uuid {
        self.device_id
    }

    pub fn current(&self) -> Option<&SensorReading> {
        self.current.as_ref()
    }

    /// Wall-clock time of the last accepted change.
    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    /// Offer a candidate. Returns `true` when it replaced the held reading.
    pub fn offer(&mut self, candidate: SensorReading, now: DateTime<Utc>) -> bool {
        if candidate.device_id != self.device_id {
            return false;
        }
        if !supersedes(&candidate, self.current.as_ref()) {
            return false;
        }
        self.current = Some(candidate);
        self.last_updated_at = now;
        true
    }
}

/// Whether `candidate` should replace `held`.
///
/// Anything replaces nothing. A parseable timestamp replaces an unparseable
/// one; an unparseable candidate never replaces a held reading.
pub fn supersedes(candidate: &SensorReading, held: Option<&SensorReading>) -> bool {
    let Some(held) = held else {
        return true;
    };
    match (candidate.recorded_instant(), held.recorded_instant()) {
        (Some(new), Some(old)) => new > old,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
