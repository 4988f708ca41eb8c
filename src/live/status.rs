//! Online/offline status derived from the age of a device's latest reading.

use crate::model::SensorReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds of silence tolerated per registered device.
pub const DEFAULT_OFFLINE_SECS_PER_DEVICE: u64 = 60;

/// Connection state shown next to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No reading has ever been received.
    Never,
    /// A reading is held but its timestamp could not be read.
    Unknown,
    Online { age_secs: i64 },
    Offline { age_secs: i64 },
}

impl ConnectionStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }

    pub fn age_secs(&self) -> Option<i64> {
        match self {
            Self::Online { age_secs } | Self::Offline { age_secs } => Some(*age_secs),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Never => "NEVER",
            Self::Unknown => "UNKNOWN",
            Self::Online { .. } => "ONLINE",
            Self::Offline { .. } => "OFFLINE",
        }
    }

    /// Whether two statuses are the same state, ignoring age.
    pub fn same_state(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Offline threshold in seconds: `per_device_secs` times the device count.
///
/// More devices sharing the uplink get more tolerance before one is flagged.
/// The count is floored at one so a lone device still gets a threshold.
pub fn offline_threshold_secs(device_count: usize, per_device_secs: u64) -> i64 {
    let devices = device_count.max(1) as i64;
    (per_device_secs as i64).saturating_mul(devices)
}

/// Status of a device given its latest reading.
///
/// A device is offline only when the reading is strictly older than the
/// threshold. Readings stamped in the future count as age zero.
pub fn evaluate(
    reading: Option<&SensorReading>,
    now: DateTime<Utc>,
    threshold_secs: i64,
) -> ConnectionStatus {
    let Some(reading) = reading else {
        return ConnectionStatus::Never;
    };
    let Some(recorded_at) = reading.recorded_instant() else {
        return ConnectionStatus::Unknown;
    };

    let age_secs = (now - recorded_at).num_seconds().max(0);
    if age_secs > threshold_secs {
        ConnectionStatus::Offline { age_secs }
    } else {
        ConnectionStatus::Online { age_secs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn reading(recorded_at: Option<&str>) -> SensorReading {
        SensorReading {
            id: 1,
            device_id: Uuid::new_v4(),
            recorded_at: recorded_at.map(str::to_string),
            ph: 6.5,
            temperature: 25.0,
            nitrogen: 45.0,
            phosphorus: 28.0,
            potassium: 180.0,
            signal_quality: None,
        }
    }

    #[test]
    fn test_threshold_scales_with_devices() {
        assert_eq!(offline_threshold_secs(3, 60), 180);
        assert_eq!(offline_threshold_secs(1, 60), 60);
        assert_eq!(offline_threshold_secs(0, 60), 60);
    }

    #[test]
    fn test_threshold_boundary() {
        let recorded = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let r = reading(Some("2025-01-01T00:00:00Z"));
        let threshold = offline_threshold_secs(3, 60);

        let at = |secs| evaluate(Some(&r), recorded + Duration::seconds(secs), threshold);
        assert_eq!(at(100), ConnectionStatus::Online { age_secs: 100 });
        assert_eq!(at(179), ConnectionStatus::Online { age_secs: 179 });
        assert_eq!(at(180), ConnectionStatus::Online { age_secs: 180 });
        assert_eq!(at(181), ConnectionStatus::Offline { age_secs: 181 });
    }

    #[test]
    fn test_never_and_unknown_are_not_online() {
        let now = Utc::now();
        assert_eq!(evaluate(None, now, 60), ConnectionStatus::Never);
        assert!(!ConnectionStatus::Never.is_online());

        let missing = reading(None);
        assert_eq!(evaluate(Some(&missing), now, 60), ConnectionStatus::Unknown);
        let garbage = reading(Some("not a time"));
        let status = evaluate(Some(&garbage), now, 60);
        assert_eq!(status, ConnectionStatus::Unknown);
        assert!(!status.is_online());
        assert_eq!(status.age_secs(), None);
    }

    #[test]
    fn test_offsetless_reading_is_aged_as_utc() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 2, 0).unwrap();
        let naive = reading(Some("2025-01-01T00:00:00"));
        assert_eq!(
            evaluate(Some(&naive), now, 60),
            ConnectionStatus::Offline { age_secs: 120 }
        );
    }

    #[test]
    fn test_future_reading_counts_as_fresh() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let ahead = reading(Some("2025-01-01T00:00:30Z"));
        assert_eq!(
            evaluate(Some(&ahead), now, 60),
            ConnectionStatus::Online { age_secs: 0 }
        );
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(ConnectionStatus::Offline { age_secs: 200 }).unwrap();
        assert_eq!(json["state"], "offline");
        assert_eq!(json["age_secs"], 200);
        assert!(ConnectionStatus::Online { age_secs: 1 }
            .same_state(&ConnectionStatus::Online { age_secs: 50 }));
    }
}
