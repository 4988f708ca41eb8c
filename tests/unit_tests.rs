use agrina::{
    evaluate,
    live::{offline_threshold_secs, DEFAULT_OFFLINE_SECS_PER_DEVICE},
    model::{forms::DeploymentForm, parse_timestamp, NewReading},
    store::{daily_trends, Order},
    ConnectionStatus, DashboardError, DataStore, LiveReadingState, MemoryStore, ReadingQuery,
    SensorReading, WebConfig,
};
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

fn reading(device_id: Uuid, recorded_at: &str, ph: f64) -> SensorReading {
    SensorReading {
        id: 0,
        device_id,
        recorded_at: Some(recorded_at.to_string()),
        ph,
        temperature: 25.0,
        nitrogen: 40.0,
        phosphorus: 20.0,
        potassium: 180.0,
        signal_quality: None,
    }
}

/// Offset-less timestamps are read as UTC
#[test]
fn test_timestamp_parsing() {
    let naive = parse_timestamp("2025-01-01T00:00:00").expect("Should parse naive timestamp");
    let utc = parse_timestamp("2025-01-01T00:00:00Z").expect("Should parse UTC timestamp");
    assert_eq!(naive, utc);

    let manila = parse_timestamp("2025-01-01T08:00:00+08:00").expect("Should parse offset");
    assert_eq!(manila, utc);

    assert!(parse_timestamp("yesterday-ish").is_none());
}

/// Threshold scales with the device count; the boundary itself is online
#[test]
fn test_status_threshold_boundary() {
    let device = Uuid::new_v4();
    let threshold = offline_threshold_secs(3, DEFAULT_OFFLINE_SECS_PER_DEVICE);
    assert_eq!(threshold, 180);

    let recorded = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let latest = reading(device, "2025-03-01T12:00:00Z", 6.5);

    for (age, online) in [(179, true), (180, true), (181, false)] {
        let status = evaluate(Some(&latest), recorded + Duration::seconds(age), threshold);
        assert_eq!(status.is_online(), online, "age {}", age);
    }

    assert_eq!(evaluate(None, recorded, threshold), ConnectionStatus::Never);
}

/// Whatever order poll and push deliver in, the shown reading never goes back
#[test]
fn test_reconcile_monotonic_over_mixed_deliveries() {
    let device = Uuid::new_v4();
    let now = Utc::now();
    let mut state = LiveReadingState::new(device, now);

    let deliveries = [
        "2025-03-01T12:00:05Z",
        "2025-03-01T12:00:01Z",
        "2025-03-01T12:00:05Z",
        "2025-03-01T12:00:09Z",
        "2025-03-01T12:00:03",
        "not a time",
        "2025-03-01T12:00:10+00:00",
    ];

    let mut shown = Vec::new();
    for (i, at) in deliveries.iter().enumerate() {
        state.offer(reading(device, at, i as f64), now);
        shown.push(
            state
                .current()
                .and_then(|r| r.recorded_instant())
                .expect("Should hold a parseable reading"),
        );
    }
    assert!(shown.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(state.current().map(|r| r.ph), Some(6.0));
}

/// The same reading offered twice only applies once
#[test]
fn test_reconcile_duplicate_is_noop() {
    let device = Uuid::new_v4();
    let mut state = LiveReadingState::new(device, Utc::now());
    let first = reading(device, "2025-03-01T12:00:00Z", 6.2);
    assert!(state.offer(first.clone(), Utc::now()));
    assert!(!state.offer(first, Utc::now()));
}

#[test]
fn test_deployment_validation() {
    let form = DeploymentForm {
        name: Some("  East Plot ".to_string()),
        serial_number: Some("AGR-100".to_string()),
        lat: Some("14.5".to_string()),
        lng: Some("121.0".to_string()),
        ..Default::default()
    };
    let device = form.validate().expect("Should accept a minimal deployment");
    assert_eq!(device.name, "East Plot");
    assert_eq!(device.status, "Active");
    assert!(device.coordinates.is_some());

    let missing = DeploymentForm {
        name: Some("East Plot".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        missing.validate(),
        Err(DashboardError::Validation(_))
    ));
}

#[test]
fn test_daily_trends_average_per_day() {
    let device = Uuid::new_v4();
    let readings = vec![
        reading(device, "2025-03-02T01:00:00Z", 7.0),
        reading(device, "2025-03-01T10:00:00Z", 6.0),
        reading(device, "2025-03-01T22:00:00Z", 6.4),
    ];
    let trends = daily_trends(&readings);
    assert_eq!(trends.len(), 2);
    assert_eq!(trends[0].samples, 2);
    assert!((trends[0].ph - 6.2).abs() < 1e-9);
    assert_eq!(trends[1].samples, 1);
}

/// Test WebConfig builder and defaults
#[test]
fn test_web_config() {
    let config = WebConfig::new("127.0.0.1", 3000)
        .with_cors(false)
        .with_max_websocket_connections(10)
        .with_live_intervals(1000, 2000);

    assert_eq!(config.bind_address(), "127.0.0.1:3000");
    assert!(!config.enable_cors);
    assert_eq!(config.max_websocket_connections, 10);
    let feed = config.feed_options();
    assert_eq!(feed.poll_interval.as_millis(), 1000);
    assert_eq!(feed.status_interval.as_millis(), 2000);
    assert_eq!(config.cookie_name, "agrina-session");
}

/// Test filtered queries against the in-memory store
#[test]
fn test_memory_store_query() {
    let store = MemoryStore::new();
    let device = tokio_test::block_on(store.create_device(
        DeploymentForm {
            name: Some("Query Plot".to_string()),
            serial_number: Some("AGR-Q1".to_string()),
            ..Default::default()
        }
        .validate()
        .expect("Should validate deployment"),
    ))
    .expect("Should create device");

    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    for hour in 0..10 {
        tokio_test::block_on(store.insert_reading(NewReading {
            device_id: device.id,
            recorded_at: start + Duration::hours(hour),
            ph: 6.0 + hour as f64 * 0.1,
            temperature: 25.0,
            nitrogen: 40.0,
            phosphorus: 20.0,
            potassium: 180.0,
            signal_quality: None,
        }))
        .expect("Should insert reading");
    }

    let query = ReadingQuery::for_device(device.id)
        .with_range(Some(start + Duration::hours(2)), Some(start + Duration::hours(6)))
        .with_order(Order::Ascending)
        .with_limit(3);
    let rows = tokio_test::block_on(store.query_readings(&query)).expect("Should query");
    assert_eq!(rows.len(), 3);
    assert!((rows[0].ph - 6.2).abs() < 1e-9);

    let count = tokio_test::block_on(store.count_readings(&query)).expect("Should count");
    assert_eq!(count, 5);
}
