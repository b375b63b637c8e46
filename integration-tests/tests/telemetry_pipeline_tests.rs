//! Feed frames through the ingestor into the cache and out as vessel records.
//!
//! Writers and readers run on plain threads against one shared cache.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use telemetry_service::{
    IngestStats, Ingestor, Observation, Subscription, TelemetryCache, VesselStatus, WebSocketConnector,
};

fn cache(capacity: usize) -> Arc<TelemetryCache> {
    Arc::new(TelemetryCache::new(NonZeroUsize::new(capacity).unwrap()))
}

fn offline_ingestor(cache: Arc<TelemetryCache>, stats: Arc<IngestStats>) -> Ingestor<WebSocketConnector> {
    Ingestor::new(
        WebSocketConnector::new("ws://127.0.0.1:9"),
        Subscription::new("test-key", Vec::new(), Vec::new()),
        cache,
        stats,
        Duration::from_millis(10),
    )
}

fn position_frame(mmsi: u64, lat: f64, lon: f64, speed: f64) -> String {
    json!({
        "MessageType": "PositionReport",
        "Message": {"PositionReport": {
            "UserID": mmsi, "Latitude": lat, "Longitude": lon,
            "SpeedOverGround": speed, "CourseOverGround": 90.0
        }}
    })
    .to_string()
}

fn static_frame(mmsi: u64, name: &str, type_code: u16, destination: &str) -> String {
    json!({
        "MessageType": "ShipStaticData",
        "Message": {"ShipStaticData": {
            "UserID": mmsi, "VesselName": name, "Type": type_code,
            "Dimension": {"A": 120, "B": 40, "C": 12, "D": 14},
            "Destination": destination,
            "Eta": {"Month": 5, "Day": 9, "Hour": 14, "Minute": 0}
        }}
    })
    .to_string()
}

// =============================================================================
// Frame-to-record pipeline
// =============================================================================

#[test]
fn test_frames_reconcile_into_vessel_records() {
    let cache = cache(64);
    let stats = Arc::new(IngestStats::default());
    let ingestor = offline_ingestor(Arc::clone(&cache), Arc::clone(&stats));

    let frames = [
        position_frame(419000001, 20.2, 86.7, 9.5),
        static_frame(419000001, "SAGAR SAMRAT  ", 71, " PARADIP"),
        position_frame(419000002, 17.7, 83.3, 0.0),
        "not json".to_string(),
        json!({"MessageType": "StandardClassBPositionReport", "Message": {}}).to_string(),
        position_frame(419000001, 20.3, 86.8, 10.0),
        position_frame(419000003, 91.0, 181.0, 0.0),
    ];
    for frame in &frames {
        ingestor.ingest(frame);
    }

    let counters = stats.counters();
    assert_eq!(counters.recorded, 4);
    assert_eq!(counters.ignored, 1);
    assert_eq!(counters.discarded, 2);
    assert_eq!(cache.len(), 4);

    let vessels = cache.reconcile_all().into_records();
    assert_eq!(vessels.len(), 2);

    let first = &vessels[0];
    assert_eq!(first.mmsi, "419000001");
    assert_eq!(first.vessel_name.as_deref(), Some("SAGAR SAMRAT"));
    assert_eq!(first.destination.as_deref(), Some("PARADIP"));
    assert_eq!(first.vessel_type.as_deref(), Some("Cargo Ship"));
    assert_eq!(first.length, Some(160.0));
    assert_eq!(first.lat, Some(20.3));
    assert_eq!(first.status, VesselStatus::EnRoute);
    assert_eq!(first.source, "aisstream");

    assert_eq!(vessels[1].status, VesselStatus::Docked);
    assert!(vessels[1].vessel_name.is_none());
}

#[test]
fn test_eviction_drops_forgotten_vessels() {
    let cache = cache(3);
    let stats = Arc::new(IngestStats::default());
    let ingestor = offline_ingestor(Arc::clone(&cache), stats);

    ingestor.ingest(&static_frame(1, "EARLY BIRD", 70, "HALDIA"));
    for mmsi in 2..=4 {
        ingestor.ingest(&position_frame(mmsi, 15.0, 80.0, 5.0));
    }

    let ids: Vec<String> = cache.reconcile_all().into_records().into_iter().map(|v| v.mmsi).collect();
    assert_eq!(ids, vec!["2", "3", "4"]);
    assert_eq!(cache.total_recorded(), 4);
}

// =============================================================================
// Concurrent writers and readers
// =============================================================================

#[test]
fn test_concurrent_ingest_and_reconcile() {
    const WRITERS: u64 = 4;
    const FRAMES_PER_WRITER: u64 = 500;
    const CAPACITY: usize = 256;

    let cache = cache(CAPACITY);
    let stats = Arc::new(IngestStats::default());
    let ingestor = Arc::new(offline_ingestor(Arc::clone(&cache), Arc::clone(&stats)));
    let barrier = Arc::new(Barrier::new(WRITERS as usize + 2));
    let reader_sizes = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let ingestor = Arc::clone(&ingestor);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..FRAMES_PER_WRITER {
                let mmsi = 100_000 * (writer + 1) + i % 25;
                ingestor.ingest(&position_frame(mmsi, 12.0, 75.0, (i % 3) as f64));
            }
        }));
    }

    for _ in 0..2 {
        let cache = Arc::clone(&cache);
        let barrier = Arc::clone(&barrier);
        let sizes = Arc::clone(&reader_sizes);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..50 {
                let index = cache.reconcile_all();
                let ids: HashSet<&str> = index.iter().map(|v| v.mmsi.as_str()).collect();
                assert_eq!(ids.len(), index.len(), "duplicate vessel in reconciled view");
                assert!(cache.len() <= CAPACITY);
                sizes.lock().push(index.len());
            }
        }));
    }

    for handle in handles {
        handle.join().expect("worker panicked");
    }

    assert_eq!(stats.counters().recorded, WRITERS * FRAMES_PER_WRITER);
    assert_eq!(cache.len(), CAPACITY);
    assert_eq!(cache.total_recorded(), WRITERS * FRAMES_PER_WRITER);
    assert_eq!(reader_sizes.lock().len(), 100);

    // 25 distinct vessels per writer at most
    assert!(cache.reconcile_all().len() <= (WRITERS * 25) as usize);
}

#[test]
fn test_snapshot_preserves_per_writer_order() {
    let cache = cache(2_000);
    let writers: Vec<_> = (0..3u32)
        .map(|writer| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for seq in 0..400u32 {
                    let mut observation = Observation::position(format!("w{}", writer), 10.0, 70.0, 1.0, 0.0, Utc::now());
                    observation.fields.course = Some(f64::from(seq));
                    cache.record(observation);
                }
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.len(), 1_200);
    for writer in 0..3 {
        let id = format!("w{}", writer);
        let sequence: Vec<f64> = snapshot
            .iter()
            .filter(|o| o.vessel_id == id)
            .filter_map(|o| o.fields.course)
            .collect();
        let expected: Vec<f64> = (0..400).map(f64::from).collect();
        assert_eq!(sequence, expected, "writer {} reordered", writer);
    }
}
