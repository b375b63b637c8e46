//! Illustrative vessels served when live tracking has nothing to show.
//!
//! These never enter the telemetry cache; they are folded through the same
//! reconciliation as live data so they carry derived type names and status.

use chrono::{DateTime, Duration, Utc};
use telemetry_service::{reconcile, Dimensions, Observation, ObservationFields, ObservationKind, VesselRecord};

pub const FALLBACK_SOURCE: &str = "illustrative";

struct Illustrative {
    mmsi: &'static str,
    name: &'static str,
    lat: f64,
    lon: f64,
    speed: f64,
    course: f64,
    destination: &'static str,
    eta_hours: i64,
    type_code: u16,
    length: f64,
    width: f64,
}

const ILLUSTRATIVE: [Illustrative; 3] = [
    Illustrative {
        mmsi: "123456789",
        name: "MV STEEL CARRIER 1",
        lat: 19.0760,
        lon: 72.8777,
        speed: 12.5,
        course: 45.0,
        destination: "Mumbai Port",
        eta_hours: 6,
        type_code: 70,
        length: 180.0,
        width: 32.0,
    },
    Illustrative {
        mmsi: "987654321",
        name: "MV OCEAN TRADER 5",
        lat: 13.0827,
        lon: 80.2707,
        speed: 8.2,
        course: 180.0,
        destination: "Chennai Port",
        eta_hours: 12,
        type_code: 79,
        length: 200.0,
        width: 28.0,
    },
    Illustrative {
        mmsi: "456789123",
        name: "MV CARGO EXPRESS",
        lat: 22.5726,
        lon: 88.3639,
        speed: 0.0,
        course: 0.0,
        destination: "Kolkata Port",
        eta_hours: 0,
        type_code: 70,
        length: 150.0,
        width: 25.0,
    },
];

pub fn illustrative_vessels(now: DateTime<Utc>) -> Vec<VesselRecord> {
    let observations: Vec<Observation> = ILLUSTRATIVE
        .iter()
        .flat_map(|vessel| {
            let eta = (now + Duration::hours(vessel.eta_hours)).format("%m-%d %H:%M").to_string();
            [
                Observation::new(
                    vessel.mmsi,
                    ObservationKind::Static,
                    ObservationFields {
                        name: Some(vessel.name.to_string()),
                        type_code: Some(vessel.type_code),
                        dims: Some(Dimensions {
                            length: vessel.length,
                            width: vessel.width,
                        }),
                        destination: Some(vessel.destination.to_string()),
                        eta: Some(eta),
                        ..ObservationFields::default()
                    },
                ),
                Observation::position(vessel.mmsi, vessel.lat, vessel.lon, vessel.speed, vessel.course, now),
            ]
        })
        .collect();

    reconcile(&observations)
        .into_records()
        .into_iter()
        .map(|mut record| {
            record.source = FALLBACK_SOURCE.to_string();
            record
        })
        .collect()
}
