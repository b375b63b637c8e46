//! Inter-node distance used as the cost and fuel basis.

use shared::config::DistanceKind;
use std::collections::HashMap;

use crate::network::{DemandNode, SupplyNode};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

const KM_PER_DEGREE_LAT: f64 = 111.0;
const KM_PER_DEGREE_LON: f64 = 85.0;

pub trait DistanceEstimator: Send + Sync {
    /// Distance in km, or `None` when the pair cannot be routed.
    fn distance_km(&self, from: &SupplyNode, to: &DemandNode) -> Option<f64>;

    fn name(&self) -> &'static str;
}

/// Haversine distance over a spherical earth.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreatCircle;

impl DistanceEstimator for GreatCircle {
    fn distance_km(&self, from: &SupplyNode, to: &DemandNode) -> Option<f64> {
        if !from.location.is_valid() || !to.location.is_valid() {
            return None;
        }
        let lat1 = from.location.lat.to_radians();
        let lat2 = to.location.lat.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (to.location.lon - from.location.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        Some(EARTH_RADIUS_KM * c)
    }

    fn name(&self) -> &'static str {
        "great_circle"
    }
}

/// Road-network approximation for the Indian subcontinent:
/// `|Δlat| × 111 + |Δlon| × 85`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoadApprox;

impl DistanceEstimator for RoadApprox {
    fn distance_km(&self, from: &SupplyNode, to: &DemandNode) -> Option<f64> {
        if !from.location.is_valid() || !to.location.is_valid() {
            return None;
        }
        let d_lat = (from.location.lat - to.location.lat).abs();
        let d_lon = (from.location.lon - to.location.lon).abs();
        Some(d_lat * KM_PER_DEGREE_LAT + d_lon * KM_PER_DEGREE_LON)
    }

    fn name(&self) -> &'static str {
        "road_approx"
    }
}

/// Placeholder distances in [500, 1500) km derived from the node ids, stable
/// across runs and platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct Synthetic;

impl Synthetic {
    fn fnv1a(bytes: impl Iterator<Item = u8>) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        bytes.fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
    }
}

impl DistanceEstimator for Synthetic {
    fn distance_km(&self, from: &SupplyNode, to: &DemandNode) -> Option<f64> {
        let hash = Self::fnv1a(from.id.bytes().chain(to.id.bytes()));
        Some(500.0 + (hash % 1000) as f64)
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

/// Explicit per-pair distances. Pairs not in the table are unroutable.
#[derive(Debug, Clone, Default)]
pub struct DistanceTable {
    entries: HashMap<(String, String), f64>,
}

impl DistanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, supply_id: &str, demand_id: &str, km: f64) -> Self {
        self.insert(supply_id, demand_id, km);
        self
    }

    pub fn insert(&mut self, supply_id: &str, demand_id: &str, km: f64) {
        self.entries.insert((supply_id.to_string(), demand_id.to_string()), km);
    }
}

impl DistanceEstimator for DistanceTable {
    fn distance_km(&self, from: &SupplyNode, to: &DemandNode) -> Option<f64> {
        self.entries.get(&(from.id.clone(), to.id.clone())).copied()
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

pub fn estimator_for(kind: DistanceKind) -> Box<dyn DistanceEstimator> {
    match kind {
        DistanceKind::GreatCircle => Box::new(GreatCircle),
        DistanceKind::RoadApprox => Box::new(RoadApprox),
        DistanceKind::Synthetic => Box::new(Synthetic),
    }
}
