//! Expands an allocation plan into discrete truck trips.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use shared::config::{SchedulerConfig, MAX_DISPATCH_INTERVAL_MINS};
use std::cmp::Ordering;
use tracing::debug;

use crate::allocation::{AllocationEdge, AllocationPlan, AllocationStatus};
use crate::error::OptimizerError;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleModel {
    pub avg_speed_kmph: f64,
    pub cost_per_km: f64,
    pub fuel_km_per_liter: f64,
    pub max_trips: usize,
    pub dispatch_interval: Duration,
    pub min_km: f64,
    pub max_km: f64,
    pub vehicle_prefix: String,
    pub first_vehicle_number: u32,
}

impl Default for ScheduleModel {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for ScheduleModel {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            avg_speed_kmph: config.avg_speed_kmph,
            cost_per_km: config.cost_per_km,
            fuel_km_per_liter: config.fuel_km_per_l,
            max_trips: config.max_trips,
            // out-of-range intervals are rejected by `validate`
            dispatch_interval: Duration::try_minutes(config.dispatch_interval_mins).unwrap_or(Duration::MAX),
            min_km: config.min_km,
            max_km: config.max_km,
            vehicle_prefix: config.vehicle_prefix.clone(),
            first_vehicle_number: config.first_vehicle_number,
        }
    }
}

impl ScheduleModel {
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(self.avg_speed_kmph.is_finite() && self.avg_speed_kmph > 0.0) {
            return Err(OptimizerError::InvalidScheduleModel(format!(
                "avg_speed_kmph must be positive, got {}",
                self.avg_speed_kmph
            )));
        }
        if !(self.fuel_km_per_liter.is_finite() && self.fuel_km_per_liter > 0.0) {
            return Err(OptimizerError::InvalidScheduleModel(format!(
                "fuel_km_per_liter must be positive, got {}",
                self.fuel_km_per_liter
            )));
        }
        if !(self.cost_per_km.is_finite() && self.cost_per_km >= 0.0) {
            return Err(OptimizerError::InvalidScheduleModel(format!(
                "cost_per_km must be non-negative, got {}",
                self.cost_per_km
            )));
        }
        if !(self.min_km >= 0.0 && self.min_km <= self.max_km) {
            return Err(OptimizerError::InvalidScheduleModel(format!(
                "distance bounds [{}, {}] are not a valid range",
                self.min_km, self.max_km
            )));
        }
        if self.dispatch_interval < Duration::zero() {
            return Err(OptimizerError::InvalidScheduleModel(
                "dispatch interval must not be negative".to_string(),
            ));
        }
        if self.dispatch_interval > Duration::minutes(MAX_DISPATCH_INTERVAL_MINS) {
            return Err(OptimizerError::InvalidScheduleModel(format!(
                "dispatch interval must not exceed {} minutes",
                MAX_DISPATCH_INTERVAL_MINS
            )));
        }
        Ok(())
    }

    fn travel_time(&self, distance_km: f64) -> Duration {
        let hours = distance_km / self.avg_speed_kmph;
        Duration::microseconds((hours * 3_600_000_000.0).round() as i64)
    }

    fn departure(&self, reference: DateTime<Utc>, index: usize) -> Result<DateTime<Utc>, OptimizerError> {
        i32::try_from(index)
            .ok()
            .and_then(|i| self.dispatch_interval.checked_mul(i))
            .and_then(|offset| reference.checked_add_signed(offset))
            .ok_or_else(|| {
                OptimizerError::InvalidScheduleModel(format!("departure {} is outside the supported time range", index))
            })
    }

    fn vehicle_id(&self, index: usize) -> String {
        let number = u64::from(self.first_vehicle_number) + index as u64;
        format!("{}-{}", self.vehicle_prefix, number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripPlan {
    pub vehicle_id: String,
    pub origin: String,
    pub destination: String,
    pub depart_time: DateTime<Utc>,
    pub arrive_time: DateTime<Utc>,
    pub distance_km: f64,
    pub fuel_liters: f64,
    pub cost: f64,
    pub tonnes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schedule {
    /// Status of the allocation the trips were drawn from.
    pub status: AllocationStatus,
    pub trips: Vec<TripPlan>,
}

/// One trip per allocation edge, heaviest edges first, at most
/// `model.max_trips`. Departures are spaced `dispatch_interval` apart starting
/// at `reference`.
pub fn generate_schedule(
    plan: &AllocationPlan,
    model: &ScheduleModel,
    reference: DateTime<Utc>,
) -> Result<Schedule, OptimizerError> {
    model.validate()?;

    let mut edges: Vec<&AllocationEdge> = plan.edges.iter().collect();
    edges.sort_by(|a, b| {
        b.tonnes
            .partial_cmp(&a.tonnes)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
    });

    let trips = edges
        .into_iter()
        .take(model.max_trips)
        .enumerate()
        .map(|(i, edge)| -> Result<TripPlan, OptimizerError> {
            let distance_km = edge.distance_km.clamp(model.min_km, model.max_km);
            let depart_time = model.departure(reference, i)?;
            let arrive_time = depart_time
                .checked_add_signed(model.travel_time(distance_km))
                .ok_or_else(|| {
                    OptimizerError::InvalidScheduleModel(format!("arrival {} is outside the supported time range", i))
                })?;
            Ok(TripPlan {
                vehicle_id: model.vehicle_id(i),
                origin: edge.from.clone(),
                destination: edge.to.clone(),
                depart_time,
                arrive_time,
                distance_km,
                fuel_liters: distance_km / model.fuel_km_per_liter,
                cost: distance_km * model.cost_per_km,
                tonnes: edge.tonnes,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(trips = trips.len(), edges = plan.edges.len(), "schedule generated");

    Ok(Schedule {
        status: plan.status,
        trips,
    })
}
