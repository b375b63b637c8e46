use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use optimizer_service::{
    estimator_for, generate_schedule, AllocationEdge, AllocationEngine, AllocationPlan, AllocationStatus, CostModel,
    DemandNode, DistanceEstimator, OptimizerError, PlantRow, PortRow, Registry, ScheduleModel, SupplyNode, TrainRow,
    BENCHMARK_LANES,
};
use serde::{Deserialize, Serialize};
use shared::types::round2;
use shared::Config;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use telemetry_service::{IngestCounters, IngestStats, Observation, TelemetryCache, VesselRecord};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::error::ApiError;
use crate::fallback::illustrative_vessels;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<TelemetryCache>,
    pub stats: Arc<IngestStats>,
    pub registry: Arc<dyn Registry>,
    pub engine: AllocationEngine,
    pub estimator: Arc<dyn DistanceEstimator>,
    pub schedule_model: Arc<ScheduleModel>,
}

impl AppState {
    pub fn new(
        config: &Config,
        cache: Arc<TelemetryCache>,
        stats: Arc<IngestStats>,
        registry: Arc<dyn Registry>,
    ) -> Result<Self, OptimizerError> {
        let engine = AllocationEngine::new(CostModel::from(&config.optimizer))?;
        let schedule_model = ScheduleModel::from(&config.scheduler);
        schedule_model.validate()?;

        Ok(Self {
            cache,
            stats,
            registry,
            engine,
            estimator: Arc::from(estimator_for(config.optimizer.distance)),
            schedule_model: Arc::new(schedule_model),
        })
    }

    /// Loads both node sets and solves on the blocking pool.
    async fn solve(&self) -> Result<AllocationPlan, ApiError> {
        let supply: Vec<SupplyNode> = self.registry.supply_nodes().await?;
        let demand: Vec<DemandNode> = self.registry.demand_nodes().await?;

        let engine = self.engine.clone();
        let estimator = Arc::clone(&self.estimator);
        let plan = tokio::task::spawn_blocking(move || engine.solve(&supply, &demand, estimator.as_ref())).await?;
        Ok(plan)
    }
}

pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/vessels", get(get_vessels))
        .route("/api/vessels/raw", get(get_raw_observations))
        .route("/api/ports", get(get_ports))
        .route("/api/plants", get(get_plants))
        .route("/api/trains", get(get_trains))
        .route("/api/optimize", get(optimize_benchmark))
        .route("/api/optimizer/truck", get(optimize_trucking))
        .route("/api/scheduler/truck", get(schedule_trucking))
        .route("/api/predict-delay", get(predict_delay))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

// ----------------------------------------------------------------------------
// Health and vessels
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub cached_observations: usize,
    pub cache_capacity: usize,
    pub total_recorded: u64,
    pub feed: IngestCounters,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        cached_observations: state.cache.len(),
        cache_capacity: state.cache.capacity(),
        total_recorded: state.cache.total_recorded(),
        feed: state.stats.counters(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VesselsResponse {
    pub vessels: Vec<VesselRecord>,
    pub status: String,
}

async fn get_vessels(State(state): State<AppState>) -> Json<VesselsResponse> {
    let mut vessels = state.cache.reconcile_all().into_records();
    if vessels.is_empty() {
        vessels = illustrative_vessels(Utc::now());
    }

    Json(VesselsResponse {
        vessels,
        status: "success".to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ObservationsResponse {
    pub observations: Vec<Observation>,
    pub count: usize,
    pub status: String,
}

async fn get_raw_observations(State(state): State<AppState>) -> Json<ObservationsResponse> {
    let observations = state.cache.snapshot();
    Json(ObservationsResponse {
        count: observations.len(),
        observations,
        status: "success".to_string(),
    })
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct PortsResponse {
    pub ports: Vec<PortRow>,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlantsResponse {
    pub plants: Vec<PlantRow>,
    pub status: String,
}

async fn get_ports(State(state): State<AppState>) -> Result<Json<PortsResponse>, ApiError> {
    let ports = state.registry.ports().await?;
    Ok(Json(PortsResponse {
        ports,
        status: "success".to_string(),
    }))
}

async fn get_plants(State(state): State<AppState>) -> Result<Json<PlantsResponse>, ApiError> {
    let plants = state.registry.plants().await?;
    Ok(Json(PlantsResponse {
        plants,
        status: "success".to_string(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainsResponse {
    pub trains: Vec<TrainRow>,
    pub status: String,
}

async fn get_trains(State(state): State<AppState>) -> Result<Json<TrainsResponse>, ApiError> {
    let trains = state.registry.trains().await?;
    Ok(Json(TrainsResponse {
        trains,
        status: "success".to_string(),
    }))
}

// ----------------------------------------------------------------------------
// Optimization and scheduling
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocationView {
    pub from: String,
    pub to: String,
    pub tonnes: f64,
    pub distance_km: f64,
    pub cost: f64,
    pub fuel: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocationResponse {
    pub status: AllocationStatus,
    pub total_cost: f64,
    pub total_fuel: f64,
    pub total_fuel_liters: f64,
    pub unserved_tonnes: f64,
    pub allocations: Vec<AllocationView>,
}

impl From<&AllocationPlan> for AllocationResponse {
    fn from(plan: &AllocationPlan) -> Self {
        let total_fuel = round2(plan.total_fuel);
        Self {
            status: plan.status,
            total_cost: round2(plan.total_cost),
            total_fuel,
            total_fuel_liters: total_fuel,
            unserved_tonnes: round2(plan.unserved_tonnes),
            allocations: plan
                .edges
                .iter()
                .map(|edge| AllocationView {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    tonnes: round2(edge.tonnes),
                    distance_km: round2(edge.distance_km),
                    cost: round2(edge.cost()),
                    fuel: round2(edge.fuel()),
                })
                .collect(),
        }
    }
}

async fn optimize_trucking(State(state): State<AppState>) -> Result<Json<AllocationResponse>, ApiError> {
    let plan = state.solve().await?;
    info!(status = plan.status.as_str(), edges = plan.edges.len(), "truck allocation served");
    Ok(Json(AllocationResponse::from(&plan)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BenchmarkResponse {
    pub status: AllocationStatus,
    pub total_cost: f64,
    /// Tonnes per lane keyed `{port}_to_{plant}`, unused lanes included.
    pub allocations: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
}

/// Advice drawn from the lanes a plan actually uses.
pub fn recommendations(plan: &AllocationPlan) -> Vec<String> {
    let by_rate = |a: &&AllocationEdge, b: &&AllocationEdge| a.unit_cost.total_cmp(&b.unit_cost);
    let mut advice = Vec::new();
    if let Some(cheapest) = plan.edges.iter().min_by(by_rate) {
        advice.push(format!(
            "Prioritize {} to {} route for cost efficiency",
            cheapest.from, cheapest.to
        ));
    }
    if let Some(dearest) = plan.edges.iter().max_by(by_rate) {
        if plan.edges.len() > 1 {
            advice.push(format!("Consider rail transport for {} to {} route", dearest.from, dearest.to));
        }
    }
    if plan.unserved_tonnes > 0.0 {
        advice.push(format!(
            "Source {} t of additional supply to close the shortfall",
            round2(plan.unserved_tonnes)
        ));
    }
    advice.push("Monitor port congestion levels for dynamic routing".to_string());
    advice
}

async fn optimize_benchmark() -> Result<Json<BenchmarkResponse>, ApiError> {
    let plan = tokio::task::spawn_blocking(AllocationEngine::solve_benchmark).await?;
    let allocations = BENCHMARK_LANES
        .iter()
        .map(|(from, to, _)| {
            let tonnes: f64 = plan
                .edges
                .iter()
                .filter(|edge| edge.from == *from && edge.to == *to)
                .map(|edge| edge.tonnes)
                .sum();
            (format!("{}_to_{}", from, to), round2(tonnes))
        })
        .collect();
    info!(status = plan.status.as_str(), "benchmark allocation served");

    Ok(Json(BenchmarkResponse {
        status: plan.status,
        total_cost: round2(plan.total_cost),
        allocations,
        recommendations: recommendations(&plan),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TripView {
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

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub status: AllocationStatus,
    pub avg_speed_kmph: f64,
    pub fuel_km_per_l: f64,
    pub cost_per_km: f64,
    pub trips: Vec<TripView>,
}

async fn schedule_trucking(State(state): State<AppState>) -> Result<Json<ScheduleResponse>, ApiError> {
    let plan = state.solve().await?;
    let model = Arc::clone(&state.schedule_model);
    let schedule = generate_schedule(&plan, &model, Utc::now())?;
    info!(status = schedule.status.as_str(), trips = schedule.trips.len(), "truck schedule served");

    Ok(Json(ScheduleResponse {
        status: schedule.status,
        avg_speed_kmph: model.avg_speed_kmph,
        fuel_km_per_l: model.fuel_km_per_liter,
        cost_per_km: model.cost_per_km,
        trips: schedule
            .trips
            .into_iter()
            .map(|trip| TripView {
                vehicle_id: trip.vehicle_id,
                origin: trip.origin,
                destination: trip.destination,
                depart_time: trip.depart_time,
                arrive_time: trip.arrive_time,
                distance_km: round2(trip.distance_km),
                fuel_liters: round2(trip.fuel_liters),
                cost: round2(trip.cost),
                tonnes: round2(trip.tonnes),
            })
            .collect(),
    }))
}

// ----------------------------------------------------------------------------
// Delay prediction
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DelayQuery {
    pub vessel_mmsi: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DelayResponse {
    pub vessel_mmsi: String,
    pub status: String,
    pub message: String,
}

async fn predict_delay(Query(query): Query<DelayQuery>) -> Json<DelayResponse> {
    Json(DelayResponse {
        vessel_mmsi: query.vessel_mmsi,
        status: "not_implemented".to_string(),
        message: "Delay prediction requires an external model".to_string(),
    })
}
