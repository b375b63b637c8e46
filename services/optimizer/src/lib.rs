pub mod allocation;
pub mod distance;
pub mod error;
pub mod network;
pub mod schedule;


pub use allocation::{
    benchmark_network, AllocationEdge, AllocationEngine, AllocationPlan, AllocationStatus, CostModel, BENCHMARK_LANES,
};
pub use distance::{estimator_for, DistanceEstimator, DistanceTable, GreatCircle, RoadApprox, Synthetic};
pub use error::{OptimizerError, RegistryError};
pub use network::{DemandNode, JsonFileRegistry, PlantRow, PortRow, Registry, StaticRegistry, SupplyNode, TrainRow};
pub use schedule::{generate_schedule, Schedule, ScheduleModel, TripPlan};
