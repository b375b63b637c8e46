//! Registry files through the allocation engine and schedule generator.

use chrono::{TimeZone, Utc};
use optimizer_service::{
    estimator_for, generate_schedule, AllocationEngine, AllocationPlan, AllocationStatus, CostModel, DemandNode,
    DistanceEstimator, JsonFileRegistry, Registry, RoadApprox, ScheduleModel, SupplyNode, Synthetic,
};
use shared::config::{DistanceKind, OptimizerConfig, SchedulerConfig};
use shared::types::GeoPoint;
use std::path::Path;

const EPS: f64 = 1e-6;

fn write_registry(dir: &Path) {
    let ports = serde_json::json!([
        {"port_name": "Paradip", "location_lat": 20.26, "location_lon": 86.67, "available_capacity": 18000.0},
        {"port_name": "Visakhapatnam", "location_lat": 17.69, "location_lon": 83.29, "available_capacity": 12000.0},
        {"port_name": "Haldia", "location_lat": 22.03, "location_lon": 88.06, "available_capacity": 9000.0},
        {"port_name": "Dhamra", "location_lat": 20.79, "location_lon": 86.96, "available_capacity": 0.0}
    ]);
    let plants = serde_json::json!([
        {"plant_name": "Bhilai", "location_lat": 21.21, "location_lon": 81.38,
         "required_materials_iron_ore": 8000.0, "required_materials_coal": 4000.0, "required_materials_limestone": 500.0},
        {"plant_name": "Rourkela", "location_lat": 22.26, "location_lon": 84.85,
         "required_materials_iron_ore": 9000.0, "required_materials_coal": 3000.0},
        {"plant_name": "Bokaro", "location_lat": 23.67, "location_lon": 86.15,
         "required_materials_coal": 10000.0, "required_materials_limestone": 1500.0}
    ]);
    std::fs::write(dir.join("ports.json"), ports.to_string()).unwrap();
    std::fs::write(dir.join("plants.json"), plants.to_string()).unwrap();
}

async fn load(dir: &Path) -> (Vec<SupplyNode>, Vec<DemandNode>) {
    let registry = JsonFileRegistry::new(dir);
    (registry.supply_nodes().await.unwrap(), registry.demand_nodes().await.unwrap())
}

fn assert_feasible(plan: &AllocationPlan, supply: &[SupplyNode], demand: &[DemandNode]) {
    for node in supply {
        assert!(plan.outgoing(&node.id) <= node.available_capacity + EPS);
    }
    for node in demand {
        assert!(plan.incoming(&node.id) <= node.required_tonnage + EPS);
    }
}

/// Fills plants in id order from ports in id order. Feasible, not optimal.
fn greedy_cost(supply: &[SupplyNode], demand: &[DemandNode], estimator: &dyn DistanceEstimator, rate: f64) -> f64 {
    let mut left: Vec<f64> = supply.iter().map(|n| n.available_capacity).collect();
    let mut cost = 0.0;
    for plant in demand {
        let mut need = plant.required_tonnage;
        for (i, port) in supply.iter().enumerate() {
            if need <= 0.0 {
                break;
            }
            let Some(km) = estimator.distance_km(port, plant) else { continue };
            let sent = need.min(left[i]);
            left[i] -= sent;
            need -= sent;
            cost += sent * km * rate;
        }
    }
    cost
}

// =============================================================================
// Registry to plan
// =============================================================================

#[tokio::test]
async fn test_file_registry_to_optimal_plan() {
    let dir = tempfile::tempdir().unwrap();
    write_registry(dir.path());
    let (supply, demand) = load(dir.path()).await;

    // 39000 t of supply against 36000 t of demand
    let engine = AllocationEngine::new(CostModel::from(&OptimizerConfig::default())).unwrap();
    let estimator = estimator_for(DistanceKind::GreatCircle);
    let plan = engine.solve(&supply, &demand, estimator.as_ref());

    assert_eq!(plan.status, AllocationStatus::Optimal);
    assert_feasible(&plan, &supply, &demand);
    for node in &demand {
        assert!((plan.incoming(&node.id) - node.required_tonnage).abs() < EPS, "{} underserved", node.id);
    }
    assert_eq!(plan.outgoing("Dhamra"), 0.0);
    let greedy = greedy_cost(&supply, &demand, estimator.as_ref(), 0.02);
    assert!(plan.total_cost <= greedy * (1.0 + 1e-9) + EPS);
    assert!((plan.total_fuel - plan.total_cost * 0.0005 / 0.02).abs() < 1e-6 * plan.total_cost.max(1.0));
}

#[tokio::test]
async fn test_plan_to_schedule() {
    let dir = tempfile::tempdir().unwrap();
    write_registry(dir.path());
    let (supply, demand) = load(dir.path()).await;

    let plan = AllocationEngine::new(CostModel::default())
        .unwrap()
        .solve(&supply, &demand, &RoadApprox);
    let model = ScheduleModel::from(&SchedulerConfig::default());
    let reference = Utc.with_ymd_and_hms(2024, 6, 1, 5, 30, 0).unwrap();
    let schedule = generate_schedule(&plan, &model, reference).unwrap();

    assert!(!schedule.trips.is_empty());
    assert!(schedule.trips.len() <= 5);
    assert_eq!(schedule.trips[0].depart_time, reference);
    for pair in schedule.trips.windows(2) {
        assert!(pair[0].tonnes >= pair[1].tonnes);
        assert_eq!(pair[1].depart_time - pair[0].depart_time, chrono::Duration::minutes(120));
    }
    for trip in &schedule.trips {
        assert!(trip.distance_km >= 100.0 && trip.distance_km <= 2000.0);
        assert!((trip.cost - trip.distance_km * 2.2).abs() < EPS);
        assert!(trip.arrive_time > trip.depart_time);
    }
}

#[tokio::test]
async fn test_missing_registry_is_no_solution() {
    let dir = tempfile::tempdir().unwrap();
    let (supply, demand) = load(dir.path()).await;

    let plan = AllocationEngine::new(CostModel::default())
        .unwrap()
        .solve(&supply, &demand, &Synthetic);

    assert_eq!(plan.status, AllocationStatus::NoSolution);
    assert!(plan.edges.is_empty());
}

// =============================================================================
// Larger instances
// =============================================================================

fn grid_instance(ports: usize, plants: usize, supply_scale: f64) -> (Vec<SupplyNode>, Vec<DemandNode>) {
    let supply = (0..ports)
        .map(|i| {
            SupplyNode::new(
                format!("port-{:02}", i),
                GeoPoint::new(8.0 + (i % 7) as f64 * 2.1, 68.0 + (i % 5) as f64 * 4.3),
                supply_scale * (1000.0 + (i * 37 % 11) as f64 * 250.0),
            )
        })
        .collect();
    let demand = (0..plants)
        .map(|j| {
            DemandNode::new(
                format!("plant-{:02}", j),
                GeoPoint::new(18.0 + (j % 6) as f64 * 1.7, 74.0 + (j % 8) as f64 * 1.9),
                900.0 + (j * 53 % 13) as f64 * 120.0,
            )
        })
        .collect();
    (supply, demand)
}

#[test]
fn test_large_instance_is_feasible_and_beats_greedy() {
    let (supply, demand) = grid_instance(15, 25, 2.0);
    let engine = AllocationEngine::new(CostModel::default()).unwrap();

    for kind in [DistanceKind::GreatCircle, DistanceKind::RoadApprox, DistanceKind::Synthetic] {
        let estimator = estimator_for(kind);
        let plan = engine.solve(&supply, &demand, estimator.as_ref());

        assert_feasible(&plan, &supply, &demand);
        let greedy = greedy_cost(&supply, &demand, estimator.as_ref(), 0.02);
        assert!(
            plan.total_cost <= greedy * (1.0 + 1e-9) + EPS,
            "{} plan worse than greedy",
            estimator.name()
        );
    }
}

#[test]
fn test_short_supply_is_shared_proportionally() {
    let (supply, demand) = grid_instance(6, 10, 0.5);
    let total_supply: f64 = supply.iter().map(|n| n.available_capacity).sum();
    let total_demand: f64 = demand.iter().map(|n| n.required_tonnage).sum();
    assert!(total_supply < total_demand);

    let plan = AllocationEngine::new(CostModel::default())
        .unwrap()
        .solve(&supply, &demand, &RoadApprox);

    assert_eq!(plan.status, AllocationStatus::Partial);
    assert!((plan.shipped_tonnes() - total_supply).abs() < EPS * total_supply);
    let ratio = total_supply / total_demand;
    for node in &demand {
        let share = plan.incoming(&node.id);
        assert!((share - node.required_tonnage * ratio).abs() < 1e-3, "{} got {}", node.id, share);
    }
}

#[test]
fn test_repeated_solves_are_identical() {
    let (supply, demand) = grid_instance(10, 12, 1.0);
    let engine = AllocationEngine::new(CostModel::default()).unwrap();

    let plans: Vec<AllocationPlan> = (0..3).map(|_| engine.solve(&supply, &demand, &Synthetic)).collect();

    assert_eq!(plans[0], plans[1]);
    assert_eq!(plans[1], plans[2]);
}
