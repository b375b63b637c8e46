//! Port-to-plant allocation as a transportation problem.
//!
//! Ports are sources limited by available capacity, plants are sinks limited
//! by their requirement, and every routable (port, plant) pair is an arc
//! costing `distance × cost_per_ton_km` per tonne. The plan is the min-cost
//! max-flow found by successive shortest augmenting paths.

use serde::{Deserialize, Serialize};
use shared::config::OptimizerConfig;
use shared::types::GeoPoint;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::distance::{DistanceEstimator, DistanceTable};
use crate::error::OptimizerError;
use crate::network::{DemandNode, SupplyNode};

/// Flows at or below this many tonnes are treated as zero.
pub const FLOW_EPSILON: f64 = 1e-9;

const COST_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub cost_per_ton_km: f64,
    pub fuel_l_per_ton_km: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            cost_per_ton_km: 0.02,
            fuel_l_per_ton_km: 0.0005,
        }
    }
}

impl From<&OptimizerConfig> for CostModel {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            cost_per_ton_km: config.cost_per_ton_km,
            fuel_l_per_ton_km: config.fuel_l_per_ton_km,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    /// Every plant fully served at minimum cost.
    Optimal,
    /// Supply (or routable supply) fell short; plants served in part.
    Partial,
    /// Nothing to move.
    NoSolution,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Optimal => "optimal",
            AllocationStatus::Partial => "partial",
            AllocationStatus::NoSolution => "no_solution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationEdge {
    pub from: String,
    pub to: String,
    pub tonnes: f64,
    pub distance_km: f64,
    pub unit_cost: f64,
    pub unit_fuel: f64,
}

impl AllocationEdge {
    pub fn cost(&self) -> f64 {
        self.unit_cost * self.tonnes
    }

    pub fn fuel(&self) -> f64 {
        self.unit_fuel * self.tonnes
    }
}

/// Result of one solve. Totals are unrounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub status: AllocationStatus,
    pub edges: Vec<AllocationEdge>,
    pub total_cost: f64,
    pub total_fuel: f64,
    pub total_supply: f64,
    pub total_demand: f64,
    pub unserved_tonnes: f64,
}

impl AllocationPlan {
    fn empty(total_supply: f64, total_demand: f64) -> Self {
        Self {
            status: AllocationStatus::NoSolution,
            edges: Vec::new(),
            total_cost: 0.0,
            total_fuel: 0.0,
            total_supply,
            total_demand,
            unserved_tonnes: total_demand,
        }
    }

    pub fn shipped_tonnes(&self) -> f64 {
        self.edges.iter().map(|edge| edge.tonnes).sum()
    }

    pub fn outgoing(&self, supply_id: &str) -> f64 {
        self.edges
            .iter()
            .filter(|edge| edge.from == supply_id)
            .map(|edge| edge.tonnes)
            .sum()
    }

    pub fn incoming(&self, demand_id: &str) -> f64 {
        self.edges
            .iter()
            .filter(|edge| edge.to == demand_id)
            .map(|edge| edge.tonnes)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct AllocationEngine {
    model: CostModel,
}

struct Lane {
    supply: usize,
    demand: usize,
    distance_km: f64,
}

impl AllocationEngine {
    pub fn new(model: CostModel) -> Result<Self, OptimizerError> {
        if !(model.cost_per_ton_km.is_finite() && model.cost_per_ton_km >= 0.0) {
            return Err(OptimizerError::InvalidCostModel(format!(
                "cost_per_ton_km must be non-negative, got {}",
                model.cost_per_ton_km
            )));
        }
        if !(model.fuel_l_per_ton_km.is_finite() && model.fuel_l_per_ton_km >= 0.0) {
            return Err(OptimizerError::InvalidCostModel(format!(
                "fuel_l_per_ton_km must be non-negative, got {}",
                model.fuel_l_per_ton_km
            )));
        }
        Ok(Self { model })
    }

    pub fn model(&self) -> CostModel {
        self.model
    }

    /// Computes a feasible, cost-minimal plan.
    ///
    /// When supply covers demand every plant is served in full. Otherwise each
    /// plant's share is proportional to its requirement, with rounding
    /// residue going to the largest requirement first. Ties between equal-cost
    /// routes resolve in ascending (port id, plant id) order.
    pub fn solve(
        &self,
        supply: &[SupplyNode],
        demand: &[DemandNode],
        distance: &dyn DistanceEstimator,
    ) -> AllocationPlan {
        let sources = consolidate(supply, |node| (node.id.as_str(), node.available_capacity));
        let sinks = consolidate(demand, |node| (node.id.as_str(), node.required_tonnage));

        let total_supply: f64 = sources.iter().map(|(_, quantity)| quantity).sum();
        let total_demand: f64 = sinks.iter().map(|(_, quantity)| quantity).sum();

        if sources.is_empty() || sinks.is_empty() {
            info!(
                ports = sources.len(),
                plants = sinks.len(),
                "no positive supply or demand, nothing to allocate"
            );
            return AllocationPlan::empty(total_supply, total_demand);
        }

        let mut arcs = Vec::new();
        for (i, (port, _)) in sources.iter().enumerate() {
            for (j, (plant, _)) in sinks.iter().enumerate() {
                match distance.distance_km(port, plant) {
                    Some(km) if km.is_finite() && km >= 0.0 => arcs.push(Lane {
                        supply: i,
                        demand: j,
                        distance_km: km,
                    }),
                    _ => debug!(port = %port.id, plant = %plant.id, "pair not routable"),
                }
            }
        }

        if arcs.is_empty() {
            info!(estimator = distance.name(), "no routable port-plant pairs");
            return AllocationPlan::empty(total_supply, total_demand);
        }

        let capacities: Vec<f64> = sources.iter().map(|(_, quantity)| *quantity).collect();
        let requirements: Vec<f64> = sinks.iter().map(|(_, quantity)| *quantity).collect();
        let supply_covers_demand = at_least(total_supply, total_demand);

        let quotas = if supply_covers_demand {
            requirements.clone()
        } else {
            proportional_quotas(&sinks, total_supply, total_demand)
        };

        let mut flows = self.route(&capacities, &quotas, &arcs);

        // Quotas a plant cannot reach (no route from the ports that still
        // have stock) leave supply idle; hand it to whoever can use it.
        let shipped_from: Vec<f64> = sum_by(&arcs, &flows, capacities.len(), |arc| arc.supply);
        let received_by: Vec<f64> = sum_by(&arcs, &flows, requirements.len(), |arc| arc.demand);
        let spare: Vec<f64> = capacities
            .iter()
            .zip(&shipped_from)
            .map(|(cap, out)| (cap - out).max(0.0))
            .collect();
        let open: Vec<f64> = requirements
            .iter()
            .zip(&received_by)
            .map(|(req, got)| (req - got).max(0.0))
            .collect();
        if spare.iter().sum::<f64>() > FLOW_EPSILON && open.iter().sum::<f64>() > FLOW_EPSILON {
            let top_up = self.route(&spare, &open, &arcs);
            for (flow, extra) in flows.iter_mut().zip(top_up) {
                *flow += extra;
            }
        }

        let edges: Vec<AllocationEdge> = arcs
            .iter()
            .zip(&flows)
            .filter(|(_, tonnes)| **tonnes > FLOW_EPSILON)
            .map(|(arc, tonnes)| AllocationEdge {
                from: sources[arc.supply].0.id.clone(),
                to: sinks[arc.demand].0.id.clone(),
                tonnes: *tonnes,
                distance_km: arc.distance_km,
                unit_cost: self.model.cost_per_ton_km * arc.distance_km,
                unit_fuel: self.model.fuel_l_per_ton_km * arc.distance_km,
            })
            .collect();

        let shipped: f64 = edges.iter().map(|edge| edge.tonnes).sum();
        let total_cost = edges.iter().map(AllocationEdge::cost).sum();
        let total_fuel = edges.iter().map(AllocationEdge::fuel).sum();

        let status = if edges.is_empty() {
            AllocationStatus::NoSolution
        } else if supply_covers_demand && at_least(shipped, total_demand) {
            AllocationStatus::Optimal
        } else {
            AllocationStatus::Partial
        };

        info!(
            status = status.as_str(),
            ports = sources.len(),
            plants = sinks.len(),
            edges = edges.len(),
            shipped_tonnes = shipped,
            total_cost,
            "allocation solved"
        );

        AllocationPlan {
            status,
            edges,
            total_cost,
            total_fuel,
            total_supply,
            total_demand,
            unserved_tonnes: (total_demand - shipped).max(0.0),
        }
    }

    /// Min-cost max-flow over `arcs`; returns the tonnes on each arc.
    fn route(&self, capacities: &[f64], quotas: &[f64], arcs: &[Lane]) -> Vec<f64> {
        let ports = capacities.len();
        let plants = quotas.len();
        let source = 0;
        let sink = ports + plants + 1;
        let mut network = FlowNetwork::new(sink + 1, source, sink);

        for (i, capacity) in capacities.iter().enumerate() {
            network.add_edge(source, 1 + i, *capacity, 0.0);
        }
        let handles: Vec<(EdgeRef, f64)> = arcs
            .iter()
            .map(|arc| {
                let capacity = capacities[arc.supply].min(quotas[arc.demand]);
                let cost = self.model.cost_per_ton_km * arc.distance_km;
                let handle = network.add_edge(1 + arc.supply, 1 + ports + arc.demand, capacity, cost);
                (handle, capacity)
            })
            .collect();
        for (j, quota) in quotas.iter().enumerate() {
            network.add_edge(1 + ports + j, sink, *quota, 0.0);
        }

        network.min_cost_max_flow();

        handles
            .iter()
            .map(|(handle, capacity)| network.flow(*handle, *capacity).max(0.0))
            .collect()
    }
}

/// Benchmark network: two ports, two plants, per-tonne lane rates.
pub const BENCHMARK_PORTS: [(&str, f64); 2] = [("Mumbai", 18_000.0), ("Chennai", 17_000.0)];
pub const BENCHMARK_PLANTS: [(&str, f64); 2] = [("JSW", 15_000.0), ("Tata", 20_000.0)];
pub const BENCHMARK_LANES: [(&str, &str, f64); 4] = [
    ("Mumbai", "JSW", 25.5),
    ("Mumbai", "Tata", 30.2),
    ("Chennai", "JSW", 28.1),
    ("Chennai", "Tata", 22.8),
];

/// Nodes and lane table of the benchmark network. Lane values are costs per
/// tonne, so the network is solved with a unit rate.
pub fn benchmark_network() -> (Vec<SupplyNode>, Vec<DemandNode>, DistanceTable) {
    let origin = GeoPoint::new(0.0, 0.0);
    let supply = BENCHMARK_PORTS
        .iter()
        .map(|(id, capacity)| SupplyNode::new(*id, origin, *capacity))
        .collect();
    let demand = BENCHMARK_PLANTS
        .iter()
        .map(|(id, required)| DemandNode::new(*id, origin, *required))
        .collect();
    let lanes = BENCHMARK_LANES
        .iter()
        .fold(DistanceTable::new(), |table, (from, to, rate)| table.with(from, to, *rate));
    (supply, demand, lanes)
}

impl AllocationEngine {
    /// Solves the benchmark network. Costs are lane rate times tonnes and
    /// no fuel is attributed.
    pub fn solve_benchmark() -> AllocationPlan {
        let engine = AllocationEngine {
            model: CostModel {
                cost_per_ton_km: 1.0,
                fuel_l_per_ton_km: 0.0,
            },
        };
        let (supply, demand, lanes) = benchmark_network();
        engine.solve(&supply, &demand, &lanes)
    }
}

/// Merges duplicate ids (summing quantities) and drops non-positive nodes.
/// The result is sorted by id.
fn consolidate<'a, N>(nodes: &'a [N], key: impl Fn(&'a N) -> (&'a str, f64)) -> Vec<(&'a N, f64)> {
    let mut merged: BTreeMap<&'a str, (&'a N, f64)> = BTreeMap::new();
    for node in nodes {
        let (id, quantity) = key(node);
        let quantity = if quantity.is_finite() { quantity.max(0.0) } else { 0.0 };
        merged
            .entry(id)
            .and_modify(|entry| entry.1 += quantity)
            .or_insert((node, quantity));
    }
    merged
        .into_values()
        .filter(|(_, quantity)| *quantity > FLOW_EPSILON)
        .collect()
}

/// Shares of `total_supply` in proportion to each requirement. Rounding
/// residue is handed out largest requirement first.
fn proportional_quotas(sinks: &[(&DemandNode, f64)], total_supply: f64, total_demand: f64) -> Vec<f64> {
    let ratio = total_supply / total_demand;
    let mut quotas: Vec<f64> = sinks.iter().map(|(_, required)| required * ratio).collect();

    let mut residual = total_supply - quotas.iter().sum::<f64>();
    if residual > 0.0 {
        let mut order: Vec<usize> = (0..sinks.len()).collect();
        order.sort_by(|&a, &b| {
            sinks[b]
                .1
                .total_cmp(&sinks[a].1)
                .then_with(|| sinks[a].0.id.cmp(&sinks[b].0.id))
        });
        for j in order {
            if residual <= 0.0 {
                break;
            }
            let room = (sinks[j].1 - quotas[j]).max(0.0);
            let add = room.min(residual);
            quotas[j] += add;
            residual -= add;
        }
    }

    quotas
}

fn sum_by(arcs: &[Lane], flows: &[f64], len: usize, key: impl Fn(&Lane) -> usize) -> Vec<f64> {
    let mut totals = vec![0.0; len];
    for (arc, flow) in arcs.iter().zip(flows) {
        totals[key(arc)] += flow;
    }
    totals
}

fn at_least(value: f64, target: f64) -> bool {
    value + 1e-6 * target.abs().max(1.0) >= target
}

// ----------------------------------------------------------------------------
// Residual network
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct EdgeRef {
    node: usize,
    index: usize,
}

#[derive(Debug, Clone)]
struct Edge {
    to: usize,
    rev: usize,
    capacity: f64,
    cost: f64,
}

struct FlowNetwork {
    graph: Vec<Vec<Edge>>,
    source: usize,
    sink: usize,
}

impl FlowNetwork {
    fn new(nodes: usize, source: usize, sink: usize) -> Self {
        Self {
            graph: vec![Vec::new(); nodes],
            source,
            sink,
        }
    }

    fn add_edge(&mut self, from: usize, to: usize, capacity: f64, cost: f64) -> EdgeRef {
        let forward = Edge {
            to,
            rev: self.graph[to].len(),
            capacity,
            cost,
        };
        let backward = Edge {
            to: from,
            rev: self.graph[from].len(),
            capacity: 0.0,
            cost: -cost,
        };
        self.graph[from].push(forward);
        self.graph[to].push(backward);
        EdgeRef {
            node: from,
            index: self.graph[from].len() - 1,
        }
    }

    fn flow(&self, edge: EdgeRef, original_capacity: f64) -> f64 {
        original_capacity - self.graph[edge.node][edge.index].capacity
    }

    /// Successive shortest paths with Bellman-Ford (residual arcs carry
    /// negative costs). Nodes and edges are scanned in insertion order and
    /// only strict improvements relax, so equal-cost ties keep the path found
    /// first.
    fn min_cost_max_flow(&mut self) {
        let nodes = self.graph.len();
        let edge_count: usize = self.graph.iter().map(Vec::len).sum();
        let max_augmentations = 10_000 + 4 * edge_count;

        for _ in 0..max_augmentations {
            let mut dist = vec![f64::INFINITY; nodes];
            let mut prev: Vec<Option<(usize, usize)>> = vec![None; nodes];
            dist[self.source] = 0.0;

            for _ in 0..nodes {
                let mut relaxed = false;
                for u in 0..nodes {
                    if dist[u].is_infinite() {
                        continue;
                    }
                    for (k, edge) in self.graph[u].iter().enumerate() {
                        if edge.capacity > FLOW_EPSILON && dist[u] + edge.cost < dist[edge.to] - COST_EPSILON {
                            dist[edge.to] = dist[u] + edge.cost;
                            prev[edge.to] = Some((u, k));
                            relaxed = true;
                        }
                    }
                }
                if !relaxed {
                    break;
                }
            }

            if dist[self.sink].is_infinite() {
                return;
            }

            let mut path = Vec::new();
            let mut v = self.sink;
            while v != self.source {
                match prev[v] {
                    Some((u, k)) => {
                        path.push((u, k));
                        v = u;
                    }
                    None => return,
                }
                if path.len() > nodes {
                    warn!("cycle in augmenting path, stopping early");
                    return;
                }
            }

            let push = path
                .iter()
                .map(|&(u, k)| self.graph[u][k].capacity)
                .fold(f64::INFINITY, f64::min);
            if push <= FLOW_EPSILON {
                return;
            }

            for &(u, k) in &path {
                self.graph[u][k].capacity -= push;
                let to = self.graph[u][k].to;
                let rev = self.graph[u][k].rev;
                self.graph[to][rev].capacity += push;
            }
        }

        warn!(max_augmentations, "augmentation limit reached, plan may be suboptimal");
    }
}
