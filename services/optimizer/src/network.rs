//! Supply and demand nodes, and the registry collaborator that supplies them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::types::GeoPoint;
use std::path::{Path, PathBuf};

use crate::error::RegistryError;

/// A port with tonnage available for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyNode {
    pub id: String,
    pub location: GeoPoint,
    pub available_capacity: f64,
}

impl SupplyNode {
    pub fn new(id: impl Into<String>, location: GeoPoint, available_capacity: f64) -> Self {
        Self {
            id: id.into(),
            location,
            available_capacity: non_negative(available_capacity),
        }
    }
}

/// A plant with an outstanding requirement, summed across commodities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandNode {
    pub id: String,
    pub location: GeoPoint,
    pub required_tonnage: f64,
}

impl DemandNode {
    pub fn new(id: impl Into<String>, location: GeoPoint, required_tonnage: f64) -> Self {
        Self {
            id: id.into(),
            location,
            required_tonnage: non_negative(required_tonnage),
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// One port row as the registry publishes it. Columns the optimizer does not
/// use are kept so the rows can be served back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRow {
    pub port_name: String,
    pub location_lat: f64,
    pub location_lon: f64,
    #[serde(default)]
    pub available_capacity: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantRow {
    pub plant_name: String,
    pub location_lat: f64,
    pub location_lon: f64,
    #[serde(default)]
    pub required_materials_iron_ore: f64,
    #[serde(default)]
    pub required_materials_coal: f64,
    #[serde(default)]
    pub required_materials_limestone: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlantRow {
    pub fn total_requirement(&self) -> f64 {
        [
            self.required_materials_iron_ore,
            self.required_materials_coal,
            self.required_materials_limestone,
        ]
        .iter()
        .copied()
        .map(non_negative)
        .sum()
    }
}

/// A rail rake on a port-to-plant route. Served as published; the optimizer
/// does not route over rail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRow {
    #[serde(default)]
    pub rake_capacity_tonnes: f64,
    #[serde(default)]
    pub wagons: u32,
    #[serde(default)]
    pub route_distance_km: f64,
    #[serde(default)]
    pub expected_cost_per_ton: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&PortRow> for SupplyNode {
    fn from(row: &PortRow) -> Self {
        SupplyNode::new(
            row.port_name.clone(),
            GeoPoint::new(row.location_lat, row.location_lon),
            row.available_capacity,
        )
    }
}

impl From<&PlantRow> for DemandNode {
    fn from(row: &PlantRow) -> Self {
        DemandNode::new(
            row.plant_name.clone(),
            GeoPoint::new(row.location_lat, row.location_lon),
            row.total_requirement(),
        )
    }
}

/// Source of port, plant and train rows. Read-only to the optimizer.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn ports(&self) -> Result<Vec<PortRow>, RegistryError>;
    async fn plants(&self) -> Result<Vec<PlantRow>, RegistryError>;

    async fn trains(&self) -> Result<Vec<TrainRow>, RegistryError> {
        Ok(Vec::new())
    }

    async fn supply_nodes(&self) -> Result<Vec<SupplyNode>, RegistryError> {
        Ok(self.ports().await?.iter().map(SupplyNode::from).collect())
    }

    async fn demand_nodes(&self) -> Result<Vec<DemandNode>, RegistryError> {
        Ok(self.plants().await?.iter().map(DemandNode::from).collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    ports: Vec<PortRow>,
    plants: Vec<PlantRow>,
    trains: Vec<TrainRow>,
}

impl StaticRegistry {
    pub fn new(ports: Vec<PortRow>, plants: Vec<PlantRow>) -> Self {
        Self {
            ports,
            plants,
            trains: Vec::new(),
        }
    }

    pub fn with_trains(mut self, trains: Vec<TrainRow>) -> Self {
        self.trains = trains;
        self
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn ports(&self) -> Result<Vec<PortRow>, RegistryError> {
        Ok(self.ports.clone())
    }

    async fn plants(&self) -> Result<Vec<PlantRow>, RegistryError> {
        Ok(self.plants.clone())
    }

    async fn trains(&self) -> Result<Vec<TrainRow>, RegistryError> {
        Ok(self.trains.clone())
    }
}

/// Reads `ports.json`, `plants.json` and `trains.json` (arrays of rows) from a directory on
/// every call. A missing file is an empty registry, not an error.
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    data_dir: PathBuf,
}

pub const PORTS_FILE: &str = "ports.json";
pub const PLANTS_FILE: &str = "plants.json";
pub const TRAINS_FILE: &str = "trains.json";

impl JsonFileRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    async fn read_rows<T: serde::de::DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, RegistryError> {
        let path = self.data_dir.join(file);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "registry file missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(source) => return Err(RegistryError::Io { path, source }),
        };

        serde_json::from_str(&text).map_err(|source| RegistryError::Parse { path, source })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[async_trait]
impl Registry for JsonFileRegistry {
    async fn ports(&self) -> Result<Vec<PortRow>, RegistryError> {
        self.read_rows(PORTS_FILE).await
    }

    async fn plants(&self) -> Result<Vec<PlantRow>, RegistryError> {
        self.read_rows(PLANTS_FILE).await
    }

    async fn trains(&self) -> Result<Vec<TrainRow>, RegistryError> {
        self.read_rows(TRAINS_FILE).await
    }
}
