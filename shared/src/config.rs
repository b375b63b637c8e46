//! Service configuration
//!
//! Values are layered: built-in defaults, then an optional `logiflow.toml`,
//! then `LOGIFLOW_`-prefixed environment variables (`__` separates sections,
//! e.g. `LOGIFLOW_SCHEDULER__MAX_TRIPS=8`).

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::types::BoundingBox;

pub const ENV_PREFIX: &str = "LOGIFLOW";

/// Credential variable honoured when `LOGIFLOW_FEED__API_KEY` is not set.
pub const LEGACY_API_KEY_VAR: &str = "AISSTREAM_API_KEY";

/// Upper bound on the spacing between truck departures (one week).
pub const MAX_DISPATCH_INTERVAL_MINS: i64 = 7 * 24 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub feed: FeedConfig,
    pub cache: CacheConfig,
    pub registry: RegistryConfig,
    pub optimizer: OptimizerConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub reconnect_backoff_secs: u64,
    pub bounding_boxes: Vec<BoundingBox>,
    pub message_types: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://stream.aisstream.io/v0/stream".to_string(),
            api_key: None,
            reconnect_backoff_secs: 60,
            // Indian Ocean and the extended subcontinent coastline
            bounding_boxes: vec![[[5.0, 65.0], [25.0, 95.0]], [[8.0, 68.0], [37.0, 97.0]]],
            message_types: vec!["PositionReport".to_string(), "ShipStaticData".to_string()],
        }
    }
}

impl FeedConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    /// The configured credential, ignoring blank values.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

impl CacheConfig {
    pub fn capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.capacity)
            .ok_or_else(|| ConfigError::Invalid("cache.capacity must be at least 1".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub data_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceKind {
    #[default]
    GreatCircle,
    RoadApprox,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub cost_per_ton_km: f64,
    pub fuel_l_per_ton_km: f64,
    pub distance: DistanceKind,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cost_per_ton_km: 0.02,
            fuel_l_per_ton_km: 0.0005,
            distance: DistanceKind::GreatCircle,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub avg_speed_kmph: f64,
    pub fuel_km_per_l: f64,
    pub cost_per_km: f64,
    pub max_trips: usize,
    pub dispatch_interval_mins: i64,
    pub min_km: f64,
    pub max_km: f64,
    pub vehicle_prefix: String,
    pub first_vehicle_number: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            avg_speed_kmph: 45.0,
            fuel_km_per_l: 3.5,
            cost_per_km: 2.2,
            max_trips: 5,
            dispatch_interval_mins: 120,
            min_km: 100.0,
            max_km: 2000.0,
            vehicle_prefix: "TRK".to_string(),
            first_vehicle_number: 1001,
        }
    }
}

impl Config {
    /// Loads `logiflow.toml` from the working directory if present, then
    /// applies environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let builder = ::config::Config::builder()
            .add_source(::config::File::with_name("logiflow").required(false));
        Self::finish(builder)
    }

    /// Same as [`Config::from_env`] but with an explicit file that must exist.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = ::config::Config::builder().add_source(::config::File::from(path));
        Self::finish(builder)
    }

    fn finish(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let mut config: Config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if config.feed.credential().is_none() {
            config.feed.api_key = std::env::var(LEGACY_API_KEY_VAR)
                .ok()
                .filter(|key| !key.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.capacity()?;

        let optimizer = &self.optimizer;
        if !(optimizer.cost_per_ton_km.is_finite() && optimizer.cost_per_ton_km >= 0.0) {
            return Err(ConfigError::Invalid(
                "optimizer.cost_per_ton_km must be a non-negative number".to_string(),
            ));
        }
        if !(optimizer.fuel_l_per_ton_km.is_finite() && optimizer.fuel_l_per_ton_km >= 0.0) {
            return Err(ConfigError::Invalid(
                "optimizer.fuel_l_per_ton_km must be a non-negative number".to_string(),
            ));
        }

        let scheduler = &self.scheduler;
        if !(scheduler.avg_speed_kmph.is_finite() && scheduler.avg_speed_kmph > 0.0) {
            return Err(ConfigError::Invalid("scheduler.avg_speed_kmph must be positive".to_string()));
        }
        if !(scheduler.fuel_km_per_l.is_finite() && scheduler.fuel_km_per_l > 0.0) {
            return Err(ConfigError::Invalid("scheduler.fuel_km_per_l must be positive".to_string()));
        }
        if !(scheduler.min_km >= 0.0 && scheduler.min_km <= scheduler.max_km) {
            return Err(ConfigError::Invalid(
                "scheduler.min_km must be non-negative and not above scheduler.max_km".to_string(),
            ));
        }
        if !(scheduler.cost_per_km.is_finite() && scheduler.cost_per_km >= 0.0) {
            return Err(ConfigError::Invalid(
                "scheduler.cost_per_km must be a non-negative number".to_string(),
            ));
        }
        if !(0..=MAX_DISPATCH_INTERVAL_MINS).contains(&scheduler.dispatch_interval_mins) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.dispatch_interval_mins must be between 0 and {}",
                MAX_DISPATCH_INTERVAL_MINS
            )));
        }

        Ok(())
    }
}
