pub mod config;
pub mod logger;
pub mod types;


pub use config::{Config, ConfigError};
pub use types::GeoPoint;
