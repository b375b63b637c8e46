use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("invalid cost model: {0}")]
    InvalidCostModel(String),
    #[error("invalid schedule model: {0}")]
    InvalidScheduleModel(String),
    #[error("registry unavailable: {0}")]
    Registry(#[from] RegistryError),
}
