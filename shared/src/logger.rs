//! Logging utilities

use tracing_subscriber::EnvFilter;

/// Initialize the JSON logger. `RUST_LOG` overrides the `info` default.
///
/// Calling this twice is harmless; the second subscriber is discarded.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}

/// Masks a secret for logging, keeping only the first four characters.
pub fn sanitize_for_log(value: &str) -> String {
    if value.chars().count() <= 4 {
        return "****".to_string();
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{}****", prefix)
}
