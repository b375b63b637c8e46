use anyhow::Context;
use gateway_service::{create_router, AppState};
use optimizer_service::JsonFileRegistry;
use shared::logger::init_logger;
use shared::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use telemetry_service::{spawn_ingestor, IngestStats, TelemetryCache};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let config = Config::from_env().context("loading configuration")?;

    let cache = Arc::new(TelemetryCache::new(config.cache.capacity()?));
    let stats = Arc::new(IngestStats::default());
    let cancel = CancellationToken::new();
    let ingestor = spawn_ingestor(&config.feed, Arc::clone(&cache), Arc::clone(&stats), cancel.clone());

    let registry = Arc::new(JsonFileRegistry::new(config.registry.data_dir.clone()));
    let state = AppState::new(&config, cache, stats, registry)?;
    let app = create_router(state, config.server.request_timeout());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "logiflow listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(handle) = ingestor {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "feed ingestor did not stop cleanly");
        }
    }

    tracing::info!("logiflow stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM and cancels background work.
async fn shutdown_signal(cancel: CancellationToken) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, starting graceful shutdown");
    cancel.cancel();
}
