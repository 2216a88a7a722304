use anyhow::{Context, Result};
use axum_data_metrics::{build_application, create_repository, create_system_probe, AppConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenvy::dotenv().ok();

    // Log to stdout, filtered by RUST_LOG (default: info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Starting {} v{}...",
        config.server.app_name,
        env!("CARGO_PKG_VERSION")
    );

    let repository = create_repository(&config.storage)?;
    repository.migrate().await?;

    let probe = create_system_probe(&config.metrics.disk_path)
        .context("failed to initialize system resource probe")?;
    let application = build_application(&config, repository, probe)?;
    let (router, sampler) = application.start_sampler();

    info!("Starting at endpoint:{}", config.server.bind_addr);
    info!("Metrics available at: /metrics");

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sampler.stop();
    info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    // ---
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
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

    info!("Shutdown signal received");
}
