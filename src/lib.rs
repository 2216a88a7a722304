// src/lib.rs
use anyhow::{Context, Result};
use app_state::{AppState, ServiceInfo};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use handlers::*;
use infrastructure::metrics::{HttpMetrics, RegistryPtr, SamplerHandle, SystemSampler};

// Public exports (visible outside this module)
pub mod domain;

// Internal-only exports (sibling access within this module)
mod app_state;
mod config;
mod handlers;
mod infrastructure;
mod interceptor;

pub use config::*;

// Publicly expose the infrastructure creation functions
pub use infrastructure::{
    create_postgres_repository, // ---
    create_registry,
    create_repository,
    create_system_probe,
    MemoryRepository,
    PostgresRepository,
};
pub use infrastructure::metrics;

/// A fully wired service: router plus the sampler that has not started yet.
pub struct Application {
    pub router: Router,
    pub registry: RegistryPtr,
    sampler: SystemSampler,
    collection_interval: Duration,
}

impl Application {
    /// Take one resource sample immediately, without the background loop.
    pub async fn sample_once(&mut self) {
        self.sampler.sample_once().await;
    }

    /// Spawn the periodic system sampler on the current runtime.
    pub fn start_sampler(self) -> (Router, SamplerHandle) {
        // ---
        let handle = self.sampler.spawn(self.collection_interval);
        (self.router, handle)
    }
}

/// Build the HTTP application around an explicit repository and resource probe.
///
/// Registers every metric family in a fresh registry, wires the request
/// interceptor around all routes (including the not-found fallback), and
/// prepares the system sampler.
pub fn build_application(
    config: &AppConfig,
    repository: domain::RepositoryPtr,
    probe: Box<dyn domain::ResourceProbe>,
) -> Result<Application> {
    // ---
    let registry = create_registry();
    let version = env!("CARGO_PKG_VERSION");

    let http_metrics = HttpMetrics::register(Arc::clone(&registry))
        .context("failed to register HTTP metrics")?;
    let sampler = SystemSampler::register(
        Arc::clone(&registry),
        probe,
        &config.server.app_name,
        version,
    )
    .context("failed to register system metrics")?;

    let storage = match config.storage {
        StorageConfig::Memory => "memory",
        StorageConfig::Postgres(_) => "postgres",
    };

    let app_state = AppState::new(
        Arc::clone(&registry),
        http_metrics,
        sampler.snapshot_handle(),
        repository,
        ServiceInfo {
            name: config.server.app_name.clone(),
            version,
            storage,
            collection_interval: config.metrics.collection_interval,
            exclude_paths: config.metrics.exclude_paths.clone(),
        },
    );

    let api = Router::new()
        .route("/", get(api_root_handler))
        .route("/data", post(create_item).get(list_items))
        .route(
            "/data/{item_id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/stats", get(statistics))
        .route("/simulate-load", post(simulate_load))
        .route("/health/database", get(database_health));

    let router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .route("/health/ready", get(readiness_check))
        .route("/health/live", get(liveness_check))
        .route("/health/database", get(database_status))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/summary", get(metrics_summary_handler))
        .nest("/api/v1", api)
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            interceptor::track_http_metrics,
        ))
        .with_state(app_state);

    Ok(Application {
        router,
        registry,
        sampler,
        collection_interval: config.metrics.collection_interval,
    })
}
