//! Application state management.
//!
//! This module defines the shared state structure that gets passed to all
//! Axum handlers via the `State` extractor. The `AppState` holds the metric
//! registry, the HTTP instruments, the latest resource snapshot, and the
//! data repository.
//!
//! The state is designed to be cheaply cloneable (every field is an `Arc`)
//! so it can be passed to each request handler without copying resources.

use crate::domain::RepositoryPtr;
use crate::infrastructure::metrics::{HttpMetrics, RegistryPtr, ResourceSnapshot, SnapshotPtr};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

/// Service identity and settings reported by informational endpoints.
#[derive(Debug, Clone)]
pub(crate) struct ServiceInfo {
    pub name: String,
    pub version: &'static str,
    pub storage: &'static str,
    pub collection_interval: Duration,
    /// Route prefixes the request interceptor skips.
    pub exclude_paths: Vec<String>,
}

/// Shared application state passed to all Axum handlers.
///
/// This struct serves as the Dependency Injection container for the application.
/// It is built once at startup and never mutated afterwards; the registry and
/// snapshot it points at carry their own synchronization.
///
/// # Lifecycle
///
/// 1. Created once in `build_application()` during startup
/// 2. Attached to the router via `.with_state(app_state)` and to the
///    interceptor via `from_fn_with_state`
/// 3. Cloned by Axum for each incoming HTTP request
#[derive(Clone)]
pub(crate) struct AppState {
    /// Process-wide metric registry rendered by `/metrics`.
    registry: RegistryPtr,

    /// HTTP instruments fed by the request interceptor.
    http_metrics: Arc<HttpMetrics>,

    /// Latest system sampler reading.
    resources: SnapshotPtr,

    /// Data item persistence.
    repository: RepositoryPtr,

    service: Arc<ServiceInfo>,
}

impl AppState {
    // ---

    pub fn new(
        registry: RegistryPtr,
        http_metrics: Arc<HttpMetrics>,
        resources: SnapshotPtr,
        repository: RepositoryPtr,
        service: ServiceInfo,
    ) -> Self {
        // ---
        AppState {
            registry,
            http_metrics,
            resources,
            repository,
            service: Arc::new(service),
        }
    }

    pub(crate) fn registry(&self) -> &RegistryPtr {
        &self.registry
    }

    pub(crate) fn http_metrics(&self) -> &Arc<HttpMetrics> {
        &self.http_metrics
    }

    /// Copy of the latest resource snapshot.
    pub(crate) fn resources(&self) -> ResourceSnapshot {
        // ---
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn repository(&self) -> &RepositoryPtr {
        &self.repository
    }

    pub(crate) fn service(&self) -> &ServiceInfo {
        &self.service
    }

    /// Whether the interceptor should leave this path uninstrumented.
    pub(crate) fn is_excluded(&self, path: &str) -> bool {
        // ---
        self.service
            .exclude_paths
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{}/", prefix.trim_end_matches('/'))))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::infrastructure::metrics::MetricsRegistry;
    use crate::infrastructure::MemoryRepository;

    fn state(exclude_paths: &[&str]) -> AppState {
        // ---
        let registry = Arc::new(MetricsRegistry::new());
        let http_metrics = HttpMetrics::register(Arc::clone(&registry)).unwrap();
        AppState::new(
            registry,
            http_metrics,
            SnapshotPtr::default(),
            Arc::new(MemoryRepository::new()),
            ServiceInfo {
                name: "test".into(),
                version: "0.0.0",
                storage: "memory",
                collection_interval: Duration::from_secs(5),
                exclude_paths: exclude_paths.iter().map(|p| p.to_string()).collect(),
            },
        )
    }

    #[test]
    fn exclusion_matches_whole_path_segments() {
        // ---
        let state = state(&["/metrics"]);
        assert!(state.is_excluded("/metrics"));
        assert!(state.is_excluded("/metrics/summary"));
        assert!(!state.is_excluded("/metricsx"));
        assert!(!state.is_excluded("/api/v1/data"));
    }

    #[test]
    fn clone_shares_registry() {
        // ---
        let state = state(&[]);
        let cloned = state.clone();
        assert!(Arc::ptr_eq(state.registry(), cloned.registry()));
        assert!(state.resources().sampled_at.is_none());
    }
}
