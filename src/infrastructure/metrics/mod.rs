mod exposition;
mod http;
mod registry;
mod sysinfo_probe;
mod system;

pub use exposition::CONTENT_TYPE;
pub use http::{HttpMetrics, RequestOutcome, RequestTracker, NOT_FOUND_ENDPOINT};
pub use registry::MetricsRegistry;
pub use sysinfo_probe::{create_system_probe, SysinfoProbe};
pub use system::{ResourceSnapshot, SamplerHandle, SnapshotPtr, SystemSampler, SystemSnapshot};
use std::sync::Arc;

/// Shared handle to the process-wide metric registry.
pub type RegistryPtr = Arc<MetricsRegistry>;

/// Family names, for callers that read values back out of the registry.
pub mod names {
    pub use super::http::{
        HTTP_REQUESTS_EXCEPTIONS_TOTAL, HTTP_REQUESTS_IN_PROGRESS, HTTP_REQUESTS_TOTAL,
        HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUEST_PROCESSING_SECONDS, HTTP_REQUEST_SIZE_BYTES,
        HTTP_RESPONSE_SIZE_BYTES,
    };
    pub use super::system::{
        APP_INFO, PROCESS_CPU_SECONDS_TOTAL, PROCESS_MAX_FDS, PROCESS_OPEN_FDS,
        PROCESS_RESIDENT_MEMORY_BYTES, PROCESS_START_TIME_SECONDS, PROCESS_THREADS,
        PROCESS_VIRTUAL_MEMORY_BYTES, SYSTEM_CPU_USAGE_PERCENT, SYSTEM_DISK_USAGE_BYTES,
        SYSTEM_DISK_USAGE_PERCENT, SYSTEM_MEMORY_USAGE_BYTES, SYSTEM_MEMORY_USAGE_PERCENT,
    };
}

/// Creates an empty registry.
pub fn create_registry() -> RegistryPtr {
    tracing::info!("Initializing metrics registry");
    Arc::new(MetricsRegistry::new())
}
