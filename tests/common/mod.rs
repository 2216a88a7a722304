// Test helpers are intentionally partially used
#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use axum_data_metrics::domain::{
    DataItem, DataStats, DiskSample, ItemQuery, MemorySample, NewDataItem, ProcessSample,
    Repository, RepositoryPtr, ResourceProbe, SampleReadError,
};
use axum_data_metrics::metrics::RegistryPtr;
use axum_data_metrics::{
    build_application, AppConfig, Application, MemoryRepository, MetricsConfig, ServerConfig,
    StorageConfig,
};
use reqwest::Client;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;
use uuid::Uuid;

static INIT: Once = Once::new();

// ============================================================================
// Test Setup
// ============================================================================

/// Initialize test logging once
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_ansi(false) // No colorization, makes logs easier to read.
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Deterministic probe: fixed readings, disk fails on the listed calls.
pub struct FakeProbe {
    pub calls: u64,
    pub failing_disk_calls: Vec<u64>,
}

impl FakeProbe {
    pub fn healthy() -> Box<dyn ResourceProbe> {
        Box::new(Self {
            calls: 0,
            failing_disk_calls: Vec::new(),
        })
    }
}

impl ResourceProbe for FakeProbe {
    fn process(&mut self) -> Result<ProcessSample, SampleReadError> {
        self.calls += 1;
        Ok(ProcessSample {
            cpu_seconds_total: Some(0.5 * self.calls as f64),
            cpu_percent: 1.0,
            resident_memory_bytes: 4096,
            virtual_memory_bytes: 8192,
            open_fds: Some(10),
            max_fds: Some(1024),
            threads: Some(3),
            start_time_seconds: 1_700_000_000,
        })
    }

    fn cpu_percent(&mut self) -> Result<f64, SampleReadError> {
        Ok(42.0)
    }

    fn memory(&mut self) -> Result<MemorySample, SampleReadError> {
        Ok(MemorySample {
            total_bytes: 1000,
            available_bytes: 600,
            used_bytes: 400,
            free_bytes: 500,
        })
    }

    fn disk(&mut self) -> Result<DiskSample, SampleReadError> {
        if self.failing_disk_calls.contains(&self.calls) {
            return Err(SampleReadError::Unavailable {
                resource: "disk",
                reason: "simulated failure".to_string(),
            });
        }
        Ok(DiskSample {
            total_bytes: 1000 * self.calls,
            used_bytes: 250 * self.calls,
            free_bytes: 750 * self.calls,
        })
    }
}

pub fn test_config() -> AppConfig {
    // ---
    AppConfig {
        server: ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            app_name: "Test Metrics Service".to_string(),
        },
        storage: StorageConfig::Memory,
        metrics: MetricsConfig {
            collection_interval: Duration::from_millis(20),
            ..MetricsConfig::default()
        },
    }
}

/// Application over an in-memory repository and the given probe.
pub fn test_application(probe: Box<dyn ResourceProbe>) -> Application {
    init_tracing();
    build_application(&test_config(), Arc::new(MemoryRepository::new()), probe)
        .expect("application should build")
}

/// Application over the given repository, with a healthy probe.
pub fn test_application_with(repository: RepositoryPtr) -> Application {
    init_tracing();
    build_application(&test_config(), repository, FakeProbe::healthy())
        .expect("application should build")
}

/// Repository whose store answers health checks with a fixed outcome and
/// holds no items.
pub struct DegradedRepository {
    /// `None` makes the health check fail outright.
    pub healthy: Option<bool>,
}

#[async_trait::async_trait]
impl Repository for DegradedRepository {
    async fn migrate(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        self.healthy
            .ok_or_else(|| anyhow::anyhow!("connection refused"))
    }

    async fn create_item(&self, _input: NewDataItem) -> anyhow::Result<DataItem> {
        anyhow::bail!("read-only store")
    }

    async fn list_items(&self, _query: &ItemQuery) -> anyhow::Result<(Vec<DataItem>, i64)> {
        Ok((Vec::new(), 0))
    }

    async fn get_item(&self, _id: Uuid) -> anyhow::Result<Option<DataItem>> {
        Ok(None)
    }

    async fn update_item(&self, _id: Uuid, _input: NewDataItem) -> anyhow::Result<Option<DataItem>> {
        Ok(None)
    }

    async fn delete_item(&self, _id: Uuid) -> anyhow::Result<Option<DataItem>> {
        Ok(None)
    }

    async fn statistics(&self) -> anyhow::Result<DataStats> {
        Ok(DataStats::default())
    }
}

/// Router and registry for in-process `oneshot` tests.
pub fn test_app() -> (Router, RegistryPtr) {
    let app = test_application(FakeProbe::healthy());
    (app.router.clone(), app.registry.clone())
}

// ============================================================================
// Request helpers
// ============================================================================

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, String) {
    // ---
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn send_json(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let (status, text) = send(app, method, uri, body).await;
    let value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
    (status, value)
}

// ============================================================================
// Real listener
// ============================================================================

pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub client: Client,
}

impl TestServer {
    // ---
    pub async fn new() -> Self {
        // ---
        let (app, _registry) = test_app();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Spawn the server in the background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = Client::new();

        Self { addr, client }
    }

    pub fn url(&self, path: &str) -> String {
        // ---
        format!("http://{}{}", self.addr, path)
    }
}
