//! Periodic process and host resource sampling.
//!
//! The sampler owns a [`ResourceProbe`] and, once per tick, reads every
//! resource on the blocking pool and writes the results into registry gauges.
//! A resource that fails to read keeps its previous gauge values until the
//! next successful tick.

use crate::domain::{
    DiskSample, MemorySample, MetricDescriptor, MetricsError, ProcessSample, ResourceProbe,
    SampleReadError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::RegistryPtr;

pub const PROCESS_CPU_SECONDS_TOTAL: &str = "process_cpu_seconds_total";
pub const PROCESS_RESIDENT_MEMORY_BYTES: &str = "process_resident_memory_bytes";
pub const PROCESS_VIRTUAL_MEMORY_BYTES: &str = "process_virtual_memory_bytes";
pub const PROCESS_START_TIME_SECONDS: &str = "process_start_time_seconds";
pub const PROCESS_OPEN_FDS: &str = "process_open_fds";
pub const PROCESS_MAX_FDS: &str = "process_max_fds";
pub const PROCESS_THREADS: &str = "process_threads";
pub const SYSTEM_CPU_USAGE_PERCENT: &str = "system_cpu_usage_percent";
pub const SYSTEM_MEMORY_USAGE_BYTES: &str = "system_memory_usage_bytes";
pub const SYSTEM_MEMORY_USAGE_PERCENT: &str = "system_memory_usage_percent";
pub const SYSTEM_DISK_USAGE_BYTES: &str = "system_disk_usage_bytes";
pub const SYSTEM_DISK_USAGE_PERCENT: &str = "system_disk_usage_percent";
pub const APP_INFO: &str = "app_info";

/// Latest successful reading of every resource.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceSnapshot {
    pub sampled_at: Option<DateTime<Utc>>,
    pub process: Option<ProcessSample>,
    pub system: SystemSnapshot,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemSnapshot {
    pub cpu_percent: Option<f64>,
    pub memory: Option<MemorySample>,
    pub memory_percent: Option<f64>,
    pub disk: Option<DiskSample>,
    pub disk_percent: Option<f64>,
}

/// Shared view of the latest snapshot, read by the summary and health endpoints.
pub type SnapshotPtr = Arc<RwLock<ResourceSnapshot>>;

/// One tick's worth of probe results.
struct Readings {
    process: Result<ProcessSample, SampleReadError>,
    cpu: Result<f64, SampleReadError>,
    memory: Result<MemorySample, SampleReadError>,
    disk: Result<DiskSample, SampleReadError>,
}

impl Readings {
    fn read(probe: &mut dyn ResourceProbe) -> Self {
        Self {
            process: probe.process(),
            cpu: probe.cpu_percent(),
            memory: probe.memory(),
            disk: probe.disk(),
        }
    }
}

/// Background writer of process and system gauges.
pub struct SystemSampler {
    registry: RegistryPtr,
    probe: Arc<Mutex<Box<dyn ResourceProbe>>>,
    last_cpu_seconds: f64,
    start_time_recorded: bool,
    latest: SnapshotPtr,
}

impl SystemSampler {
    /// Register the resource families and an `app_info` gauge.
    pub fn register(
        registry: RegistryPtr,
        probe: Box<dyn ResourceProbe>,
        app_name: &str,
        app_version: &str,
    ) -> Result<Self, MetricsError> {
        // ---
        registry.register(MetricDescriptor::counter(
            PROCESS_CPU_SECONDS_TOTAL,
            "Total user and system CPU time spent in seconds",
            &[],
        )?)?;

        let gauges: [(&str, &str, &[&str]); 12] = [
            (PROCESS_RESIDENT_MEMORY_BYTES, "Resident memory size in bytes", &[]),
            (PROCESS_VIRTUAL_MEMORY_BYTES, "Virtual memory size in bytes", &[]),
            (
                PROCESS_START_TIME_SECONDS,
                "Start time of the process since unix epoch in seconds",
                &[],
            ),
            (PROCESS_OPEN_FDS, "Number of open file descriptors", &[]),
            (PROCESS_MAX_FDS, "Maximum number of open file descriptors", &[]),
            (PROCESS_THREADS, "Number of OS threads in the process", &[]),
            (SYSTEM_CPU_USAGE_PERCENT, "System CPU usage percentage", &[]),
            (SYSTEM_MEMORY_USAGE_BYTES, "System memory usage in bytes", &["type"]),
            (SYSTEM_MEMORY_USAGE_PERCENT, "System memory usage percentage", &[]),
            (SYSTEM_DISK_USAGE_BYTES, "System disk usage in bytes", &["type"]),
            (SYSTEM_DISK_USAGE_PERCENT, "System disk usage percentage", &[]),
            (APP_INFO, "Application information", &["name", "version"]),
        ];
        for (name, help, labels) in gauges {
            registry.register(MetricDescriptor::gauge(name, help, labels)?)?;
        }

        registry.gauge_set(APP_INFO, &[("name", app_name), ("version", app_version)], 1.0)?;

        Ok(Self {
            registry,
            probe: Arc::new(Mutex::new(probe)),
            last_cpu_seconds: 0.0,
            start_time_recorded: false,
            latest: SnapshotPtr::default(),
        })
    }

    pub fn snapshot_handle(&self) -> SnapshotPtr {
        Arc::clone(&self.latest)
    }

    /// Read every resource once and publish the results.
    pub async fn sample_once(&mut self) {
        // ---
        let probe = Arc::clone(&self.probe);
        let readings = tokio::task::spawn_blocking(move || {
            let mut probe = probe.lock().unwrap_or_else(PoisonError::into_inner);
            Readings::read(&mut **probe)
        })
        .await;

        match readings {
            Ok(readings) => self.apply(readings),
            Err(err) => error!(error = %err, "resource probe task failed"),
        }
    }

    /// Start the periodic loop. The first sample is taken immediately.
    pub fn spawn(mut self, period: Duration) -> SamplerHandle {
        // ---
        info!("Starting system metrics collection with {}s interval", period.as_secs_f64());

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sample_once().await;
            }
        });

        SamplerHandle { task }
    }

    fn apply(&mut self, readings: Readings) {
        // ---
        let mut snapshot = self
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match readings.process {
            Ok(process) => {
                self.apply_process(&process);
                snapshot.process = Some(process);
            }
            Err(err) => warn!(resource = "process", error = %err, "keeping previous process metrics"),
        }

        match readings.cpu {
            Ok(percent) => {
                self.set(SYSTEM_CPU_USAGE_PERCENT, &[], percent);
                snapshot.system.cpu_percent = Some(percent);
            }
            Err(err) => warn!(resource = "cpu", error = %err, "keeping previous cpu metrics"),
        }

        match readings.memory {
            Ok(memory) => {
                self.set(SYSTEM_MEMORY_USAGE_BYTES, &[("type", "total")], memory.total_bytes as f64);
                self.set(SYSTEM_MEMORY_USAGE_BYTES, &[("type", "available")], memory.available_bytes as f64);
                self.set(SYSTEM_MEMORY_USAGE_BYTES, &[("type", "used")], memory.used_bytes as f64);
                self.set(SYSTEM_MEMORY_USAGE_BYTES, &[("type", "free")], memory.free_bytes as f64);
                self.set(SYSTEM_MEMORY_USAGE_PERCENT, &[], memory.used_percent());
                snapshot.system.memory_percent = Some(memory.used_percent());
                snapshot.system.memory = Some(memory);
            }
            Err(err) => warn!(resource = "memory", error = %err, "keeping previous memory metrics"),
        }

        match readings.disk {
            Ok(disk) => {
                self.set(SYSTEM_DISK_USAGE_BYTES, &[("type", "total")], disk.total_bytes as f64);
                self.set(SYSTEM_DISK_USAGE_BYTES, &[("type", "used")], disk.used_bytes as f64);
                self.set(SYSTEM_DISK_USAGE_BYTES, &[("type", "free")], disk.free_bytes as f64);
                self.set(SYSTEM_DISK_USAGE_PERCENT, &[], disk.used_percent());
                snapshot.system.disk_percent = Some(disk.used_percent());
                snapshot.system.disk = Some(disk);
            }
            Err(err) => warn!(resource = "disk", error = %err, "keeping previous disk metrics"),
        }

        snapshot.sampled_at = Some(Utc::now());
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn apply_process(&mut self, process: &ProcessSample) {
        // ---
        if let Some(total) = process.cpu_seconds_total {
            // The OS value is cumulative; only forward movement is recorded.
            if total > self.last_cpu_seconds {
                let delta = total - self.last_cpu_seconds;
                if let Err(err) = self.registry.counter_increment(PROCESS_CPU_SECONDS_TOTAL, &[], delta) {
                    warn!(error = %err, "failed to record process cpu time");
                }
                self.last_cpu_seconds = total;
            }
        }

        self.set(PROCESS_RESIDENT_MEMORY_BYTES, &[], process.resident_memory_bytes as f64);
        self.set(PROCESS_VIRTUAL_MEMORY_BYTES, &[], process.virtual_memory_bytes as f64);

        if let Some(fds) = process.open_fds {
            self.set(PROCESS_OPEN_FDS, &[], fds as f64);
        }
        if let Some(max) = process.max_fds {
            self.set(PROCESS_MAX_FDS, &[], max as f64);
        }
        if let Some(threads) = process.threads {
            self.set(PROCESS_THREADS, &[], threads as f64);
        }

        if !self.start_time_recorded {
            self.set(PROCESS_START_TIME_SECONDS, &[], process.start_time_seconds as f64);
            self.start_time_recorded = true;
        }
    }

    fn set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        if let Err(err) = self.registry.gauge_set(name, labels, value) {
            warn!(metric = name, error = %err, "failed to update gauge");
        }
    }
}

/// Handle to the running sampler task.
pub struct SamplerHandle {
    task: JoinHandle<()>,
}

impl SamplerHandle {
    pub fn stop(self) {
        info!("Stopping system metrics collection");
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::SeriesValue;
    use crate::infrastructure::metrics::MetricsRegistry;

    /// Probe whose readings grow each tick; disk fails on chosen ticks.
    struct ScriptedProbe {
        tick: u64,
        failing_disk_ticks: Vec<u64>,
    }

    impl ResourceProbe for ScriptedProbe {
        fn process(&mut self) -> Result<ProcessSample, SampleReadError> {
            self.tick += 1;
            Ok(ProcessSample {
                cpu_seconds_total: Some(1.5 * self.tick as f64),
                cpu_percent: 3.0,
                resident_memory_bytes: 1_000 * self.tick,
                virtual_memory_bytes: 10_000,
                open_fds: Some(7),
                max_fds: Some(1024),
                threads: Some(4),
                start_time_seconds: 1_700_000_000 + self.tick,
            })
        }

        fn cpu_percent(&mut self) -> Result<f64, SampleReadError> {
            Ok(12.5)
        }

        fn memory(&mut self) -> Result<MemorySample, SampleReadError> {
            Ok(MemorySample {
                total_bytes: 8_000,
                available_bytes: 6_000,
                used_bytes: 2_000,
                free_bytes: 5_000,
            })
        }

        fn disk(&mut self) -> Result<DiskSample, SampleReadError> {
            if self.failing_disk_ticks.contains(&self.tick) {
                return Err(SampleReadError::Unavailable {
                    resource: "disk",
                    reason: "simulated".into(),
                });
            }
            Ok(DiskSample {
                total_bytes: 100 * self.tick,
                used_bytes: 25 * self.tick,
                free_bytes: 75 * self.tick,
            })
        }
    }

    fn sampler(failing_disk_ticks: Vec<u64>) -> (RegistryPtr, SystemSampler) {
        let registry = Arc::new(MetricsRegistry::new());
        let probe = Box::new(ScriptedProbe {
            tick: 0,
            failing_disk_ticks,
        });
        let sampler = SystemSampler::register(Arc::clone(&registry), probe, "test-app", "0.0.1").unwrap();
        (registry, sampler)
    }

    fn gauge(registry: &MetricsRegistry, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match registry.value(name, labels).unwrap() {
            Some(SeriesValue::Gauge(v)) => Some(v),
            None => None,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_sample_populates_gauges() {
        // ---
        let (registry, mut sampler) = sampler(vec![]);
        sampler.sample_once().await;

        assert_eq!(gauge(&registry, PROCESS_RESIDENT_MEMORY_BYTES, &[]), Some(1_000.0));
        assert_eq!(gauge(&registry, SYSTEM_CPU_USAGE_PERCENT, &[]), Some(12.5));
        assert_eq!(gauge(&registry, SYSTEM_MEMORY_USAGE_BYTES, &[("type", "free")]), Some(5_000.0));
        assert_eq!(gauge(&registry, SYSTEM_MEMORY_USAGE_PERCENT, &[]), Some(25.0));
        assert_eq!(gauge(&registry, SYSTEM_DISK_USAGE_PERCENT, &[]), Some(25.0));
        assert_eq!(
            gauge(&registry, APP_INFO, &[("name", "test-app"), ("version", "0.0.1")]),
            Some(1.0)
        );

        let snapshot = sampler.snapshot_handle().read().unwrap().clone();
        assert!(snapshot.sampled_at.is_some());
        assert_eq!(snapshot.system.cpu_percent, Some(12.5));
    }

    #[tokio::test]
    async fn failed_disk_read_keeps_previous_value() {
        // ---
        let (registry, mut sampler) = sampler(vec![2]);

        sampler.sample_once().await;
        sampler.sample_once().await;

        // Disk keeps tick 1, other resources moved on to tick 2.
        assert_eq!(gauge(&registry, SYSTEM_DISK_USAGE_BYTES, &[("type", "total")]), Some(100.0));
        assert_eq!(gauge(&registry, PROCESS_RESIDENT_MEMORY_BYTES, &[]), Some(2_000.0));

        let snapshot = sampler.snapshot_handle().read().unwrap().clone();
        assert_eq!(snapshot.system.disk.map(|d| d.total_bytes), Some(100));

        sampler.sample_once().await;
        assert_eq!(gauge(&registry, SYSTEM_DISK_USAGE_BYTES, &[("type", "total")]), Some(300.0));
    }

    #[tokio::test]
    async fn cpu_counter_tracks_os_total_and_start_time_is_set_once() {
        // ---
        let (registry, mut sampler) = sampler(vec![]);

        sampler.sample_once().await;
        sampler.sample_once().await;
        sampler.sample_once().await;

        assert_eq!(
            registry.value(PROCESS_CPU_SECONDS_TOTAL, &[]).unwrap(),
            Some(SeriesValue::Counter(4.5))
        );
        assert_eq!(
            gauge(&registry, PROCESS_START_TIME_SECONDS, &[]),
            Some(1_700_000_001.0)
        );
    }
}
