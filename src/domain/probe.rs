//! Resource probe abstraction used by the system sampler.
//!
//! Each method reads one resource. A failure is reported per resource so the
//! sampler can keep the previous value of that resource's gauges and carry on
//! with the others.

use serde::Serialize;
use thiserror::Error;

/// Process-level reading.
///
/// Fields that are not available on the current platform are `None`; the
/// sampler leaves the matching gauges untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessSample {
    /// Cumulative user + system CPU time in seconds.
    pub cpu_seconds_total: Option<f64>,
    pub cpu_percent: f64,
    pub resident_memory_bytes: u64,
    pub virtual_memory_bytes: u64,
    pub open_fds: Option<u64>,
    pub max_fds: Option<u64>,
    pub threads: Option<u64>,
    /// Seconds since the unix epoch.
    pub start_time_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemorySample {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl MemorySample {
    pub fn used_percent(&self) -> f64 {
        percent(self.used_bytes, self.total_bytes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskSample {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl DiskSample {
    pub fn used_percent(&self) -> f64 {
        percent(self.used_bytes, self.total_bytes)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    // ---
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Transient failure reading one resource.
#[derive(Debug, Error)]
pub enum SampleReadError {
    #[error("{resource} unavailable: {reason}")]
    Unavailable {
        resource: &'static str,
        reason: String,
    },

    #[error("failed to read {resource}: {source}")]
    Io {
        resource: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Source of OS and process resource readings.
///
/// Implementations may block; the sampler only calls them from the blocking
/// thread pool.
pub trait ResourceProbe: Send + 'static {
    // ---
    /// Read process CPU, memory, handle and thread usage.
    fn process(&mut self) -> Result<ProcessSample, SampleReadError>;

    /// System-wide CPU utilisation in percent.
    fn cpu_percent(&mut self) -> Result<f64, SampleReadError>;

    /// System memory totals.
    fn memory(&mut self) -> Result<MemorySample, SampleReadError>;

    /// Usage of the filesystem holding the configured mount point.
    fn disk(&mut self) -> Result<DiskSample, SampleReadError>;
}
