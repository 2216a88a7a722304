//! [`ResourceProbe`] backed by the `sysinfo` crate, with a few Linux `/proc`
//! reads for values `sysinfo` does not expose.

use crate::domain::{DiskSample, MemorySample, ProcessSample, ResourceProbe, SampleReadError};
use std::path::{Path, PathBuf};
use sysinfo::{Disks, Pid, System};

pub struct SysinfoProbe {
    system: System,
    disks: Disks,
    pid: Pid,
    disk_path: PathBuf,
}

impl SysinfoProbe {
    pub fn new(disk_path: impl Into<PathBuf>) -> Result<Self, SampleReadError> {
        // ---
        let pid = sysinfo::get_current_pid().map_err(|reason| SampleReadError::Unavailable {
            resource: "process",
            reason: reason.to_string(),
        })?;

        let mut system = System::new();
        // Prime the CPU counters so the first percentage reading has a baseline.
        system.refresh_cpu();
        system.refresh_process(pid);

        Ok(Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            pid,
            disk_path: disk_path.into(),
        })
    }
}

/// Build the production probe for the given disk mount point.
pub fn create_system_probe(disk_path: &Path) -> Result<Box<dyn ResourceProbe>, SampleReadError> {
    Ok(Box::new(SysinfoProbe::new(disk_path)?))
}

impl ResourceProbe for SysinfoProbe {
    fn process(&mut self) -> Result<ProcessSample, SampleReadError> {
        // ---
        if !self.system.refresh_process(self.pid) {
            return Err(SampleReadError::Unavailable {
                resource: "process",
                reason: format!("pid {} not found", self.pid),
            });
        }
        let process = self.system.process(self.pid).ok_or_else(|| SampleReadError::Unavailable {
            resource: "process",
            reason: format!("pid {} not found", self.pid),
        })?;

        Ok(ProcessSample {
            cpu_seconds_total: procfs::cpu_seconds()?,
            cpu_percent: f64::from(process.cpu_usage()),
            resident_memory_bytes: process.memory(),
            virtual_memory_bytes: process.virtual_memory(),
            open_fds: procfs::open_fds()?,
            max_fds: procfs::max_fds()?,
            threads: procfs::threads()?,
            start_time_seconds: process.start_time(),
        })
    }

    fn cpu_percent(&mut self) -> Result<f64, SampleReadError> {
        self.system.refresh_cpu();
        Ok(f64::from(self.system.global_cpu_info().cpu_usage()))
    }

    fn memory(&mut self) -> Result<MemorySample, SampleReadError> {
        // ---
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(SampleReadError::Unavailable {
                resource: "memory",
                reason: "total memory reported as zero".into(),
            });
        }

        Ok(MemorySample {
            total_bytes: total,
            available_bytes: self.system.available_memory(),
            used_bytes: self.system.used_memory(),
            free_bytes: self.system.free_memory(),
        })
    }

    fn disk(&mut self) -> Result<DiskSample, SampleReadError> {
        // ---
        self.disks.refresh_list();

        // The disk whose mount point is the longest prefix of the target path.
        let disk = self
            .disks
            .list()
            .iter()
            .filter(|disk| self.disk_path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .ok_or_else(|| SampleReadError::Unavailable {
                resource: "disk",
                reason: format!("no mounted filesystem contains {}", self.disk_path.display()),
            })?;

        let total = disk.total_space();
        let free = disk.available_space();
        Ok(DiskSample {
            total_bytes: total,
            used_bytes: total.saturating_sub(free),
            free_bytes: free,
        })
    }
}

/// Values `sysinfo` does not expose.
///
/// A file the kernel does not provide, or one in an unexpected format, reads
/// as `None`. Any other I/O failure fails the whole process sample.
#[cfg(target_os = "linux")]
mod procfs {
    // ---
    use crate::domain::SampleReadError;
    use std::{fs, io};

    pub(super) fn read(path: &str) -> Result<Option<String>, SampleReadError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(err) => absent_or_failed(err),
        }
    }

    fn absent_or_failed<T>(err: io::Error) -> Result<Option<T>, SampleReadError> {
        match err.kind() {
            io::ErrorKind::NotFound => Ok(None),
            _ => Err(SampleReadError::Io {
                resource: "process",
                source: err,
            }),
        }
    }

    /// Cumulative on-CPU time of this process, from `/proc/self/schedstat`.
    pub fn cpu_seconds() -> Result<Option<f64>, SampleReadError> {
        let Some(stat) = read("/proc/self/schedstat")? else {
            return Ok(None);
        };
        let nanos = stat.split_whitespace().next().and_then(|v| v.parse::<u64>().ok());
        Ok(nanos.map(|n| n as f64 / 1e9))
    }

    pub fn open_fds() -> Result<Option<u64>, SampleReadError> {
        match fs::read_dir("/proc/self/fd") {
            Ok(dir) => Ok(Some(dir.count() as u64)),
            Err(err) => absent_or_failed(err),
        }
    }

    pub fn max_fds() -> Result<Option<u64>, SampleReadError> {
        let Some(limits) = read("/proc/self/limits")? else {
            return Ok(None);
        };
        Ok(limits
            .lines()
            .find(|line| line.starts_with("Max open files"))
            .and_then(|line| line.split_whitespace().nth(3))
            .and_then(|soft| soft.parse().ok()))
    }

    pub fn threads() -> Result<Option<u64>, SampleReadError> {
        let Some(status) = read("/proc/self/status")? else {
            return Ok(None);
        };
        Ok(status
            .lines()
            .find_map(|line| line.strip_prefix("Threads:"))
            .and_then(|count| count.trim().parse().ok()))
    }
}

#[cfg(not(target_os = "linux"))]
mod procfs {
    use crate::domain::SampleReadError;

    pub fn cpu_seconds() -> Result<Option<f64>, SampleReadError> {
        Ok(None)
    }

    pub fn open_fds() -> Result<Option<u64>, SampleReadError> {
        Ok(None)
    }

    pub fn max_fds() -> Result<Option<u64>, SampleReadError> {
        Ok(None)
    }

    pub fn threads() -> Result<Option<u64>, SampleReadError> {
        Ok(None)
    }
}
