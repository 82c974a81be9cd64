pub mod counters;
#[cfg(test)]
pub mod fake;
pub mod gauges;
pub mod rates;
pub mod system;

use crate::model::GpuDevice;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Cumulative counters of one network interface as reported by the OS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub err_in: u64,
    pub err_out: u64,
    pub drop_in: u64,
    pub drop_out: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAverageRaw {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Bytes. `available` is what the OS reports, not `total - used`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub device: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInfo {
    pub hostname: String,
    pub platform: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    NetworkCounters,
    CpuPercent,
    CpuCount,
    CpuFrequency,
    LoadAverage,
    VirtualMemory,
    SwapMemory,
    DiskUsage,
    DiskIo,
    BootTime,
    HostInfo,
    Gpu,
}

impl Query {
    pub fn as_str(self) -> &'static str {
        match self {
            Query::NetworkCounters => "network_counters",
            Query::CpuPercent => "cpu_percent",
            Query::CpuCount => "cpu_count",
            Query::CpuFrequency => "cpu_frequency",
            Query::LoadAverage => "load_average",
            Query::VirtualMemory => "virtual_memory",
            Query::SwapMemory => "swap_memory",
            Query::DiskUsage => "disk_usage",
            Query::DiskIo => "disk_io",
            Query::BootTime => "boot_time",
            Query::HostInfo => "host_info",
            Query::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("запрос {query} к ОС завершился ошибкой: {reason}")]
    Query { query: Query, reason: String },
    #[error("сбор метрик не уложился в {0:?}")]
    Timeout(Duration),
    #[error("фоновая задача сбора прервана: {0}")]
    Interrupted(String),
}

impl ProviderError {
    pub fn query(query: Query, reason: impl Into<String>) -> Self {
        Self::Query {
            query,
            reason: reason.into(),
        }
    }

    /// Label used for failure accounting.
    pub fn source_label(&self) -> &'static str {
        match self {
            ProviderError::Query { query, .. } => query.as_str(),
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Interrupted(_) => "interrupted",
        }
    }
}

/// The OS metrics capability the collectors consume. Every method may block;
/// callers on an async runtime must move calls onto the blocking pool.
pub trait MetricsProvider: Send + Sync + 'static {
    fn network_counters(&self) -> Result<Vec<InterfaceCounters>, ProviderError>;

    /// Averages utilization over `window`, blocking for its whole length.
    fn cpu_percent(&self, window: Duration) -> Result<f64, ProviderError>;

    /// Logical cores.
    fn cpu_count(&self) -> Result<usize, ProviderError>;

    /// Nominal MHz per reported core, in OS order.
    fn cpu_frequencies(&self) -> Result<Vec<u64>, ProviderError>;

    fn load_average(&self) -> Result<LoadAverageRaw, ProviderError>;

    fn virtual_memory(&self) -> Result<MemoryUsage, ProviderError>;

    fn swap_memory(&self) -> Result<MemoryUsage, ProviderError>;

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage, ProviderError>;

    /// Per-device cumulative I/O in OS order.
    fn disk_io_counters(&self) -> Result<Vec<DiskIoCounters>, ProviderError>;

    /// Epoch seconds.
    fn boot_time(&self) -> Result<u64, ProviderError>;

    fn host_info(&self) -> Result<HostInfo, ProviderError>;

    fn gpu_devices(&self) -> Result<Vec<GpuDevice>, ProviderError> {
        Err(ProviderError::query(
            Query::Gpu,
            gauges::GPU_NOT_IMPLEMENTED,
        ))
    }
}
