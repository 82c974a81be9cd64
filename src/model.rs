use serde::Serialize;
use std::collections::BTreeMap;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One point-in-time snapshot of the host, built fresh for every request.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub timestamp: i64,
    pub system: SystemInfo,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disk: DiskInfo,
    pub network: BTreeMap<String, NetworkStats>,
    pub gpu: GpuInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub platform: String,
    pub hostname: String,
    pub uptime_seconds: u64,
    pub boot_time: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CpuInfo {
    pub percent: f64,
    pub count: usize,
    pub frequency_mhz: f64,
    pub load_average: LoadAverage,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct LoadAverage {
    #[serde(rename = "1min")]
    pub one: f64,
    #[serde(rename = "5min")]
    pub five: f64,
    #[serde(rename = "15min")]
    pub fifteen: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub percent: f64,
    pub swap_total_gb: f64,
    pub swap_used_gb: f64,
    pub swap_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percent: f64,
    pub disk_io: DiskIo,
}

/// `None` means no activity was observed on the sampled device (or there is
/// no device at all). Zero counters are reported as `None` as well.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DiskIo {
    pub read_mb: Option<f64>,
    pub write_mb: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NetworkStats {
    pub sent_mbps: f64,
    pub recv_mbps: f64,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errors: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpuInfo {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub gpus: Vec<GpuDevice>,
}

impl GpuInfo {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            error: Some(reason.into()),
            gpus: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GpuDevice {
    pub id: u32,
    pub name: String,
    pub load: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f64,
    pub temperature: f64,
}

/// Every float leaving the agent goes through this: two decimal places.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_MB)
}

pub fn clamp_percent(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    round2(value.clamp(0.0, 100.0))
}

pub fn usage_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    clamp_percent(used as f64 / total as f64 * 100.0)
}
