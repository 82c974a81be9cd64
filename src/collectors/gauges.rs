use crate::collectors::{DiskIoCounters, MetricsProvider, ProviderError};
use crate::model::{
    bytes_to_gb, bytes_to_mb, clamp_percent, round2, usage_percent, CpuInfo, DiskInfo, DiskIo,
    GpuDevice, GpuInfo, LoadAverage, MemoryInfo, SystemInfo,
};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const GPU_NOT_IMPLEMENTED: &str = "GPU monitoring not implemented";
const NO_GPUS_DETECTED: &str = "No GPUs detected";

pub fn cpu_percent(provider: &dyn MetricsProvider, window: Duration) -> Result<f64, ProviderError> {
    provider.cpu_percent(window).map(clamp_percent)
}

/// Everything about the CPU except utilization, which is measured separately
/// because it blocks.
pub fn read_cpu(provider: &dyn MetricsProvider, percent: f64) -> Result<CpuInfo, ProviderError> {
    let count = provider.cpu_count()?;
    let frequency_mhz = provider
        .cpu_frequencies()?
        .first()
        .map(|mhz| *mhz as f64)
        .unwrap_or(0.0);
    let load = provider.load_average()?;

    Ok(CpuInfo {
        percent: clamp_percent(percent),
        count,
        frequency_mhz,
        load_average: LoadAverage {
            one: round2(load.one.max(0.0)),
            five: round2(load.five.max(0.0)),
            fifteen: round2(load.fifteen.max(0.0)),
        },
    })
}

pub fn read_memory(provider: &dyn MetricsProvider) -> Result<MemoryInfo, ProviderError> {
    let mem = provider.virtual_memory()?;
    let swap = provider.swap_memory()?;

    Ok(MemoryInfo {
        total_gb: bytes_to_gb(mem.total),
        used_gb: bytes_to_gb(mem.used),
        available_gb: bytes_to_gb(mem.available),
        percent: usage_percent(mem.used, mem.total),
        swap_total_gb: bytes_to_gb(swap.total),
        swap_used_gb: bytes_to_gb(swap.used),
        swap_percent: usage_percent(swap.used, swap.total),
    })
}

pub fn read_disk(provider: &dyn MetricsProvider, root: &Path) -> Result<DiskInfo, ProviderError> {
    let usage = provider.disk_usage(root)?;
    let devices = provider.disk_io_counters()?;

    Ok(DiskInfo {
        total_gb: bytes_to_gb(usage.total),
        used_gb: bytes_to_gb(usage.used),
        free_gb: bytes_to_gb(usage.free),
        percent: usage_percent(usage.used, usage.total),
        disk_io: disk_io_from(&devices),
    })
}

/// Only the first listed device is reported. A zero counter is reported as
/// absent, same as an empty device list.
pub fn disk_io_from(devices: &[DiskIoCounters]) -> DiskIo {
    let Some(first) = devices.first() else {
        return DiskIo::default();
    };
    debug!(
        device = %first.device,
        devices = devices.len(),
        "дисковый ввод-вывод по первому устройству"
    );
    DiskIo {
        read_mb: (first.read_bytes > 0).then(|| bytes_to_mb(first.read_bytes)),
        write_mb: (first.write_bytes > 0).then(|| bytes_to_mb(first.write_bytes)),
    }
}

pub fn read_system(provider: &dyn MetricsProvider, now_unix: i64) -> Result<SystemInfo, ProviderError> {
    let boot_time = provider.boot_time()?;
    let host = provider.host_info()?;
    let now = u64::try_from(now_unix).unwrap_or(0);

    Ok(SystemInfo {
        platform: host.platform,
        hostname: host.hostname,
        uptime_seconds: now.saturating_sub(boot_time),
        boot_time,
    })
}

/// GPU telemetry never fails the snapshot.
pub fn read_gpu(provider: &dyn MetricsProvider) -> GpuInfo {
    match provider.gpu_devices() {
        Ok(devices) if devices.is_empty() => GpuInfo::unavailable(NO_GPUS_DETECTED),
        Ok(devices) => GpuInfo {
            available: true,
            error: None,
            gpus: devices.into_iter().map(normalize_gpu).collect(),
        },
        Err(ProviderError::Query { reason, .. }) => GpuInfo::unavailable(reason),
        Err(err) => GpuInfo::unavailable(err.to_string()),
    }
}

fn normalize_gpu(device: GpuDevice) -> GpuDevice {
    GpuDevice {
        load: clamp_percent(device.load),
        memory_percent: usage_percent(device.memory_used, device.memory_total),
        temperature: round2(device.temperature),
        ..device
    }
}
