use crate::collectors::{
    DiskIoCounters, DiskUsage, HostInfo, InterfaceCounters, LoadAverageRaw, MemoryUsage,
    MetricsProvider, ProviderError, Query,
};
#[cfg(target_os = "linux")]
use std::fs;
use std::path::Path;
use std::time::Duration;
use sysinfo::{
    CpuExt, CpuRefreshKind, DiskExt, NetworkExt, NetworksExt, RefreshKind, System, SystemExt,
};
use tracing::debug;

#[cfg(any(target_os = "linux", test))]
const SECTOR_BYTES: u64 = 512;

/// Production provider on top of sysinfo. Holds no state: every call builds
/// a fresh `System`, so concurrent requests never share a refresh cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProvider;

impl SysinfoProvider {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsProvider for SysinfoProvider {
    fn network_counters(&self) -> Result<Vec<InterfaceCounters>, ProviderError> {
        ensure_supported(Query::NetworkCounters)?;
        let mut system = System::new();
        system.refresh_networks_list();
        system.refresh_networks();

        let counters: Vec<InterfaceCounters> = system
            .networks()
            .iter()
            .map(|(iface, data)| {
                let (drop_in, drop_out) = read_drop_counters(iface);
                InterfaceCounters {
                    name: iface.to_string(),
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    packets_sent: data.total_packets_transmitted(),
                    packets_recv: data.total_packets_received(),
                    err_in: data.total_errors_on_received(),
                    err_out: data.total_errors_on_transmitted(),
                    drop_in,
                    drop_out,
                }
            })
            .collect();
        debug!(interfaces = counters.len(), "прочитаны счётчики интерфейсов");
        Ok(counters)
    }

    fn cpu_percent(&self, window: Duration) -> Result<f64, ProviderError> {
        ensure_supported(Query::CpuPercent)?;
        let mut system = System::new();
        system.refresh_cpu();
        std::thread::sleep(window.max(System::MINIMUM_CPU_UPDATE_INTERVAL));
        system.refresh_cpu();
        if system.cpus().is_empty() {
            return Err(ProviderError::query(
                Query::CpuPercent,
                "ОС не сообщила ни одного процессора",
            ));
        }
        Ok(system.global_cpu_info().cpu_usage() as f64)
    }

    fn cpu_count(&self) -> Result<usize, ProviderError> {
        ensure_supported(Query::CpuCount)?;
        let system = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
        match system.cpus().len() {
            0 => Err(ProviderError::query(
                Query::CpuCount,
                "ОС не сообщила ни одного логического ядра",
            )),
            count => Ok(count),
        }
    }

    fn cpu_frequencies(&self) -> Result<Vec<u64>, ProviderError> {
        ensure_supported(Query::CpuFrequency)?;
        let system = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new().with_frequency()),
        );
        let current: Vec<u64> = system.cpus().iter().map(|c| c.frequency()).collect();
        Ok(nominal_frequencies(&current, read_nominal_mhz))
    }

    fn load_average(&self) -> Result<LoadAverageRaw, ProviderError> {
        ensure_supported(Query::LoadAverage)?;
        let load = System::new().load_average();
        Ok(LoadAverageRaw {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        })
    }

    fn virtual_memory(&self) -> Result<MemoryUsage, ProviderError> {
        ensure_supported(Query::VirtualMemory)?;
        let mut system = System::new();
        system.refresh_memory();
        if system.total_memory() == 0 {
            return Err(ProviderError::query(
                Query::VirtualMemory,
                "ОС сообщила нулевой объём памяти",
            ));
        }
        Ok(MemoryUsage {
            total: system.total_memory(),
            used: system.used_memory(),
            available: system.available_memory(),
        })
    }

    fn swap_memory(&self) -> Result<MemoryUsage, ProviderError> {
        ensure_supported(Query::SwapMemory)?;
        let mut system = System::new();
        system.refresh_memory();
        Ok(MemoryUsage {
            total: system.total_swap(),
            used: system.used_swap(),
            available: system.free_swap(),
        })
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage, ProviderError> {
        ensure_supported(Query::DiskUsage)?;
        let mut system = System::new();
        system.refresh_disks_list();

        let disks = system.disks();
        let disk = &disks[select_mount(disks.iter().map(|d| d.mount_point()), path)?];

        let total = disk.total_space();
        let free = disk.available_space();
        debug!(
            mount = %disk.mount_point().display(),
            total_bytes = total,
            "выбрана файловая система для отчёта"
        );
        Ok(DiskUsage {
            total,
            used: total.saturating_sub(free),
            free,
        })
    }

    fn disk_io_counters(&self) -> Result<Vec<DiskIoCounters>, ProviderError> {
        ensure_supported(Query::DiskIo)?;
        read_disk_io_counters()
    }

    fn boot_time(&self) -> Result<u64, ProviderError> {
        ensure_supported(Query::BootTime)?;
        match System::new().boot_time() {
            0 => Err(ProviderError::query(
                Query::BootTime,
                "ОС не сообщила время загрузки",
            )),
            boot_time => Ok(boot_time),
        }
    }

    fn host_info(&self) -> Result<HostInfo, ProviderError> {
        ensure_supported(Query::HostInfo)?;
        let hostname = System::new()
            .host_name()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ProviderError::query(Query::HostInfo, "имя хоста недоступно"))?;
        Ok(HostInfo {
            hostname,
            platform: std::env::consts::OS.to_string(),
        })
    }
}

fn ensure_supported(query: Query) -> Result<(), ProviderError> {
    if System::IS_SUPPORTED {
        return Ok(());
    }
    Err(ProviderError::query(
        query,
        "платформа не поддерживается sysinfo",
    ))
}

/// Index of the mount whose mount point is the longest component-wise prefix
/// of `path`.
fn select_mount<P: AsRef<Path>>(
    mounts: impl IntoIterator<Item = P>,
    path: &Path,
) -> Result<usize, ProviderError> {
    mounts
        .into_iter()
        .enumerate()
        .filter(|(_, mount)| path.starts_with(mount.as_ref()))
        .max_by_key(|(_, mount)| mount.as_ref().components().count())
        .map(|(index, _)| index)
        .ok_or_else(|| {
            ProviderError::query(
                Query::DiskUsage,
                format!("не найдена файловая система для {}", path.display()),
            )
        })
}

/// sysinfo reports the current scaled clock; the nominal one wins when the
/// OS exposes it for that core.
fn nominal_frequencies(current: &[u64], nominal: impl Fn(usize) -> Option<u64>) -> Vec<u64> {
    current
        .iter()
        .enumerate()
        .map(|(core, mhz)| nominal(core).unwrap_or(*mhz))
        .collect()
}

#[cfg(target_os = "linux")]
fn read_nominal_mhz(core: usize) -> Option<u64> {
    let path = format!("/sys/devices/system/cpu/cpu{core}/cpufreq/cpuinfo_max_freq");
    fs::read_to_string(path)
        .ok()
        .and_then(|raw| parse_cpufreq_khz(&raw))
}

#[cfg(not(target_os = "linux"))]
fn read_nominal_mhz(_core: usize) -> Option<u64> {
    None
}

/// cpufreq files hold kHz.
#[cfg(any(target_os = "linux", test))]
fn parse_cpufreq_khz(raw: &str) -> Option<u64> {
    match raw.trim().parse::<u64>().ok()? / 1000 {
        0 => None,
        mhz => Some(mhz),
    }
}

#[cfg(target_os = "linux")]
fn read_drop_counters(iface: &str) -> (u64, u64) {
    let base = Path::new("/sys/class/net").join(iface).join("statistics");
    let read = |file: &str| {
        fs::read_to_string(base.join(file))
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    };
    (read("rx_dropped"), read("tx_dropped"))
}

#[cfg(not(target_os = "linux"))]
fn read_drop_counters(_iface: &str) -> (u64, u64) {
    (0, 0)
}

#[cfg(target_os = "linux")]
fn read_disk_io_counters() -> Result<Vec<DiskIoCounters>, ProviderError> {
    let raw = fs::read_to_string("/proc/diskstats")
        .map_err(|err| ProviderError::query(Query::DiskIo, format!("/proc/diskstats: {err}")))?;
    Ok(parse_diskstats(&raw))
}

#[cfg(not(target_os = "linux"))]
fn read_disk_io_counters() -> Result<Vec<DiskIoCounters>, ProviderError> {
    Ok(Vec::new())
}

/// Devices in kernel order. Malformed lines are skipped.
#[cfg(any(target_os = "linux", test))]
fn parse_diskstats(raw: &str) -> Vec<DiskIoCounters> {
    raw.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 10 {
                return None;
            }
            let sectors_read = parts[5].parse::<u64>().ok()?;
            let sectors_written = parts[9].parse::<u64>().ok()?;
            Some(DiskIoCounters {
                device: parts[2].to_string(),
                read_bytes: sectors_read.saturating_mul(SECTOR_BYTES),
                write_bytes: sectors_written.saturating_mul(SECTOR_BYTES),
            })
        })
        .collect()
}
