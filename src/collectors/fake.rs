use crate::collectors::{
    DiskIoCounters, DiskUsage, HostInfo, InterfaceCounters, LoadAverageRaw, MemoryUsage,
    MetricsProvider, ProviderError, Query,
};
use crate::model::GpuDevice;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted provider for tests. Counter readings are handed out in order and
/// the last one repeats once the script runs out.
pub struct FakeProvider {
    counters: Mutex<VecDeque<Vec<InterfaceCounters>>>,
    counter_calls: AtomicUsize,
    fail_counters_from_call: Option<usize>,
    failing: HashSet<Query>,
    cpu_percent: f64,
    frequencies: Vec<u64>,
    load: LoadAverageRaw,
    memory: MemoryUsage,
    swap: MemoryUsage,
    disk: DiskUsage,
    disk_io: Vec<DiskIoCounters>,
    boot_time: u64,
    gpus: Option<Vec<GpuDevice>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(VecDeque::new()),
            counter_calls: AtomicUsize::new(0),
            fail_counters_from_call: None,
            failing: HashSet::new(),
            cpu_percent: 10.0,
            frequencies: vec![2400],
            load: LoadAverageRaw {
                one: 0.5,
                five: 0.4,
                fifteen: 0.3,
            },
            memory: MemoryUsage {
                total: 16 * 1_073_741_824,
                used: 4 * 1_073_741_824,
                available: 12 * 1_073_741_824,
            },
            swap: MemoryUsage {
                total: 2 * 1_073_741_824,
                used: 0,
                available: 2 * 1_073_741_824,
            },
            disk: DiskUsage {
                total: 200 * 1_073_741_824,
                used: 50 * 1_073_741_824,
                free: 150 * 1_073_741_824,
            },
            disk_io: vec![DiskIoCounters {
                device: "sda".to_string(),
                read_bytes: 10 * 1_048_576,
                write_bytes: 20 * 1_048_576,
            }],
            boot_time: 1_700_000_000,
            gpus: None,
        }
    }

    pub fn with_counters(self, readings: Vec<Vec<InterfaceCounters>>) -> Self {
        Self {
            counters: Mutex::new(readings.into()),
            ..self
        }
    }

    /// Counter calls numbered from 1; this call and every later one fail.
    pub fn fail_counters_from(self, call: usize) -> Self {
        Self {
            fail_counters_from_call: Some(call),
            ..self
        }
    }

    pub fn failing(mut self, query: Query) -> Self {
        self.failing.insert(query);
        self
    }

    pub fn with_cpu_percent(self, cpu_percent: f64) -> Self {
        Self {
            cpu_percent,
            ..self
        }
    }

    pub fn with_frequencies(self, frequencies: Vec<u64>) -> Self {
        Self {
            frequencies,
            ..self
        }
    }

    pub fn with_load(self, load: LoadAverageRaw) -> Self {
        Self { load, ..self }
    }

    pub fn with_memory(self, memory: MemoryUsage) -> Self {
        Self { memory, ..self }
    }

    pub fn with_swap(self, swap: MemoryUsage) -> Self {
        Self { swap, ..self }
    }

    pub fn with_disk(self, disk: DiskUsage) -> Self {
        Self { disk, ..self }
    }

    pub fn with_disk_io(self, disk_io: Vec<DiskIoCounters>) -> Self {
        Self { disk_io, ..self }
    }

    pub fn with_boot_time(self, boot_time: u64) -> Self {
        Self { boot_time, ..self }
    }

    pub fn with_gpus(self, gpus: Vec<GpuDevice>) -> Self {
        Self {
            gpus: Some(gpus),
            ..self
        }
    }

    pub fn counter_calls(&self) -> usize {
        self.counter_calls.load(Ordering::SeqCst)
    }

    fn check(&self, query: Query) -> Result<(), ProviderError> {
        if self.failing.contains(&query) {
            return Err(ProviderError::query(query, "сбой в тестовом провайдере"));
        }
        Ok(())
    }
}

impl MetricsProvider for FakeProvider {
    fn network_counters(&self) -> Result<Vec<InterfaceCounters>, ProviderError> {
        let call = self.counter_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.check(Query::NetworkCounters)?;
        if self.fail_counters_from_call.is_some_and(|from| call >= from) {
            return Err(ProviderError::query(
                Query::NetworkCounters,
                "интерфейсы недоступны",
            ));
        }

        let mut script = self.counters.lock().expect("мьютекс сценария");
        if script.len() > 1 {
            Ok(script.pop_front().unwrap_or_default())
        } else {
            Ok(script.front().cloned().unwrap_or_default())
        }
    }

    fn cpu_percent(&self, window: Duration) -> Result<f64, ProviderError> {
        std::thread::sleep(window);
        self.check(Query::CpuPercent)?;
        Ok(self.cpu_percent)
    }

    fn cpu_count(&self) -> Result<usize, ProviderError> {
        self.check(Query::CpuCount)?;
        Ok(4)
    }

    fn cpu_frequencies(&self) -> Result<Vec<u64>, ProviderError> {
        self.check(Query::CpuFrequency)?;
        Ok(self.frequencies.clone())
    }

    fn load_average(&self) -> Result<LoadAverageRaw, ProviderError> {
        self.check(Query::LoadAverage)?;
        Ok(self.load)
    }

    fn virtual_memory(&self) -> Result<MemoryUsage, ProviderError> {
        self.check(Query::VirtualMemory)?;
        Ok(self.memory)
    }

    fn swap_memory(&self) -> Result<MemoryUsage, ProviderError> {
        self.check(Query::SwapMemory)?;
        Ok(self.swap)
    }

    fn disk_usage(&self, _path: &Path) -> Result<DiskUsage, ProviderError> {
        self.check(Query::DiskUsage)?;
        Ok(self.disk)
    }

    fn disk_io_counters(&self) -> Result<Vec<DiskIoCounters>, ProviderError> {
        self.check(Query::DiskIo)?;
        Ok(self.disk_io.clone())
    }

    fn boot_time(&self) -> Result<u64, ProviderError> {
        self.check(Query::BootTime)?;
        Ok(self.boot_time)
    }

    fn host_info(&self) -> Result<HostInfo, ProviderError> {
        self.check(Query::HostInfo)?;
        Ok(HostInfo {
            hostname: "fake-host".to_string(),
            platform: "linux".to_string(),
        })
    }

    fn gpu_devices(&self) -> Result<Vec<GpuDevice>, ProviderError> {
        match &self.gpus {
            Some(gpus) => Ok(gpus.clone()),
            None => Err(ProviderError::query(
                Query::Gpu,
                crate::collectors::gauges::GPU_NOT_IMPLEMENTED,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_calls_are_counted_even_when_failing() {
        let provider = FakeProvider::default().fail_counters_from(2);
        assert!(provider.network_counters().is_ok());
        assert!(provider.network_counters().is_err());
        assert!(provider.network_counters().is_err());
        assert_eq!(provider.counter_calls(), 3);
    }
}
