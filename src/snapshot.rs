use crate::collectors::counters::{self, CounterSnapshot};
use crate::collectors::gauges;
use crate::collectors::rates::estimate_rates;
use crate::collectors::{MetricsProvider, ProviderError};
use crate::model::{CpuInfo, DiskInfo, GpuInfo, MemoryInfo, Metrics, NetworkStats, SystemInfo};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::{task, time};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub root_path: PathBuf,
    /// Gap between the two network counter samples.
    pub observation_window: Duration,
    /// Averaging window for CPU utilization.
    pub cpu_window: Duration,
    /// Run both windows as joined concurrent tasks instead of back to back.
    pub overlap_windows: bool,
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    FirstSample,
    Windowing,
    SecondSample,
    GaugeReading,
    Assembled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FirstSample => "first_sample",
            Stage::Windowing => "windowing",
            Stage::SecondSample => "second_sample",
            Stage::GaugeReading => "gauge_reading",
            Stage::Assembled => "assembled",
        };
        f.write_str(name)
    }
}

/// A finished snapshot plus what happened while building it.
#[derive(Debug, Clone)]
pub struct Collected {
    pub metrics: Metrics,
    /// The second counter sample failed and `network` was left empty.
    pub network_degraded: bool,
    pub elapsed: Duration,
}

struct Gauges {
    system: SystemInfo,
    cpu: CpuInfo,
    memory: MemoryInfo,
    disk: DiskInfo,
    gpu: GpuInfo,
}

/// Builds one snapshot. Fails as a whole on any provider error except a
/// failed second counter sample, which only empties the network map.
pub async fn collect_snapshot(
    provider: Arc<dyn MetricsProvider>,
    opts: &SnapshotOptions,
) -> Result<Collected, ProviderError> {
    let started = Instant::now();
    let (metrics, network_degraded) = match opts.deadline {
        Some(limit) => time::timeout(limit, run_pipeline(provider, opts))
            .await
            .map_err(|_| ProviderError::Timeout(limit))??,
        None => run_pipeline(provider, opts).await?,
    };
    Ok(Collected {
        metrics,
        network_degraded,
        elapsed: started.elapsed(),
    })
}

async fn run_pipeline(
    provider: Arc<dyn MetricsProvider>,
    opts: &SnapshotOptions,
) -> Result<(Metrics, bool), ProviderError> {
    debug!(stage = %Stage::FirstSample, "снимок: первая выборка счётчиков");
    let first = blocking(&provider, |p| counters::sample(p)).await?;

    debug!(
        stage = %Stage::Windowing,
        overlap = opts.overlap_windows,
        "снимок: окно наблюдения"
    );
    let cpu_window = opts.cpu_window;
    let cpu_percent = if opts.overlap_windows {
        let (_, cpu) = tokio::join!(
            time::sleep(opts.observation_window),
            blocking(&provider, move |p| gauges::cpu_percent(p, cpu_window)),
        );
        cpu?
    } else {
        time::sleep(opts.observation_window).await;
        blocking(&provider, move |p| gauges::cpu_percent(p, cpu_window)).await?
    };

    debug!(stage = %Stage::SecondSample, "снимок: вторая выборка счётчиков");
    let (network, network_degraded) = match blocking(&provider, |p| counters::sample(p)).await {
        Ok(second) => (rates_between(&first, &second), false),
        Err(err) => {
            warn!(error = %err, "вторая выборка счётчиков не удалась, сеть будет пустой");
            (BTreeMap::new(), true)
        }
    };

    debug!(stage = %Stage::GaugeReading, "снимок: чтение мгновенных показателей");
    let root = opts.root_path.clone();
    let gauges = blocking(&provider, move |p| read_gauges(p, &root, cpu_percent)).await?;

    let metrics = Metrics {
        timestamp: now_unix(),
        system: gauges.system,
        cpu: gauges.cpu,
        memory: gauges.memory,
        disk: gauges.disk,
        network,
        gpu: gauges.gpu,
    };
    debug!(stage = %Stage::Assembled, interfaces = metrics.network.len(), "снимок собран");
    Ok((metrics, network_degraded))
}

fn rates_between(
    first: &CounterSnapshot,
    second: &CounterSnapshot,
) -> BTreeMap<String, NetworkStats> {
    let elapsed_secs = second.seconds_since(first);
    debug!(elapsed_secs, "интервал между выборками");
    estimate_rates(first, second, elapsed_secs)
}

fn read_gauges(
    provider: &dyn MetricsProvider,
    root: &Path,
    cpu_percent: f64,
) -> Result<Gauges, ProviderError> {
    Ok(Gauges {
        cpu: gauges::read_cpu(provider, cpu_percent)?,
        memory: gauges::read_memory(provider)?,
        disk: gauges::read_disk(provider, root)?,
        system: gauges::read_system(provider, now_unix())?,
        gpu: gauges::read_gpu(provider),
    })
}

async fn blocking<T, F>(provider: &Arc<dyn MetricsProvider>, f: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MetricsProvider) -> Result<T, ProviderError> + Send + 'static,
{
    let provider = Arc::clone(provider);
    task::spawn_blocking(move || f(provider.as_ref()))
        .await
        .map_err(|err| ProviderError::Interrupted(err.to_string()))?
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
