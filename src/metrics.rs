use crate::snapshot::Collected;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The agent's own health, exposed in prometheus text format. Nothing here
/// feeds back into snapshots.
#[derive(Clone)]
pub struct Telemetry {
    registry: Registry,
    started_at_unix: i64,
    pub agent_snapshot_requests_total: Counter,
    pub agent_snapshot_failures_total: CounterVec,
    pub agent_network_degraded_total: Counter,
    pub agent_snapshot_duration_seconds: Gauge,
    pub agent_last_snapshot_timestamp_seconds: Gauge,
    pub agent_net_iface_count: Gauge,
    pub agent_uptime_seconds: Gauge,
}

impl Telemetry {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let agent_snapshot_requests_total = Counter::with_opts(opts!(
            "agent_snapshot_requests_total",
            "Snapshot requests received"
        ))?;
        let agent_snapshot_failures_total = CounterVec::new(
            opts!(
                "agent_snapshot_failures_total",
                "Failed snapshots by failing provider query"
            ),
            &["query"],
        )?;
        let agent_network_degraded_total = Counter::with_opts(opts!(
            "agent_network_degraded_total",
            "Snapshots served with an empty network map"
        ))?;
        let agent_snapshot_duration_seconds = Gauge::with_opts(opts!(
            "agent_snapshot_duration_seconds",
            "Wall time of the last successful snapshot"
        ))?;
        let agent_last_snapshot_timestamp_seconds = Gauge::with_opts(opts!(
            "agent_last_snapshot_timestamp_seconds",
            "Capture time of the last successful snapshot"
        ))?;
        let agent_net_iface_count = Gauge::with_opts(opts!(
            "agent_net_iface_count",
            "Interfaces reported in the last successful snapshot"
        ))?;
        let agent_uptime_seconds =
            Gauge::with_opts(opts!("agent_uptime_seconds", "Agent uptime in seconds"))?;

        register(&registry, &agent_snapshot_requests_total)?;
        register(&registry, &agent_snapshot_failures_total)?;
        register(&registry, &agent_network_degraded_total)?;
        register(&registry, &agent_snapshot_duration_seconds)?;
        register(&registry, &agent_last_snapshot_timestamp_seconds)?;
        register(&registry, &agent_net_iface_count)?;
        register(&registry, &agent_uptime_seconds)?;

        Ok(Arc::new(Self {
            registry,
            started_at_unix: now_unix(),
            agent_snapshot_requests_total,
            agent_snapshot_failures_total,
            agent_network_degraded_total,
            agent_snapshot_duration_seconds,
            agent_last_snapshot_timestamp_seconds,
            agent_net_iface_count,
            agent_uptime_seconds,
        }))
    }

    pub fn inc_request(&self) {
        self.agent_snapshot_requests_total.inc();
    }

    pub fn observe_snapshot(&self, collected: &Collected) {
        self.agent_snapshot_duration_seconds
            .set(collected.elapsed.as_secs_f64());
        self.agent_last_snapshot_timestamp_seconds
            .set(collected.metrics.timestamp as f64);
        self.agent_net_iface_count
            .set(collected.metrics.network.len() as f64);
        if collected.network_degraded {
            self.agent_network_degraded_total.inc();
        }
    }

    pub fn inc_failure(&self, query: &str) {
        self.agent_snapshot_failures_total
            .with_label_values(&[query])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let uptime = now_unix().saturating_sub(self.started_at_unix) as f64;
        self.agent_uptime_seconds.set(uptime);

        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
