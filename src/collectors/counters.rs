use crate::collectors::{InterfaceCounters, MetricsProvider, ProviderError};
use std::time::Instant;

/// Interface counters read in a single OS call, tagged with when the call
/// returned. Two of these plus the interval between them give a rate.
#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    pub captured_at: Instant,
    pub interfaces: Vec<InterfaceCounters>,
}

impl CounterSnapshot {
    pub fn new(interfaces: Vec<InterfaceCounters>) -> Self {
        Self::at(Instant::now(), interfaces)
    }

    pub fn at(captured_at: Instant, interfaces: Vec<InterfaceCounters>) -> Self {
        Self {
            captured_at,
            interfaces,
        }
    }

    /// Seconds between `earlier` and this snapshot, zero if the order is reversed.
    pub fn seconds_since(&self, earlier: &CounterSnapshot) -> f64 {
        self.captured_at
            .saturating_duration_since(earlier.captured_at)
            .as_secs_f64()
    }

    /// First entry with this exact name; later duplicates are ignored.
    pub fn find(&self, name: &str) -> Option<&InterfaceCounters> {
        self.interfaces.iter().find(|c| c.name == name)
    }
}

pub fn sample(provider: &dyn MetricsProvider) -> Result<CounterSnapshot, ProviderError> {
    let interfaces = provider.network_counters()?;
    Ok(CounterSnapshot::new(interfaces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::fake::FakeProvider;
    use crate::collectors::Query;
    use std::time::Duration;

    fn iface(name: &str, bytes_sent: u64) -> InterfaceCounters {
        InterfaceCounters {
            name: name.to_string(),
            bytes_sent,
            ..InterfaceCounters::default()
        }
    }

    #[test]
    fn sample_returns_provider_counters() {
        let provider = FakeProvider::new().with_counters(vec![vec![iface("eth0", 10)]]);
        let snapshot = sample(&provider).expect("выборка счётчиков");
        assert_eq!(snapshot.interfaces, vec![iface("eth0", 10)]);
    }

    #[test]
    fn sample_propagates_provider_failure() {
        let provider = FakeProvider::new().failing(Query::NetworkCounters);
        let err = sample(&provider).expect_err("ожидалась ошибка");
        assert_eq!(err.source_label(), "network_counters");
    }

    #[test]
    fn find_prefers_first_duplicate() {
        let snapshot = CounterSnapshot::new(vec![iface("eth0", 1), iface("eth0", 2)]);
        assert_eq!(snapshot.find("eth0").map(|c| c.bytes_sent), Some(1));
        assert!(snapshot.find("wlan0").is_none());
    }

    #[test]
    fn seconds_since_never_negative() {
        let base = Instant::now();
        let first = CounterSnapshot::at(base, Vec::new());
        let second = CounterSnapshot::at(base + Duration::from_millis(1500), Vec::new());
        assert_eq!(second.seconds_since(&first), 1.5);
        assert_eq!(first.seconds_since(&second), 0.0);
    }
}
