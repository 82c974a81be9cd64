use crate::collectors::counters::CounterSnapshot;
use crate::model::{round2, NetworkStats};
use std::collections::BTreeMap;

const BITS_PER_MEGABIT: f64 = 1024.0 * 1024.0;

/// Converts a byte delta over `elapsed_secs` into Mbps (2^20 bits).
/// A counter that went backwards (reset, interface restart) counts as zero.
pub fn mbps(before: u64, after: u64, elapsed_secs: f64) -> f64 {
    if !elapsed_secs.is_finite() || elapsed_secs <= 0.0 {
        return 0.0;
    }
    let delta = after.saturating_sub(before);
    round2(delta as f64 * 8.0 / BITS_PER_MEGABIT / elapsed_secs)
}

/// Per-interface rates between two samples. Only interfaces present in both
/// samples are reported; absolute counters come from `second`.
pub fn estimate_rates(
    first: &CounterSnapshot,
    second: &CounterSnapshot,
    elapsed_secs: f64,
) -> BTreeMap<String, NetworkStats> {
    let mut out = BTreeMap::new();
    for end in &second.interfaces {
        if out.contains_key(&end.name) {
            continue;
        }
        let Some(start) = first.find(&end.name) else {
            continue;
        };

        out.insert(
            end.name.clone(),
            NetworkStats {
                sent_mbps: mbps(start.bytes_sent, end.bytes_sent, elapsed_secs),
                recv_mbps: mbps(start.bytes_recv, end.bytes_recv, elapsed_secs),
                bytes_sent: end.bytes_sent,
                bytes_recv: end.bytes_recv,
                packets_sent: end.packets_sent,
                packets_recv: end.packets_recv,
                errors: end.err_in.saturating_add(end.err_out),
                dropped: end.drop_in.saturating_add(end.drop_out),
            },
        );
    }
    out
}
