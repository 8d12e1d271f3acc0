//! DNS Shield Statistics
//!
//! Lock-free counters bumped from the packet hook and the aggregator, plus a
//! serializable snapshot for the CLI and reporting surface.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shield counters
#[derive(Debug, Default)]
pub struct ShieldStats {
    packets_inspected: AtomicU64,
    non_dns_accepted: AtomicU64,
    malformed_dropped: AtomicU64,
    responses_passed: AtomicU64,
    queries_accepted: AtomicU64,
    queries_truncated: AtomicU64,
    replies_sent: AtomicU64,
    reply_failures: AtomicU64,
    epochs_run: AtomicU64,
    epochs_failed: AtomicU64,
    promotions: AtomicU64,
    demotions: AtomicU64,
}

/// Point-in-time copy of [`ShieldStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub packets_inspected: u64,
    pub non_dns_accepted: u64,
    pub malformed_dropped: u64,
    pub responses_passed: u64,
    pub queries_accepted: u64,
    pub queries_truncated: u64,
    pub replies_sent: u64,
    pub reply_failures: u64,
    pub epochs_run: u64,
    pub epochs_failed: u64,
    pub promotions: u64,
    pub demotions: u64,
}

impl StatsSnapshot {
    /// Share of inspected packets that were dropped, in percent
    pub fn drop_rate(&self) -> f64 {
        if self.packets_inspected == 0 {
            0.0
        } else {
            let dropped = self.malformed_dropped + self.queries_truncated;
            (dropped as f64 / self.packets_inspected as f64) * 100.0
        }
    }
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl ShieldStats {
    pub fn new() -> Self {
        Self::default()
    }

    bump! {
        record_packet => packets_inspected,
        record_non_dns => non_dns_accepted,
        record_malformed => malformed_dropped,
        record_response => responses_passed,
        record_query_accepted => queries_accepted,
        record_query_truncated => queries_truncated,
        record_reply_sent => replies_sent,
        record_reply_failure => reply_failures,
        record_epoch => epochs_run,
        record_epoch_failure => epochs_failed,
    }

    pub fn record_promotions(&self, count: u64) {
        self.promotions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_demotions(&self, count: u64) {
        self.demotions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_inspected: self.packets_inspected.load(Ordering::Relaxed),
            non_dns_accepted: self.non_dns_accepted.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            responses_passed: self.responses_passed.load(Ordering::Relaxed),
            queries_accepted: self.queries_accepted.load(Ordering::Relaxed),
            queries_truncated: self.queries_truncated.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            reply_failures: self.reply_failures.load(Ordering::Relaxed),
            epochs_run: self.epochs_run.load(Ordering::Relaxed),
            epochs_failed: self.epochs_failed.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = ShieldStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(stats.snapshot().drop_rate(), 0.0);
    }

    #[test]
    fn test_drop_rate() {
        let stats = ShieldStats::new();
        for _ in 0..4 {
            stats.record_packet();
        }
        stats.record_malformed();
        stats.record_query_truncated();
        stats.record_promotions(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.drop_rate(), 50.0);
        assert_eq!(snapshot.promotions, 3);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = ShieldStats::new();
        stats.record_reply_sent();

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["replies_sent"], 1);
    }
}
