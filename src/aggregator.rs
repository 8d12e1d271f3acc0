//! Aggregator
//!
//! Once per epoch: drain the rate ledger into per-source counts, then
//! promote every source above the threshold into the blocklist and demote
//! every evaluated source at or below it. Sources absent from the window are
//! left alone, so a blocked source that goes quiet stays blocked until it is
//! seen again at a normal rate.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::blocklist::Blocklist;
use crate::error::{Result, ShieldError};
use crate::ledger::RateLedger;
use crate::lock_utils::lock_or_recover;
use crate::stats::ShieldStats;

/// Outcome of one aggregation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochSummary {
    /// Distinct sources evaluated
    pub sources: usize,
    /// Newly blocked sources
    pub promoted: usize,
    /// Already blocked sources whose strength was refreshed
    pub refreshed: usize,
    /// Sources removed from the blocklist
    pub demoted: usize,
}

pub struct Aggregator {
    ledger: Arc<RateLedger>,
    blocklist: Arc<Blocklist>,
    stats: Arc<ShieldStats>,
    threshold: u32,
    // Held for a whole epoch: one drain and one blocklist writer at a time
    epoch_guard: Mutex<()>,
}

impl Aggregator {
    pub fn new(
        ledger: Arc<RateLedger>,
        blocklist: Arc<Blocklist>,
        stats: Arc<ShieldStats>,
        threshold: u32,
    ) -> Self {
        Self {
            ledger,
            blocklist,
            stats,
            threshold,
            epoch_guard: Mutex::new(()),
        }
    }

    /// Evaluate one epoch.
    ///
    /// On error the blocklist is exactly as it was before the call. A call
    /// made while another epoch is in flight waits for it to finish.
    pub fn run_epoch(&self) -> Result<EpochSummary> {
        let _epoch = lock_or_recover(&self.epoch_guard, "aggregator epoch");

        match self.evaluate() {
            Ok(summary) => {
                self.stats.record_epoch();
                self.stats.record_promotions(summary.promoted as u64);
                self.stats.record_demotions(summary.demoted as u64);
                Ok(summary)
            }
            Err(e) => {
                self.stats.record_epoch_failure();
                Err(e)
            }
        }
    }

    fn evaluate(&self) -> Result<EpochSummary> {
        let counts = self.ledger.drain_and_reset()?;

        let mut promotions = Vec::new();
        let mut demotions = Vec::new();
        for (&source, &count) in &counts {
            if count > self.threshold {
                promotions.push((source, count));
            } else {
                demotions.push(source);
            }
        }

        // Check the whole plan against capacity before touching anything
        let added = promotions
            .iter()
            .filter(|(source, _)| !self.blocklist.contains(*source))
            .count();
        let freed = demotions
            .iter()
            .filter(|source| self.blocklist.contains(**source))
            .count();
        let projected = (self.blocklist.len() + added).saturating_sub(freed);
        if projected > self.blocklist.max_entries() {
            return Err(ShieldError::exhausted(
                "blocklist",
                self.blocklist.max_entries(),
            ));
        }

        let mut summary = EpochSummary {
            sources: counts.len(),
            ..Default::default()
        };

        for source in demotions {
            if self.blocklist.remove(source) {
                debug!("Source {} unblocked for DNS over UDP", source);
                summary.demoted += 1;
            }
        }

        for (source, count) in promotions {
            if self.blocklist.upsert(source, count)? {
                info!(
                    "Source {} blocked for DNS over UDP ({} queries in window, threshold {})",
                    source, count, self.threshold
                );
                summary.promoted += 1;
            } else {
                summary.refreshed += 1;
            }
        }

        Ok(summary)
    }
}

/// Running aggregation worker
pub struct AggregatorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AggregatorHandle {
    /// Ask the worker to exit after its current epoch, without waiting
    pub fn request_stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal the worker and wait for any in-flight epoch to finish
    pub async fn stop(self) -> Result<()> {
        self.request_stop();
        self.task
            .await
            .map_err(|e| ShieldError::Scheduling(format!("aggregator task failed: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the periodic worker on the current tokio runtime.
///
/// The first evaluation happens one full `epoch` after the call. A failed
/// epoch is logged and the next one runs on schedule.
pub fn spawn_worker(aggregator: Arc<Aggregator>, epoch: Duration) -> AggregatorHandle {
    let (shutdown, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(epoch);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match aggregator.run_epoch() {
                        Ok(summary) => {
                            if summary.promoted > 0 || summary.demoted > 0 {
                                debug!(
                                    "Epoch evaluated {} sources: {} blocked, {} unblocked",
                                    summary.sources, summary.promoted, summary.demoted
                                );
                            }
                        }
                        Err(e) => {
                            error!("DNS shield epoch failed, retrying next epoch: {}", e);
                        }
                    }
                }
            }
        }

        debug!("DNS shield aggregator stopped");
    });

    AggregatorHandle { shutdown, task }
}
