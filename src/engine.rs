//! Shield lifecycle
//!
//! Owns the ledger, blocklist and statistics for one deployment, wires the
//! packet hook into the host and runs the aggregation worker. Start-up order
//! is structures, hook, worker; shutdown is hook, worker, structures, so the
//! hook never observes torn-down state.

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::aggregator::{spawn_worker, Aggregator, AggregatorHandle, EpochSummary};
use crate::blocklist::Blocklist;
use crate::config::ShieldConfig;
use crate::error::{Result, ShieldError};
use crate::hook::PacketHook;
use crate::host::{HookHandle, HookRegistration, PacketHost};
use crate::ledger::RateLedger;
use crate::reply::{ReplySender, TruncatedReplyBuilder};
use crate::report::BlocklistReport;
use crate::stats::{ShieldStats, StatsSnapshot};

pub struct Shield {
    config: ShieldConfig,
    host: Arc<dyn PacketHost>,
    hook_handle: Option<HookHandle>,
    ledger: Arc<RateLedger>,
    blocklist: Arc<Blocklist>,
    stats: Arc<ShieldStats>,
    aggregator: Arc<Aggregator>,
    worker: Option<AggregatorHandle>,
}

impl Shield {
    /// Validate `config`, register the hook with `host` and start the
    /// aggregation worker. Must be called from within a tokio runtime.
    pub fn start(
        config: ShieldConfig,
        host: Arc<dyn PacketHost>,
        sender: Arc<dyn ReplySender>,
    ) -> Result<Self> {
        config.validate()?;

        if Handle::try_current().is_err() {
            return Err(ShieldError::Scheduling(
                "DNS shield must be started inside a tokio runtime".to_string(),
            ));
        }

        let ledger = Arc::new(RateLedger::new(
            config.window_size,
            config.max_ledger_entries,
            config.clear_window_on_drain,
        ));
        let blocklist = Arc::new(Blocklist::new(config.max_blocklist_entries));
        let stats = Arc::new(ShieldStats::new());

        let hook = Arc::new(PacketHook::new(
            Arc::clone(&ledger),
            Arc::clone(&blocklist),
            sender,
            Arc::clone(&stats),
            TruncatedReplyBuilder::new(config.reply_ttl, config.dns_port),
            config.dns_port,
        ));
        let hook_handle = host.register(HookRegistration::local_in_first(), hook)?;

        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&ledger),
            Arc::clone(&blocklist),
            Arc::clone(&stats),
            config.threshold,
        ));
        let worker = spawn_worker(Arc::clone(&aggregator), config.epoch());

        info!(
            "DNS shield started (window: {} samples, threshold: {}/epoch, epoch: {}ms, port: {})",
            config.window_size, config.threshold, config.epoch_ms, config.dns_port
        );

        Ok(Self {
            config,
            host,
            hook_handle: Some(hook_handle),
            ledger,
            blocklist,
            stats,
            aggregator,
            worker: Some(worker),
        })
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn blocklist(&self) -> &Arc<Blocklist> {
        &self.blocklist
    }

    pub fn ledger(&self) -> &Arc<RateLedger> {
        &self.ledger
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn report(&self) -> BlocklistReport {
        BlocklistReport::capture(&self.blocklist)
    }

    /// Evaluate an epoch immediately, outside the worker's schedule
    pub fn run_epoch_now(&self) -> Result<EpochSummary> {
        self.aggregator.run_epoch()
    }

    /// Deregister the hook, stop the worker and release all state
    pub async fn stop(mut self) -> Result<()> {
        let deregistered = match self.hook_handle.take() {
            Some(handle) => self.host.deregister(handle),
            None => Ok(()),
        };

        if let Some(worker) = self.worker.take() {
            worker.stop().await?;
        }

        self.ledger.reset();
        let released = self.blocklist.clear_all();
        info!("DNS shield stopped ({} blocked sources released)", released);

        deregistered
    }
}

impl Drop for Shield {
    fn drop(&mut self) {
        // Only reached when `stop` was not awaited
        if let Some(handle) = self.hook_handle.take() {
            if let Err(e) = self.host.deregister(handle) {
                warn!("Failed to deregister DNS shield hook on drop: {}", e);
            }
        }
        if let Some(worker) = self.worker.take() {
            worker.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use crate::reply::QueueReplySender;

    fn sender() -> Arc<dyn ReplySender> {
        // None of these tests trigger a reply, the receiver can go
        let (sender, _rx) = QueueReplySender::new(8);
        Arc::new(sender)
    }

    #[tokio::test]
    async fn test_start_registers_and_stop_deregisters() {
        let host = Arc::new(InMemoryHost::new());
        let shield = Shield::start(ShieldConfig::default(), host.clone(), sender()).unwrap();
        assert_eq!(host.hook_count(), 1);

        shield.blocklist().upsert("10.0.0.5".parse().unwrap(), 11).unwrap();
        let blocklist = Arc::clone(shield.blocklist());

        shield.stop().await.unwrap();
        assert_eq!(host.hook_count(), 0);
        assert!(blocklist.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let host = Arc::new(InMemoryHost::new());
        let config = ShieldConfig {
            window_size: 0,
            ..Default::default()
        };

        assert!(Shield::start(config, host.clone(), sender()).is_err());
        assert_eq!(host.hook_count(), 0);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let host = Arc::new(InMemoryHost::new());
        let err = Shield::start(ShieldConfig::default(), host, sender()).err().unwrap();
        assert!(matches!(err, ShieldError::Scheduling(_)));
    }

    #[tokio::test]
    async fn test_drop_without_stop_deregisters() {
        let host = Arc::new(InMemoryHost::new());
        {
            let _shield = Shield::start(ShieldConfig::default(), host.clone(), sender()).unwrap();
            assert_eq!(host.hook_count(), 1);
        }
        assert_eq!(host.hook_count(), 0);
    }
}
