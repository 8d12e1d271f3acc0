//! Synthetic flood driver
//!
//! Pushes a mix of attacker and legitimate DNS queries through an
//! [`InMemoryHost`] with a live [`Shield`] attached, one batch per epoch, and
//! collects what the shield did about it.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::classifier::{FLAGS_OFFSET, TC_BIT};
use crate::config::ShieldConfig;
use crate::engine::Shield;
use crate::error::{Result, ShieldError};
use crate::host::{InMemoryHost, Verdict};
use crate::packet::{build_ipv4_udp, InboundPacket};
use crate::reply::{OutboundPacket, QueueReplySender, ReplySender};
use crate::report::BlocklistReport;
use crate::stats::StatsSnapshot;

/// Traffic mix for one simulation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodScenario {
    /// Flooding sources, taken from 203.0.113.0/24
    pub attackers: u8,
    pub attacker_queries_per_epoch: u32,
    /// Well-behaved sources, taken from 198.51.100.0/24
    pub clients: u8,
    pub client_queries_per_epoch: u32,
    pub epochs: u32,
    /// Address the queries are sent to
    pub resolver: Ipv4Addr,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// Sleep one epoch between batches instead of evaluating immediately
    pub realtime: bool,
}

impl Default for FloodScenario {
    fn default() -> Self {
        Self {
            attackers: 1,
            attacker_queries_per_epoch: 200,
            clients: 10,
            client_queries_per_epoch: 1,
            epochs: 5,
            resolver: Ipv4Addr::new(192, 0, 2, 53),
            seed: None,
            realtime: true,
        }
    }
}

impl FloodScenario {
    pub fn attacker(&self, index: u8) -> Ipv4Addr {
        Ipv4Addr::new(203, 0, 113, index.saturating_add(1))
    }

    pub fn client(&self, index: u8) -> Ipv4Addr {
        Ipv4Addr::new(198, 51, 100, index.saturating_add(1))
    }

    fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(ShieldError::Config("epochs must be > 0".to_string()));
        }
        if self.attackers == u8::MAX || self.clients == u8::MAX {
            return Err(ShieldError::Config(
                "at most 254 attackers and 254 clients".to_string(),
            ));
        }
        Ok(())
    }

    /// One epoch's worth of queries in random arrival order
    fn batch(&self, dns_port: u16, rng: &mut StdRng) -> Vec<InboundPacket> {
        let mut packets = Vec::new();

        for index in 0..self.attackers {
            for _ in 0..self.attacker_queries_per_epoch {
                packets.push(self.query(self.attacker(index), dns_port, rng));
            }
        }
        for index in 0..self.clients {
            for _ in 0..self.client_queries_per_epoch {
                packets.push(self.query(self.client(index), dns_port, rng));
            }
        }

        packets.shuffle(rng);
        packets
    }

    fn query(&self, source: Ipv4Addr, dns_port: u16, rng: &mut StdRng) -> InboundPacket {
        let id: u16 = rng.gen();
        let source_port: u16 = rng.gen_range(1024..=u16::MAX);
        InboundPacket::new(build_ipv4_udp(
            source,
            self.resolver,
            source_port,
            dns_port,
            &query_payload(id),
        ))
    }
}

/// A standard recursive A query for example.com
pub fn query_payload(id: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(29);
    payload.extend_from_slice(&id.to_be_bytes());
    payload.extend_from_slice(&[0x01, 0x00]); // RD
    payload.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    payload.extend_from_slice(b"\x07example\x03com\x00");
    payload.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    payload
}

/// What a simulation run observed
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    pub stats: StatsSnapshot,
    pub report: BlocklistReport,
    /// Truncated replies that reached the transmit task
    pub replies_transmitted: u64,
    pub epochs_completed: u32,
    /// Queries the host let through, per epoch
    pub accepted_per_epoch: Vec<u64>,
}

/// Drive `scenario` through a fresh shield configured with `config`.
pub async fn run_scenario(config: ShieldConfig, scenario: &FloodScenario) -> Result<SimulationOutcome> {
    scenario.validate()?;

    let host = Arc::new(InMemoryHost::new());
    let (sender, rx) = QueueReplySender::new(config.reply_queue_depth);
    let transmitter = spawn_transmitter(rx);

    let dns_port = config.dns_port;
    let epoch = config.epoch();
    let sender: Arc<dyn ReplySender> = Arc::new(sender);
    let shield = Shield::start(config, host.clone(), sender)?;

    let mut rng = match scenario.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut accepted_per_epoch = Vec::with_capacity(scenario.epochs as usize);
    for epoch_index in 0..scenario.epochs {
        let batch = scenario.batch(dns_port, &mut rng);
        let accepted = batch
            .iter()
            .filter(|packet| host.deliver(packet) == Verdict::Accept)
            .count() as u64;
        accepted_per_epoch.push(accepted);

        if scenario.realtime {
            tokio::time::sleep(epoch).await;
        } else {
            shield.run_epoch_now()?;
            // Let the transmit task drain the queue between batches
            tokio::task::yield_now().await;
        }

        debug!(
            "Epoch {}: {} of {} queries accepted, {} sources blocked",
            epoch_index + 1,
            accepted,
            batch.len(),
            shield.blocklist().len()
        );
    }

    let report = shield.report();
    let stats = shield.stats();
    shield.stop().await?;

    let replies_transmitted = transmitter
        .await
        .map_err(|e| ShieldError::Scheduling(format!("transmit task failed: {}", e)))?;

    info!(
        "Simulation finished: {} epochs, {} sources blocked, {} truncated replies",
        scenario.epochs,
        report.len(),
        replies_transmitted
    );

    Ok(SimulationOutcome {
        stats,
        report,
        replies_transmitted,
        epochs_completed: scenario.epochs,
        accepted_per_epoch,
    })
}

/// Stand-in for the real transmit path: counts truncated replies until
/// every sender is gone.
fn spawn_transmitter(mut rx: mpsc::Receiver<OutboundPacket>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut transmitted = 0u64;
        while let Some(reply) = rx.recv().await {
            if reply.dns_header()[FLAGS_OFFSET] & TC_BIT != 0 {
                transmitted += 1;
            }
        }
        transmitted
    })
}
