// Library interface for the AEGIS DNS shield
// Inline per-source accounting of UDP DNS queries with TC=1 fallback to TCP

pub mod aggregator;
pub mod blocklist;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod hook;
pub mod host;
pub mod ledger;
pub mod lock_utils;
pub mod packet;
pub mod reply;
pub mod report;
pub mod simulate;
pub mod stats;

pub use blocklist::Blocklist;
pub use classifier::{classify, DnsHeaderKind};
pub use config::ShieldConfig;
pub use engine::Shield;
pub use error::{Result, ShieldError};
pub use host::{InMemoryHost, PacketHost, Verdict};
pub use ledger::RateLedger;
pub use reply::{build_truncated_reply, QueueReplySender, ReplySender};
