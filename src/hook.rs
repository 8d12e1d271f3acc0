//! Packet Hook
//!
//! Hot-path entry point. Per packet:
//!
//! ```text
//! not IPv4/UDP to the DNS port ........ ACCEPT
//! payload shorter than a DNS header ... DROP
//! DNS response ........................ ACCEPT
//! DNS query: record source, then
//!   source not blocked ................ ACCEPT
//!   source blocked .................... send TC=1 reply, DROP
//! ```
//!
//! The hook holds no lock across the reply send and never blocks.

use std::sync::Arc;
use tracing::debug;

use crate::blocklist::Blocklist;
use crate::classifier::{classify, header_prefix, DnsHeaderKind};
use crate::error::{Result, ShieldError};
use crate::host::{PacketCallback, Verdict};
use crate::ledger::RateLedger;
use crate::packet::{InboundPacket, Ipv4UdpView};
use crate::reply::{ReplySender, TruncatedReplyBuilder};
use crate::stats::ShieldStats;

pub struct PacketHook {
    ledger: Arc<RateLedger>,
    blocklist: Arc<Blocklist>,
    sender: Arc<dyn ReplySender>,
    stats: Arc<ShieldStats>,
    replies: TruncatedReplyBuilder,
    dns_port: u16,
}

impl PacketHook {
    pub fn new(
        ledger: Arc<RateLedger>,
        blocklist: Arc<Blocklist>,
        sender: Arc<dyn ReplySender>,
        stats: Arc<ShieldStats>,
        replies: TruncatedReplyBuilder,
        dns_port: u16,
    ) -> Self {
        Self {
            ledger,
            blocklist,
            sender,
            stats,
            replies,
            dns_port,
        }
    }

    /// Decide the fate of one packet
    pub fn inspect(&self, packet: &InboundPacket) -> Verdict {
        self.stats.record_packet();

        let view = match Ipv4UdpView::parse(&packet.bytes) {
            Some(view) if view.destination_port == self.dns_port => view,
            _ => {
                self.stats.record_non_dns();
                return Verdict::Accept;
            }
        };

        match classify(view.payload) {
            DnsHeaderKind::Invalid => {
                // Not logged: under attack this would flood the log
                self.stats.record_malformed();
                return Verdict::Drop;
            }
            DnsHeaderKind::Response => {
                self.stats.record_response();
                return Verdict::Accept;
            }
            DnsHeaderKind::Query => {}
        }

        self.ledger.record(view.source);

        if !self.blocklist.contains(view.source) {
            self.stats.record_query_accepted();
            return Verdict::Accept;
        }

        match self.send_truncated(&view, packet) {
            Ok(()) => self.stats.record_reply_sent(),
            Err(e) => {
                self.stats.record_reply_failure();
                debug!(
                    "Truncated reply to {}:{} abandoned: {}",
                    view.source, view.source_port, e
                );
            }
        }

        self.stats.record_query_truncated();
        Verdict::Drop
    }

    fn send_truncated(&self, view: &Ipv4UdpView<'_>, packet: &InboundPacket) -> Result<()> {
        let header = header_prefix(view.payload)
            .ok_or(ShieldError::MalformedInput("short DNS header"))?;

        let mut reply = self
            .replies
            .build(&header, view.source, view.source_port, view.destination)?;
        reply.conntrack = packet.conntrack;

        self.sender.send(reply)
    }
}

impl PacketCallback for PacketHook {
    fn on_packet(&self, packet: &InboundPacket) -> Verdict {
        self.inspect(packet)
    }
}
