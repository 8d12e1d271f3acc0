//! Reply Synthesizer
//!
//! Builds the minimal IPv4/UDP/DNS answer that tells a blocked client to
//! retry over TCP: the query's own 12-byte header with QR and TC set, sent
//! from the resolver's address and port so it matches the client's pending
//! transaction.

use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::classifier::{DNS_HEADER_SIZE, FLAGS_OFFSET, QR_BIT, TC_BIT};
use crate::config::DNS_PORT;
use crate::error::{Result, ShieldError};
use crate::packet::{ipv4_header_checksum, ConnTrackTag, IPPROTO_UDP, IPV4_HEADER_LEN, UDP_HEADER_LEN};

/// Length of every synthetic reply on the wire
pub const REPLY_LEN: usize = IPV4_HEADER_LEN + UDP_HEADER_LEN + DNS_HEADER_SIZE;

/// Default TTL of synthetic replies
pub const DEFAULT_REPLY_TTL: u8 = 64;

/// A fully built packet waiting for the outbound path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    /// Raw bytes starting at the IPv4 header
    pub bytes: Vec<u8>,
    /// Client the reply is routed to
    pub destination: SocketAddrV4,
    /// Connection-tracking context of the query being answered
    pub conntrack: Option<ConnTrackTag>,
}

impl OutboundPacket {
    /// The DNS header carried by the reply
    pub fn dns_header(&self) -> &[u8] {
        &self.bytes[IPV4_HEADER_LEN + UDP_HEADER_LEN..]
    }
}

/// Builder for truncated (TC=1) replies
#[derive(Debug, Clone, Copy)]
pub struct TruncatedReplyBuilder {
    ttl: u8,
    source_port: u16,
}

impl Default for TruncatedReplyBuilder {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_REPLY_TTL,
            source_port: DNS_PORT,
        }
    }
}

impl TruncatedReplyBuilder {
    pub fn new(ttl: u8, source_port: u16) -> Self {
        Self { ttl, source_port }
    }

    /// Build a reply to a query sent from `client:client_port` to `resolver`.
    pub fn build(
        &self,
        query_header: &[u8; DNS_HEADER_SIZE],
        client: Ipv4Addr,
        client_port: u16,
        resolver: Ipv4Addr,
    ) -> Result<OutboundPacket> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(REPLY_LEN)
            .map_err(|_| ShieldError::exhausted("reply buffer", REPLY_LEN))?;

        // IPv4
        bytes.push(0x45); // version 4, IHL 5
        bytes.push(0x00); // TOS
        bytes.extend_from_slice(&(REPLY_LEN as u16).to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]); // identification
        bytes.extend_from_slice(&[0x00, 0x00]); // flags + fragment offset
        bytes.push(self.ttl);
        bytes.push(IPPROTO_UDP);
        bytes.extend_from_slice(&[0x00, 0x00]); // checksum, filled below
        bytes.extend_from_slice(&resolver.octets());
        bytes.extend_from_slice(&client.octets());
        let checksum = ipv4_header_checksum(&bytes[..IPV4_HEADER_LEN]);
        bytes[10..12].copy_from_slice(&checksum.to_be_bytes());

        // UDP (checksum left at 0, optional over IPv4)
        bytes.extend_from_slice(&self.source_port.to_be_bytes());
        bytes.extend_from_slice(&client_port.to_be_bytes());
        bytes.extend_from_slice(&((UDP_HEADER_LEN + DNS_HEADER_SIZE) as u16).to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]);

        // DNS: the query header, answered and truncated
        let dns_start = bytes.len();
        bytes.extend_from_slice(query_header);
        bytes[dns_start + FLAGS_OFFSET] |= QR_BIT | TC_BIT;

        Ok(OutboundPacket {
            bytes,
            destination: SocketAddrV4::new(client, client_port),
            conntrack: None,
        })
    }
}

/// Build a truncated reply with the default TTL and port 53 as source.
pub fn build_truncated_reply(
    query_header: &[u8; DNS_HEADER_SIZE],
    source_addr: Ipv4Addr,
    source_port: u16,
    dest_addr: Ipv4Addr,
) -> Result<OutboundPacket> {
    TruncatedReplyBuilder::default().build(query_header, source_addr, source_port, dest_addr)
}

/// Outbound send path for synthetic replies.
///
/// Implementations own route re-resolution, attaching the connection-tracking
/// context and the actual transmission. `send` is called from the packet hook
/// and must not block.
pub trait ReplySender: Send + Sync {
    fn send(&self, packet: OutboundPacket) -> Result<()>;
}

/// Hands replies to a transmit task over a bounded channel
#[derive(Debug, Clone)]
pub struct QueueReplySender {
    tx: mpsc::Sender<OutboundPacket>,
    depth: usize,
}

impl QueueReplySender {
    /// Create the sender and the receiving end for the transmit task
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<OutboundPacket>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx, depth }, rx)
    }
}

impl ReplySender for QueueReplySender {
    fn send(&self, packet: OutboundPacket) -> Result<()> {
        self.tx.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => ShieldError::exhausted("reply queue", self.depth),
            TrySendError::Closed(packet) => {
                ShieldError::Routing(format!("no transmit path to {}", packet.destination))
            }
        })
    }
}
