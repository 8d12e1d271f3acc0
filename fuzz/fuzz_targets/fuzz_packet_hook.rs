//! Fuzz target for the packet hook
//!
//! Feeds arbitrary bytes (and well-formed UDP/53 wrappers around arbitrary
//! DNS payloads) through the hook with the source both blocked and not.
//! Any panic, or a reply that is not exactly one TC=1 header, is a bug.
//!
//! Run with: cargo +nightly fuzz run fuzz_packet_hook

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use aegis_dns_shield::blocklist::Blocklist;
use aegis_dns_shield::error::Result;
use aegis_dns_shield::hook::PacketHook;
use aegis_dns_shield::host::Verdict;
use aegis_dns_shield::ledger::RateLedger;
use aegis_dns_shield::packet::{build_ipv4_udp, InboundPacket};
use aegis_dns_shield::reply::{OutboundPacket, ReplySender, TruncatedReplyBuilder, REPLY_LEN};
use aegis_dns_shield::stats::ShieldStats;

#[derive(Default)]
struct Capture(Mutex<Vec<OutboundPacket>>);

impl ReplySender for Capture {
    fn send(&self, packet: OutboundPacket) -> Result<()> {
        if let Ok(mut sent) = self.0.lock() {
            sent.push(packet);
        }
        Ok(())
    }
}

#[derive(Debug, Arbitrary)]
struct Input {
    source: u32,
    source_port: u16,
    block_source: bool,
    wrap_in_udp: bool,
    bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let capture = Arc::new(Capture::default());
    let blocklist = Arc::new(Blocklist::new(16));
    let source = Ipv4Addr::from(input.source);
    if input.block_source {
        let _ = blocklist.upsert(source, 11);
    }

    let hook = PacketHook::new(
        Arc::new(RateLedger::new(16, 16, false)),
        blocklist,
        capture.clone(),
        Arc::new(ShieldStats::new()),
        TruncatedReplyBuilder::default(),
        53,
    );

    let bytes = if input.wrap_in_udp {
        build_ipv4_udp(source, Ipv4Addr::new(192, 0, 2, 53), input.source_port, 53, &input.bytes)
    } else {
        input.bytes
    };

    let verdict = hook.inspect(&InboundPacket::new(bytes));

    let sent = capture.0.lock().map(|sent| sent.clone()).unwrap_or_default();
    assert!(sent.len() <= 1);
    for reply in &sent {
        assert_eq!(verdict, Verdict::Drop);
        assert_eq!(reply.bytes.len(), REPLY_LEN);
        assert_eq!(reply.dns_header()[2] & 0x82, 0x82);
    }
});
