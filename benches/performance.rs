//! Performance Benchmarks for the AEGIS DNS Shield
//!
//! Run with: cargo bench
//! Generate HTML report: cargo criterion
//!
//! Everything here runs on the packet hot path:
//! - Header classification: < 10ns
//! - Ledger record: < 50ns
//! - Blocklist lookup: < 100ns at 10k entries
//! - Full hook inspection: < 1μs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::net::Ipv4Addr;
use std::sync::Arc;

use aegis_dns_shield::blocklist::Blocklist;
use aegis_dns_shield::classifier::classify;
use aegis_dns_shield::hook::PacketHook;
use aegis_dns_shield::ledger::RateLedger;
use aegis_dns_shield::packet::{build_ipv4_udp, InboundPacket};
use aegis_dns_shield::reply::{build_truncated_reply, QueueReplySender, ReplySender, TruncatedReplyBuilder};
use aegis_dns_shield::simulate::query_payload;
use aegis_dns_shield::stats::ShieldStats;

const RESOLVER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

// =============================================================================
// CLASSIFIER BENCHMARKS
// =============================================================================

fn bench_classifier(c: &mut Criterion) {
    let mut group = c.benchmark_group("Classifier");
    group.throughput(Throughput::Elements(1));

    let query = query_payload(0x1234);
    let mut response = query.clone();
    response[2] |= 0x80;

    group.bench_function("query", |b| b.iter(|| classify(black_box(&query))));
    group.bench_function("response", |b| b.iter(|| classify(black_box(&response))));
    group.bench_function("short", |b| b.iter(|| classify(black_box(&query[..5]))));

    group.finish();
}

// =============================================================================
// RATE LEDGER BENCHMARKS
// =============================================================================

fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("RateLedger");

    let ledger = RateLedger::new(16, 65_536, false);
    let source = Ipv4Addr::new(10, 0, 0, 5);

    group.throughput(Throughput::Elements(1));
    group.bench_function("record", |b| b.iter(|| ledger.record(black_box(source))));

    for window in [16usize, 256, 4096] {
        let ledger = RateLedger::new(window, 65_536, false);
        for i in 0..window as u32 {
            ledger.record(Ipv4Addr::from(0x0a00_0000 + (i % 64)));
        }

        group.bench_with_input(BenchmarkId::new("drain", window), &ledger, |b, ledger| {
            b.iter(|| ledger.drain_and_reset())
        });
    }

    group.finish();
}

// =============================================================================
// BLOCKLIST BENCHMARKS
// =============================================================================

fn bench_blocklist(c: &mut Criterion) {
    let mut group = c.benchmark_group("Blocklist");
    group.throughput(Throughput::Elements(1));

    for size in [16u32, 1_000, 10_000] {
        let blocklist = Blocklist::new(65_536);
        for i in 0..size {
            blocklist.upsert(Ipv4Addr::from(0x0a00_0000 + i), 11).unwrap();
        }

        let present = Ipv4Addr::from(0x0a00_0000 + size / 2);
        let absent = Ipv4Addr::new(172, 16, 0, 1);

        group.bench_with_input(BenchmarkId::new("contains_hit", size), &blocklist, |b, list| {
            b.iter(|| list.contains(black_box(present)))
        });
        group.bench_with_input(BenchmarkId::new("contains_miss", size), &blocklist, |b, list| {
            b.iter(|| list.contains(black_box(absent)))
        });
    }

    group.finish();
}

// =============================================================================
// REPLY SYNTHESIS BENCHMARKS
// =============================================================================

fn bench_reply(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reply");
    group.throughput(Throughput::Elements(1));

    let header = [0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
    let client = Ipv4Addr::new(10, 0, 0, 5);

    group.bench_function("build_truncated_reply", |b| {
        b.iter(|| build_truncated_reply(black_box(&header), client, 40000, RESOLVER))
    });

    group.finish();
}

// =============================================================================
// PACKET HOOK BENCHMARKS
// =============================================================================

fn bench_hook(c: &mut Criterion) {
    let mut group = c.benchmark_group("PacketHook");
    group.throughput(Throughput::Elements(1));

    let ledger = Arc::new(RateLedger::new(16, 65_536, false));
    let blocklist = Arc::new(Blocklist::new(65_536));
    // Replies are dropped on the floor once the queue fills; the hook only
    // sees a send failure, which is still the hot path under attack
    let (sender, _rx) = QueueReplySender::new(1024);
    let sender: Arc<dyn ReplySender> = Arc::new(sender);
    let hook = PacketHook::new(
        ledger,
        Arc::clone(&blocklist),
        sender,
        Arc::new(ShieldStats::new()),
        TruncatedReplyBuilder::default(),
        53,
    );

    let clean = Ipv4Addr::new(10, 0, 0, 1);
    let blocked = Ipv4Addr::new(10, 0, 0, 2);
    blocklist.upsert(blocked, 50).unwrap();

    let payload = query_payload(0x1234);
    let clean_query = InboundPacket::new(build_ipv4_udp(clean, RESOLVER, 40000, 53, &payload));
    let blocked_query = InboundPacket::new(build_ipv4_udp(blocked, RESOLVER, 40000, 53, &payload));
    let other_port = InboundPacket::new(build_ipv4_udp(clean, RESOLVER, 40000, 443, &payload));

    group.bench_function("accept_query", |b| {
        b.iter(|| hook.inspect(black_box(&clean_query)))
    });
    group.bench_function("truncate_query", |b| {
        b.iter(|| hook.inspect(black_box(&blocked_query)))
    });
    group.bench_function("foreign_port", |b| {
        b.iter(|| hook.inspect(black_box(&other_port)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_classifier,
    bench_ledger,
    bench_blocklist,
    bench_reply,
    bench_hook,
);
criterion_main!(benches);
