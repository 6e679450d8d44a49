//! Benchmarks for inbound frame handling

use bbo_relay::cache::{BboCache, BboSnapshot};
use bbo_relay::parser::InboundFrame;
use bbo_relay::websocket::handle_frame;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use std::str::FromStr;

const BBO_FRAME: &str = r#"{"topic":"bbo","data":{"s":"ETHUSDT","b":"3000.5","bz":"1.2","a":"3001.0","az":"0.8","t":1700000000000}}"#;
const PONG_FRAME: &str = r#"{"pong":1700000000000}"#;

fn create_snapshot(symbol: &str, i: u64) -> BboSnapshot {
    BboSnapshot {
        symbol: symbol.to_string(),
        bid_price: Decimal::from(3000 + i),
        bid_quantity: Decimal::from_str("1.2").unwrap(),
        ask_price: Decimal::from(3001 + i),
        ask_quantity: Decimal::from_str("0.8").unwrap(),
        timestamp: 1_700_000_000_000 + i,
    }
}

fn benchmark_parse(c: &mut Criterion) {
    c.bench_function("parse_bbo_frame", |b| {
        b.iter(|| {
            black_box(InboundFrame::parse(black_box(BBO_FRAME)).unwrap());
        })
    });

    c.bench_function("parse_pong_frame", |b| {
        b.iter(|| {
            black_box(InboundFrame::parse(black_box(PONG_FRAME)).unwrap());
        })
    });
}

fn benchmark_cache(c: &mut Criterion) {
    let cache = BboCache::new();
    let symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"];
    for (i, symbol) in symbols.iter().enumerate() {
        cache.update(create_snapshot(symbol, i as u64));
    }

    let snapshot = create_snapshot("ETHUSDT", 42);
    c.bench_function("cache_update", |b| {
        b.iter(|| {
            cache.update(black_box(snapshot.clone()));
        })
    });

    c.bench_function("cache_get_all", |b| {
        b.iter(|| {
            black_box(cache.get_all());
        })
    });

    c.bench_function("handle_frame", |b| {
        b.iter(|| {
            black_box(handle_frame(&cache, black_box(BBO_FRAME)).unwrap());
        })
    });
}

criterion_group!(benches, benchmark_parse, benchmark_cache);
criterion_main!(benches);
