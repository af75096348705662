use criterion::{Criterion, criterion_group, criterion_main};
use order_protocol::codec::Codec;
use order_protocol::context::ClientId;
use order_protocol::message::Message;
use order_protocol::orderbook::SecurityBook;
use order_protocol::orders::{Order, Priority, Side};
use std::hint::black_box;

fn setup_order_book(depth: i64, orders_per_level: u64) -> SecurityBook {
    let mut ob = SecurityBook::new(0, Priority::PriceTime);
    let mut ts = 0;
    //populate both sides, asks above bids
    for price in 1..=depth {
        for i in 0..orders_per_level {
            ts += 1;
            let id = (price as u64) * 1_000 + i;
            ob.rest(Order::limit(0, Side::Sell, depth + price, 1, ts).with_id(id), ClientId(1))
                .unwrap();
            ob.rest(Order::limit(0, Side::Buy, price, 1, ts).with_id(id + 500), ClientId(2))
                .unwrap();
        }
    }
    ob
}

fn bench_match_order(c: &mut Criterion) {
    let depth = 100;
    let orders_per_level = 10;

    c.bench_function("sweep half the asks with a market order", |b| {
        b.iter_batched(
            || setup_order_book(depth, orders_per_level),
            |mut ob| {
                let market_buy = Order::market(0, Side::Buy, depth as u64 * orders_per_level / 2, 0);
                ob.submit(market_buy, ClientId(3)).unwrap()
            },
            criterion::BatchSize::LargeInput,
        )
    });
}

fn bench_codec(c: &mut Criterion) {
    let codec = Codec::default();
    let trade = Message::Trade {
        order: Order::limit(3, Side::Sell, 1_000, 25, 42).with_id(7),
        matched_order_id: 8,
    };
    let frame = codec.encode_frame(&trade).unwrap();

    c.bench_function("encode trade frame", |b| {
        b.iter(|| codec.encode_frame(black_box(&trade)).unwrap())
    });
    c.bench_function("decode trade frame", |b| {
        b.iter(|| codec.decode_frame(black_box(&frame)).unwrap())
    });
}

criterion_group!(benches, bench_match_order, bench_codec);
criterion_main!(benches);
