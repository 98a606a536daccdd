//! Multi-threaded stress: cross-instrument parallelism, contention on a
//! single instrument, and lock-free map publication under racing readers.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use matchbook::{Exchange, ExchangeListener, Order, OrderStatus, Px, Side, Trade};

fn px_int(units: i64) -> Px {
    Px::from_int(units)
}

/// Thread-safe event log keyed by order id.
#[derive(Default)]
struct EventLog {
    order_remaining: Mutex<HashMap<u64, Vec<i64>>>,
    trade_qty_total: Mutex<i64>,
}

impl ExchangeListener for EventLog {
    fn on_order(&self, order: &Order) {
        self.order_remaining
            .lock()
            .entry(order.exchange_id())
            .or_default()
            .push(order.remaining_quantity());
    }

    fn on_trade(&self, trade: &Trade) {
        assert!(trade.quantity > 0, "zero-quantity trade emitted");
        *self.trade_qty_total.lock() += trade.quantity;
    }
}

#[test]
fn distinct_instruments_progress_in_parallel() {
    let ex = Arc::new(Exchange::new());
    let instruments = ["AAA", "BBB", "CCC", "DDD"];

    let handles: Vec<_> = instruments
        .iter()
        .map(|&instrument| {
            let ex = Arc::clone(&ex);
            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(instrument.len() as u64);
                let mut ids = Vec::new();
                for _ in 0..2000 {
                    let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                    let id = ex
                        .submit_limit(
                            side,
                            "stress",
                            instrument,
                            px_int(rng.gen_range(90..110)),
                            rng.gen_range(1..20),
                            None,
                        )
                        .expect("submission accepted");
                    ids.push(id);
                }
                ids
            })
        })
        .collect();

    let all_ids: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every submitted id resolves, on the right instrument.
    for (ids, instrument) in all_ids.iter().zip(instruments) {
        for &id in ids {
            assert_eq!(ex.get_order(id).unwrap().instrument, instrument);
        }
    }
    // Ids are globally unique.
    let mut flat: Vec<u64> = all_ids.into_iter().flatten().collect();
    let n = flat.len();
    flat.sort_unstable();
    flat.dedup();
    assert_eq!(flat.len(), n);

    // Per-instrument books ended uncrossed.
    for instrument in instruments {
        let book = ex.book(instrument).unwrap();
        if let (Some(bid), Some(ask)) = (book.bids.first(), book.asks.first()) {
            assert!(bid.price < ask.price);
        }
    }
}

#[test]
fn same_instrument_history_is_consistent() {
    let log = Arc::new(EventLog::default());
    let ex = Arc::new(Exchange::with_listener(log.clone()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let ex = Arc::clone(&ex);
            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(t);
                let mut ids = Vec::new();
                for _ in 0..1500 {
                    let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                    let id = ex
                        .submit_limit(
                            side,
                            &format!("session{t}"),
                            "ACME",
                            px_int(rng.gen_range(95..105)),
                            rng.gen_range(1..10),
                            None,
                        )
                        .unwrap();
                    if rng.gen_bool(0.2) {
                        ex.cancel(id, &format!("session{t}"));
                    }
                    ids.push(id);
                }
                ids
            })
        })
        .collect();

    let all_ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    // Remaining quantity is non-increasing per order in announcement order
    // (a linearisable history cannot resurrect quantity).
    for (id, seq) in log.order_remaining.lock().iter() {
        for pair in seq.windows(2) {
            assert!(
                pair[0] >= pair[1],
                "order {id} remaining went back up: {seq:?}"
            );
        }
    }

    // Conservation: every traded unit was bought once and sold once.
    let mut bought = 0i64;
    let mut sold = 0i64;
    for &id in &all_ids {
        let snap = ex.get_order(id).unwrap();
        match snap.status {
            // Cancel zeroes remaining and keeps the fill counters.
            OrderStatus::Cancelled => assert_eq!(snap.remaining, 0),
            _ => assert_eq!(snap.remaining + snap.filled, snap.quantity),
        }
        match snap.side {
            Side::Buy => bought += snap.filled,
            Side::Sell => sold += snap.filled,
        }
    }
    assert_eq!(bought, sold);
    assert_eq!(bought + sold, 2 * *log.trade_qty_total.lock());

    // Final book matches the orders that are still active.
    let book = ex.book("ACME").unwrap();
    let resting_total: i64 = book.bids.iter().chain(book.asks.iter()).map(|l| l.quantity).sum();
    let active_total: i64 = all_ids
        .iter()
        .map(|&id| ex.get_order(id).unwrap())
        .filter(|s| s.status == OrderStatus::Active)
        .map(|s| s.remaining)
        .sum();
    assert_eq!(resting_total, active_total);
    if let (Some(bid), Some(ask)) = (book.bids.first(), book.asks.first()) {
        assert!(bid.price < ask.price);
    }
}

#[test]
fn readers_race_writers_without_blocking() {
    let ex = Arc::new(Exchange::new());
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let writer = {
        let ex = Arc::clone(&ex);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut rng = ChaCha8Rng::seed_from_u64(99);
            let mut last = 0u64;
            for i in 0..4000 {
                let instrument = if i % 3 == 0 { "AAA" } else { "BBB" };
                let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                let id = ex
                    .submit_limit(
                        side,
                        "w",
                        instrument,
                        px_int(rng.gen_range(90..110)),
                        rng.gen_range(1..10),
                        None,
                    )
                    .unwrap();
                assert!(id > last);
                last = id;
            }
            stop.store(true, std::sync::atomic::Ordering::Release);
            last
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let ex = Arc::clone(&ex);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut observed = 0u64;
                while !stop.load(std::sync::atomic::Ordering::Acquire) {
                    // Snapshots and lookups must never see torn state.
                    for instrument in ["AAA", "BBB", "CCC"] {
                        if let Some(book) = ex.book(instrument) {
                            for level in book.bids.iter().chain(book.asks.iter()) {
                                assert!(level.quantity > 0);
                            }
                        }
                    }
                    // all_orders reads field-atomically without the book
                    // locks, so only single-field claims hold mid-write.
                    for snap in ex.all_orders() {
                        assert!(snap.remaining >= 0);
                        assert!(snap.filled >= 0 && snap.filled <= snap.quantity);
                        observed += 1;
                    }
                }
                observed
            })
        })
        .collect();

    let last_id = writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    // Submitted ids are immediately resolvable after the fact too.
    assert!(ex.get_order(last_id).is_some());
}

#[test]
fn concurrent_quotes_and_orders_on_one_book() {
    let ex = Arc::new(Exchange::new());

    let quoter = {
        let ex = Arc::clone(&ex);
        thread::spawn(move || {
            let mut rng = ChaCha8Rng::seed_from_u64(5);
            for _ in 0..1000 {
                let bid = rng.gen_range(94..100);
                let ask = rng.gen_range(100..106);
                ex.quote(
                    "mm",
                    "ACME",
                    px_int(bid),
                    rng.gen_range(0..15),
                    px_int(ask),
                    rng.gen_range(0..15),
                    "q",
                );
            }
        })
    };

    let trader = {
        let ex = Arc::clone(&ex);
        thread::spawn(move || {
            let mut rng = ChaCha8Rng::seed_from_u64(6);
            for _ in 0..1000 {
                let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                ex.submit_limit(
                    side,
                    "t",
                    "ACME",
                    px_int(rng.gen_range(95..105)),
                    rng.gen_range(1..10),
                    None,
                )
                .unwrap();
            }
        })
    };

    quoter.join().unwrap();
    trader.join().unwrap();

    // Steady state: uncrossed, conserved.
    let book = ex.book("ACME").unwrap();
    if let (Some(bid), Some(ask)) = (book.bids.first(), book.asks.first()) {
        assert!(bid.price < ask.price);
    }
    for snap in ex.all_orders() {
        if snap.status != OrderStatus::Cancelled {
            assert_eq!(snap.remaining + snap.filled, snap.quantity);
        }
    }
}
