//! Latency percentile report for the exchange hot paths.

use hdrhistogram::Histogram;
use matchbook::{Exchange, Px, Side};
use std::time::Instant;

const ITERATIONS: u64 = 200_000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    println!("Preparing latency run ({ITERATIONS} submissions)...");

    let exchange = Exchange::new();
    let mut submit_hist = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3).unwrap();
    let mut cancel_hist = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3).unwrap();

    // Alternate non-crossing bids and asks so every submission rests, then
    // cancel the resting order to keep the book shallow.
    let start_run = Instant::now();
    for i in 0..ITERATIONS {
        let (side, price) = if i % 2 == 0 {
            (Side::Buy, Px::from_raw(Px::from_int(90).raw() + (i % 64) as i64))
        } else {
            (Side::Sell, Px::from_raw(Px::from_int(110).raw() + (i % 64) as i64))
        };

        let start = Instant::now();
        let id = exchange
            .submit_limit(side, "bench", "ACME", price, 10, None)
            .expect("submission accepted");
        submit_hist
            .record(start.elapsed().as_nanos() as u64)
            .unwrap_or(());

        let start = Instant::now();
        exchange.cancel(id, "bench");
        cancel_hist
            .record(start.elapsed().as_nanos() as u64)
            .unwrap_or(());
    }
    let elapsed = start_run.elapsed();

    println!(
        "Throughput: {:.0} submit+cancel pairs/sec",
        ITERATIONS as f64 / elapsed.as_secs_f64()
    );
    for (name, hist) in [("submit", &submit_hist), ("cancel", &cancel_hist)] {
        println!("\n=== {name} latency (ns) ===");
        println!("Min:    {:6}", hist.min());
        println!("P50:    {:6}", hist.value_at_quantile(0.50));
        println!("P90:    {:6}", hist.value_at_quantile(0.90));
        println!("P99:    {:6}", hist.value_at_quantile(0.99));
        println!("P99.9:  {:6}", hist.value_at_quantile(0.999));
        println!("Max:    {:6}", hist.max());
    }
}
