//! Scripted walk-through of the exchange API: limit orders, a market
//! sweep, a re-armed quote, and cancels, with fills printed as they happen.

use std::sync::Arc;

use matchbook::{Exchange, ExchangeListener, Order, Px, Trade};

struct PrintingListener;

impl ExchangeListener for PrintingListener {
    fn on_order(&self, order: &Order) {
        println!(
            "  order {:>3} {:?} {:?} remaining={} filled={} avg={}",
            order.exchange_id(),
            order.side(),
            order.status(),
            order.remaining_quantity(),
            order.filled_quantity(),
            order.average_price(),
        );
    }

    fn on_trade(&self, trade: &Trade) {
        println!(
            "  trade #{} {} x {} (aggressor {}, passive {})",
            trade.exec_id,
            trade.quantity,
            trade.price,
            trade.aggressor.exchange_id(),
            trade.passive.exchange_id(),
        );
    }
}

fn px(s: &str) -> Px {
    s.parse().expect("literal price")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let exchange = Exchange::with_listener(Arc::new(PrintingListener));

    println!("== resting limit orders ==");
    let buy1 = exchange
        .buy("alice", "AAPL", px("150.25"), 100, Some("buy1"))
        .unwrap();
    exchange
        .buy("bob", "AAPL", px("150.20"), 50, Some("buy2"))
        .unwrap();
    exchange
        .sell("carol", "AAPL", px("150.30"), 75, Some("sell1"))
        .unwrap();
    exchange
        .sell("dave", "AAPL", px("150.35"), 25, Some("sell2"))
        .unwrap();
    println!("{}", exchange.book("AAPL").unwrap());

    println!("== crossing sell hits the best bid ==");
    exchange
        .sell("carol", "AAPL", px("150.20"), 60, Some("sell3"))
        .unwrap();
    println!("{}", exchange.book("AAPL").unwrap());

    println!("== market buy sweeps the asks ==");
    exchange.market_buy("erin", "AAPL", 120, None).unwrap();
    println!("{}", exchange.book("AAPL").unwrap());

    println!("== two-sided quote, then tightened ==");
    exchange.quote("mm", "AAPL", px("150.00"), 40, px("150.50"), 40, "q1");
    exchange.quote("mm", "AAPL", px("150.10"), 40, px("150.40"), 40, "q1");
    println!("{}", exchange.book("AAPL").unwrap());

    println!("== cancel ==");
    println!("  cancel own order: {}", exchange.cancel(buy1, "alice"));
    println!("  cancel again:     {}", exchange.cancel(buy1, "alice"));
    println!("{}", exchange.book("AAPL").unwrap());

    println!("== final order states ==");
    let mut orders = exchange.all_orders();
    orders.sort_by_key(|o| o.exchange_id);
    for o in orders {
        println!(
            "  {:>3} {:<6} {:?} {:?} filled {}/{} avg {}",
            o.exchange_id, o.session_id, o.side, o.status, o.filled, o.quantity, o.avg_price
        );
    }
}
