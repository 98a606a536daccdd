//! Per-instrument order book and matching kernel.
//!
//! A book owns two ladders (bids descending, asks ascending), the node
//! arena backing their FIFO queues, and the quote bookkeeping for its
//! instrument. Every mutation and every snapshot runs under the book's
//! writer lock; the matching loop therefore observes exclusive access to
//! both ladders and needs no further synchronization. Books on different
//! instruments are fully independent.
//!
//! Listener callbacks are invoked while the lock is held; see
//! [`ExchangeListener`] for the re-entry rules.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{trace, warn};

use crate::events::{ExchangeListener, Trade};
use crate::ids;
use crate::order::{Order, OrderSnapshot, Side};
use crate::order_list::NodeArena;
use crate::price::Px;
use crate::price_levels::PriceLevels;

/// One aggregated side level of a [`Book`] snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BookLevel {
    pub price: Px,
    pub quantity: i64,
}

/// Read-only value snapshot of one book.
///
/// Levels are best-first; order ids list the contributing resting orders in
/// priority order across the whole side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Book {
    pub bids: Vec<BookLevel>,
    pub bid_order_ids: Vec<u64>,
    pub asks: Vec<BookLevel>,
    pub ask_order_ids: Vec<u64>,
}

impl fmt::Display for Book {
    /// Ladder dump: asks, a separator, then bids, one `price quantity` line
    /// per level.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for level in &self.asks {
            writeln!(f, "{} {}", level.price, level.quantity)?;
        }
        writeln!(f, "----------")?;
        for level in &self.bids {
            writeln!(f, "{} {}", level.price, level.quantity)?;
        }
        Ok(())
    }
}

/// Key of a quote bucket: quotes are scoped per session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionQuoteId {
    pub session_id: String,
    pub quote_id: String,
}

/// The pair of long-lived carrier orders behind a two-sided quote.
///
/// A side is `None` when that side had zero quantity the first time the
/// quote id was seen; such a side can never be armed later.
#[derive(Clone, Default)]
pub struct QuoteOrders {
    pub bid: Option<Arc<Order>>,
    pub ask: Option<Arc<Order>>,
}

/// Book state guarded by the writer lock.
struct BookCore {
    arena: NodeArena,
    bids: PriceLevels,
    asks: PriceLevels,
    quotes: FxHashMap<SessionQuoteId, QuoteOrders>,
}

/// Single-instrument order book.
pub struct OrderBook {
    instrument: Arc<str>,
    listener: Arc<dyn ExchangeListener>,
    inner: Mutex<BookCore>,
}

impl OrderBook {
    pub fn new(instrument: &str, listener: Arc<dyn ExchangeListener>) -> Self {
        OrderBook {
            instrument: Arc::from(instrument),
            listener,
            inner: Mutex::new(BookCore {
                arena: NodeArena::new(),
                bids: PriceLevels::new(false),
                asks: PriceLevels::new(true),
                quotes: FxHashMap::default(),
            }),
        }
    }

    #[inline]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    #[inline]
    pub(crate) fn instrument_arc(&self) -> Arc<str> {
        Arc::clone(&self.instrument)
    }

    /// Acquire the writer lock. All mutations and consistent reads go
    /// through the returned guard; it is also the facade's way of keeping
    /// id allocation, order-map publication and insertion in one critical
    /// section.
    pub fn write(&self) -> BookWriter<'_> {
        BookWriter {
            book: self,
            core: self.inner.lock(),
        }
    }

    /// Insert and match a new order (locks internally).
    pub fn insert_order(&self, order: &Arc<Order>) {
        self.write().insert_order(order);
    }

    /// Cancel a resting order (locks internally). Returns false when the
    /// order is no longer cancellable.
    pub fn cancel_order(&self, order: &Arc<Order>) -> bool {
        self.write().cancel_order(order)
    }

    /// Aggregated snapshot of both sides (locks internally).
    pub fn book(&self) -> Book {
        self.write().book()
    }

    /// Consistent value copy of an order's state (locks internally).
    pub fn snapshot_order(&self, order: &Order) -> OrderSnapshot {
        let _guard = self.inner.lock();
        order.snapshot()
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("instrument", &self.instrument)
            .finish_non_exhaustive()
    }
}

/// Exclusive handle on one book. Holds the writer lock until dropped.
pub struct BookWriter<'a> {
    book: &'a OrderBook,
    core: MutexGuard<'a, BookCore>,
}

impl BookWriter<'_> {
    /// Insert a new order into its side's ladder, announce it, and run the
    /// matching loop with the order's side as aggressor.
    ///
    /// Orders with nothing left to trade are ignored silently.
    pub fn insert_order(&mut self, order: &Arc<Order>) {
        if order.remaining_quantity() <= 0 {
            return;
        }
        let core = &mut *self.core;
        let ladder = match order.side() {
            Side::Buy => &mut core.bids,
            Side::Sell => &mut core.asks,
        };
        ladder.insert(&mut core.arena, order);
        self.book.listener.on_order(order);
        self.match_orders(order.side());
    }

    /// Pair the best bid against the best ask until the book uncrosses.
    ///
    /// The passive (resting counterparty) order's price sets the trade
    /// price. Any residual of a market-order aggressor is cancelled at the
    /// end: market orders never rest.
    fn match_orders(&mut self, aggressor_side: Side) {
        loop {
            let core = &mut *self.core;
            let (bid, ask) = match (core.bids.front(&core.arena), core.asks.front(&core.arena)) {
                (Some(bid), Some(ask)) => (bid, ask),
                _ => break,
            };
            if bid.price() < ask.price() {
                break;
            }

            let qty = bid.remaining_quantity().min(ask.remaining_quantity());
            let (aggressor, passive) = match aggressor_side {
                Side::Buy => (&bid, &ask),
                Side::Sell => (&ask, &bid),
            };
            let price = passive.price();

            bid.fill(qty, price);
            ask.fill(qty, price);

            let trade = Trade {
                price,
                quantity: qty,
                aggressor: Arc::clone(aggressor),
                passive: Arc::clone(passive),
                exec_id: ids::next_exec_id(),
            };

            if bid.remaining_quantity() == 0 {
                core.bids.remove(&mut core.arena, &bid);
            }
            if ask.remaining_quantity() == 0 {
                core.asks.remove(&mut core.arena, &ask);
            }

            trace!(
                instrument = %self.book.instrument,
                exec_id = trade.exec_id,
                price = %price,
                qty,
                "trade"
            );
            self.book.listener.on_order(&bid);
            self.book.listener.on_order(&ask);
            self.book.listener.on_trade(&trade);
        }

        // A market order that did not fully execute cannot rest: cancel the
        // residual and take it off the ladder.
        let core = &mut *self.core;
        let ladder = match aggressor_side {
            Side::Buy => &mut core.bids,
            Side::Sell => &mut core.asks,
        };
        if let Some(front) = ladder.front(&core.arena) {
            if front.is_market() {
                front.cancel();
                ladder.remove(&mut core.arena, &front);
                self.book.listener.on_order(&front);
            }
        }
    }

    /// Cancel a resting order.
    ///
    /// Returns false when the order is already terminal or not resting on
    /// this book; nothing is announced in that case.
    pub fn cancel_order(&mut self, order: &Arc<Order>) -> bool {
        if order.remaining_quantity() <= 0 {
            return false;
        }
        order.cancel();
        if !order.is_on_list() {
            return false;
        }
        let core = &mut *self.core;
        let ladder = match order.side() {
            Side::Buy => &mut core.bids,
            Side::Sell => &mut core.asks,
        };
        ladder.remove(&mut core.arena, order);
        self.book.listener.on_order(order);
        true
    }

    /// Fetch the quote bucket for `(session_id, quote_id)`, running the
    /// factory to build the carrier orders the first time the key is seen.
    pub fn quotes(
        &mut self,
        session_id: &str,
        quote_id: &str,
        factory: impl FnOnce() -> QuoteOrders,
    ) -> QuoteOrders {
        self.core
            .quotes
            .entry(SessionQuoteId {
                session_id: session_id.to_owned(),
                quote_id: quote_id.to_owned(),
            })
            .or_insert_with(factory)
            .clone()
    }

    /// Re-arm a two-sided quote in place.
    ///
    /// Each currently resting side is pulled first; each side with a
    /// positive target quantity is then reset, re-inserted, and matched as
    /// a fresh aggressor. A non-positive target leaves the side pulled.
    /// The quote may cross the same session's own resting orders; no
    /// self-trade protection is applied.
    pub fn quote(
        &mut self,
        orders: &QuoteOrders,
        bid_price: Px,
        bid_quantity: i64,
        ask_price: Px,
        ask_quantity: i64,
    ) {
        {
            let core = &mut *self.core;
            if let Some(bid) = &orders.bid {
                if bid.is_on_list() {
                    core.bids.remove(&mut core.arena, bid);
                }
            }
            if let Some(ask) = &orders.ask {
                if ask.is_on_list() {
                    core.asks.remove(&mut core.arena, ask);
                }
            }
        }
        if bid_quantity > 0 {
            match &orders.bid {
                Some(bid) => {
                    bid.rearm(bid_price, bid_quantity);
                    let core = &mut *self.core;
                    core.bids.insert(&mut core.arena, bid);
                    self.match_orders(Side::Buy);
                }
                None => warn!(
                    instrument = %self.book.instrument,
                    "bid side of quote was never armed; ignoring"
                ),
            }
        }
        if ask_quantity > 0 {
            match &orders.ask {
                Some(ask) => {
                    ask.rearm(ask_price, ask_quantity);
                    let core = &mut *self.core;
                    core.asks.insert(&mut core.arena, ask);
                    self.match_orders(Side::Sell);
                }
                None => warn!(
                    instrument = %self.book.instrument,
                    "ask side of quote was never armed; ignoring"
                ),
            }
        }
    }

    /// Aggregate both ladders into a value snapshot.
    pub fn book(&self) -> Book {
        let core = &*self.core;
        let mut book = Book::default();
        core.bids.for_each(|level| {
            let mut quantity = 0;
            for order in level.iter(&core.arena) {
                quantity += order.remaining_quantity();
                book.bid_order_ids.push(order.exchange_id());
            }
            book.bids.push(BookLevel {
                price: level.price(),
                quantity,
            });
        });
        core.asks.for_each(|level| {
            let mut quantity = 0;
            for order in level.iter(&core.arena) {
                quantity += order.remaining_quantity();
                book.ask_order_ids.push(order.exchange_id());
            }
            book.asks.push(BookLevel {
                price: level.price(),
                quantity,
            });
        });
        book
    }

    /// Consistent value copy of an order's state under this lock.
    pub fn snapshot_order(&self, order: &Order) -> OrderSnapshot {
        order.snapshot()
    }
}
