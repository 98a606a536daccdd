//! Orders: immutable identity plus mutable execution state.
//!
//! An [`Order`] is created once by the exchange, published into the
//! process-wide order map, and then shared between that map and (while
//! resting) a single price level. Identity fields never change. Execution
//! state lives in atomics: every write happens under the owning book's lock,
//! but lock-free readers of the order map may load individual fields at any
//! time without tearing them. A consistent multi-field view requires the
//! book lock, which is what [`crate::Exchange::get_order`] takes.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::order_list::{NodeIndex, NULL_INDEX};
use crate::price::Px;

/// Order side (buy = bid, sell = ask).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Sentinel price a market order on this side carries.
    #[inline]
    pub const fn market_sentinel(self) -> Px {
        match self {
            Side::Buy => Px::MARKET_BUY,
            Side::Sell => Px::MARKET_SELL,
        }
    }
}

/// Derived order state. Never stored; always computed from the fill
/// counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    /// Some quantity remains to trade.
    Active,
    /// Fully executed.
    Filled,
    /// Terminated with unexecuted quantity.
    Cancelled,
}

/// A single order.
///
/// Shared as `Arc<Order>` between the order map (owner for the process
/// lifetime) and, while resting, one price level. The level refers back via
/// the `node` handle, an index into the owning book's node arena.
pub struct Order {
    session_id: String,
    order_id: String,
    instrument: Arc<str>,
    side: Side,
    exchange_id: u64,
    time_submitted: DateTime<Utc>,
    is_quote: bool,

    // Execution state. Raw Px ticks for the price fields.
    price: AtomicI64,
    quantity: AtomicI64,
    remaining: AtomicI64,
    filled: AtomicI64,
    cum_qty: AtomicI64,
    avg_price: AtomicI64,

    /// List handle: index of this order's node in the owning book's arena,
    /// or NULL_INDEX when not resting.
    node: AtomicU32,
}

impl Order {
    pub(crate) fn new(
        session_id: &str,
        order_id: &str,
        instrument: Arc<str>,
        price: Px,
        quantity: i64,
        side: Side,
        exchange_id: u64,
        is_quote: bool,
    ) -> Arc<Order> {
        Arc::new(Order {
            session_id: session_id.to_owned(),
            order_id: order_id.to_owned(),
            instrument,
            side,
            exchange_id,
            time_submitted: Utc::now(),
            is_quote,
            price: AtomicI64::new(price.raw()),
            quantity: AtomicI64::new(quantity),
            remaining: AtomicI64::new(quantity),
            filled: AtomicI64::new(0),
            cum_qty: AtomicI64::new(0),
            avg_price: AtomicI64::new(Px::ZERO.raw()),
            node: AtomicU32::new(NULL_INDEX),
        })
    }

    // ========================================================================
    // Identity
    // ========================================================================

    #[inline]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Client-assigned order id; may be empty.
    #[inline]
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    #[inline]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    #[inline]
    pub fn exchange_id(&self) -> u64 {
        self.exchange_id
    }

    #[inline]
    pub fn time_submitted(&self) -> DateTime<Utc> {
        self.time_submitted
    }

    /// True for the carrier orders of a two-sided quote.
    #[inline]
    pub fn is_quote(&self) -> bool {
        self.is_quote
    }

    // ========================================================================
    // Execution state
    // ========================================================================

    #[inline]
    pub fn price(&self) -> Px {
        Px::from_raw(self.price.load(Ordering::Relaxed))
    }

    /// Original quantity (reset by a quote re-arm).
    #[inline]
    pub fn quantity(&self) -> i64 {
        self.quantity.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn remaining_quantity(&self) -> i64 {
        self.remaining.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn filled_quantity(&self) -> i64 {
        self.filled.load(Ordering::Relaxed)
    }

    /// Cumulative traded quantity over the order's whole life.
    #[inline]
    pub fn cumulative_quantity(&self) -> i64 {
        self.cum_qty.load(Ordering::Relaxed)
    }

    /// Volume-weighted average fill price.
    #[inline]
    pub fn average_price(&self) -> Px {
        Px::from_raw(self.avg_price.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_market(&self) -> bool {
        self.price().is_market()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.remaining_quantity() > 0
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.remaining_quantity() == 0 && self.filled_quantity() == self.quantity()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.remaining_quantity() == 0 && self.filled_quantity() != self.quantity()
    }

    pub fn status(&self) -> OrderStatus {
        if self.is_active() {
            OrderStatus::Active
        } else if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::Cancelled
        }
    }

    // ========================================================================
    // Mutation (book lock held)
    // ========================================================================

    /// Apply a fill: move quantity from remaining to filled and fold the
    /// execution price into the running VWAP.
    pub(crate) fn fill(&self, qty: i64, price: Px) {
        let cum = self.cum_qty.load(Ordering::Relaxed);
        self.remaining.fetch_sub(qty, Ordering::Relaxed);
        self.filled.fetch_add(qty, Ordering::Relaxed);
        let avg = Px::vwap(self.average_price(), cum, price, qty);
        self.avg_price.store(avg.raw(), Ordering::Relaxed);
        self.cum_qty.store(cum + qty, Ordering::Relaxed);
    }

    /// Terminate the order, leaving filled as-is.
    pub(crate) fn cancel(&self) {
        self.remaining.store(0, Ordering::Relaxed);
    }

    /// Quote re-arm: reset the full execution state for a fresh pass through
    /// the book. Only ever called on quote carriers under the book lock,
    /// after the order has been taken off its level.
    pub(crate) fn rearm(&self, price: Px, quantity: i64) {
        self.price.store(price.raw(), Ordering::Relaxed);
        self.quantity.store(quantity, Ordering::Relaxed);
        self.remaining.store(quantity, Ordering::Relaxed);
        self.filled.store(0, Ordering::Relaxed);
        self.cum_qty.store(0, Ordering::Relaxed);
        self.avg_price.store(Px::ZERO.raw(), Ordering::Relaxed);
    }

    // ========================================================================
    // List handle
    // ========================================================================

    #[inline]
    pub(crate) fn node(&self) -> NodeIndex {
        self.node.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_node(&self, index: NodeIndex) {
        self.node.store(index, Ordering::Relaxed);
    }

    /// True while the order rests on a price level.
    #[inline]
    pub(crate) fn is_on_list(&self) -> bool {
        self.node() != NULL_INDEX
    }

    /// Value copy of the current state.
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            session_id: self.session_id.clone(),
            order_id: self.order_id.clone(),
            instrument: self.instrument.to_string(),
            side: self.side,
            exchange_id: self.exchange_id,
            time_submitted: self.time_submitted,
            is_quote: self.is_quote,
            price: self.price(),
            quantity: self.quantity(),
            remaining: self.remaining_quantity(),
            filled: self.filled_quantity(),
            cum_qty: self.cumulative_quantity(),
            avg_price: self.average_price(),
            status: self.status(),
        }
    }
}

impl std::fmt::Debug for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Order")
            .field("exchange_id", &self.exchange_id)
            .field("instrument", &self.instrument)
            .field("side", &self.side)
            .field("price", &self.price())
            .field("remaining", &self.remaining_quantity())
            .field("filled", &self.filled_quantity())
            .field("status", &self.status())
            .finish()
    }
}

/// Value copy of an order's fields at the moment of read.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderSnapshot {
    pub session_id: String,
    pub order_id: String,
    pub instrument: String,
    pub side: Side,
    pub exchange_id: u64,
    pub time_submitted: DateTime<Utc>,
    pub is_quote: bool,
    pub price: Px,
    pub quantity: i64,
    pub remaining: i64,
    pub filled: i64,
    pub cum_qty: i64,
    pub avg_price: Px,
    pub status: OrderStatus,
}
