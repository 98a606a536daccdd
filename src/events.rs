//! Listener contract and trade events.

use std::sync::Arc;

use serde::Serialize;

use crate::order::{Order, Side};
use crate::price::Px;

/// A matched execution between two orders.
///
/// Produced only by the matching loop and never mutated. The aggressor is
/// the order whose arrival (or quote re-arm) triggered the match; the
/// passive order was resting and its price set the trade price.
pub struct Trade {
    pub price: Px,
    pub quantity: i64,
    pub aggressor: Arc<Order>,
    pub passive: Arc<Order>,
    /// Process-wide monotonic execution id.
    pub exec_id: u64,
}

impl Trade {
    /// Side of the aggressor order.
    #[inline]
    pub fn aggressor_side(&self) -> Side {
        self.aggressor.side()
    }

    /// Flat id-level record of this trade, for logs and serialization.
    pub fn record(&self) -> TradeRecord {
        TradeRecord {
            exec_id: self.exec_id,
            instrument: self.passive.instrument().to_string(),
            price: self.price,
            quantity: self.quantity,
            aggressor_id: self.aggressor.exchange_id(),
            passive_id: self.passive.exchange_id(),
            aggressor_side: self.aggressor.side(),
        }
    }
}

impl std::fmt::Debug for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trade")
            .field("exec_id", &self.exec_id)
            .field("price", &self.price)
            .field("quantity", &self.quantity)
            .field("aggressor", &self.aggressor.exchange_id())
            .field("passive", &self.passive.exchange_id())
            .finish()
    }
}

/// Value copy of a trade without the order references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TradeRecord {
    pub exec_id: u64,
    pub instrument: String,
    pub price: Px,
    pub quantity: i64,
    pub aggressor_id: u64,
    pub passive_id: u64,
    pub aggressor_side: Side,
}

/// Sink for engine notifications.
///
/// `on_order` fires on every state-visible change of an order (created,
/// filled, cancelled); `on_trade` fires once per execution.
///
/// Callbacks run on the submitting thread **while the book lock is held**:
/// implementations must be internally thread-safe (books on different
/// instruments invoke the listener concurrently) and must not call back
/// into the engine, which would deadlock on the same book. Hand long work
/// off to a queue.
pub trait ExchangeListener: Send + Sync {
    fn on_order(&self, _order: &Order) {}
    fn on_trade(&self, _trade: &Trade) {}
}

/// Listener that discards everything.
#[derive(Default)]
pub struct NopListener;

impl ExchangeListener for NopListener {}
