//! Exchange facade: id assignment, routing, and event publication.
//!
//! The facade owns the two process-wide lookup structures and runs each
//! operation under the target book's writer lock. The submit path keeps id
//! allocation, order-map publication, and book insertion inside one
//! critical section, so ids on a single instrument increase in book order
//! and an id returned to the caller is immediately resolvable via
//! [`Exchange::get_order`] from any thread.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::book_map::{BookMap, MAX_INSTRUMENTS};
use crate::events::{ExchangeListener, NopListener};
use crate::ids;
use crate::order::{Order, OrderSnapshot, Side};
use crate::order_book::{Book, QuoteOrders};
use crate::order_map::{OrderMap, ORDER_MAP_BUCKETS};
use crate::price::Px;

/// Sizing knobs for the process-wide lookup structures.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Capacity of the instrument table.
    pub max_instruments: usize,
    /// Bucket count of the order id table.
    pub order_map_buckets: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_instruments: MAX_INSTRUMENTS,
            order_map_buckets: ORDER_MAP_BUCKETS,
        }
    }
}

/// Multi-instrument matching engine entry point.
pub struct Exchange {
    books: BookMap,
    orders: OrderMap,
    listener: Arc<dyn ExchangeListener>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::with_listener(Arc::new(NopListener))
    }

    pub fn with_listener(listener: Arc<dyn ExchangeListener>) -> Self {
        Self::with_config(EngineConfig::default(), listener)
    }

    pub fn with_config(config: EngineConfig, listener: Arc<dyn ExchangeListener>) -> Self {
        Exchange {
            books: BookMap::with_capacity(config.max_instruments),
            orders: OrderMap::with_buckets(config.order_map_buckets),
            listener,
        }
    }

    // ========================================================================
    // Order entry
    // ========================================================================

    /// Submit a limit order. Returns the assigned exchange id, or `None`
    /// when the input is invalid or the instrument table is full; nothing
    /// changes in that case.
    pub fn submit_limit(
        &self,
        side: Side,
        session_id: &str,
        instrument: &str,
        price: Px,
        quantity: i64,
        order_id: Option<&str>,
    ) -> Option<u64> {
        if instrument.is_empty() {
            warn!("rejecting order with empty instrument");
            return None;
        }
        if quantity <= 0 {
            debug!(instrument, quantity, "rejecting non-positive quantity");
            return None;
        }
        // A sentinel on the wrong side would rest as a bottom-of-ladder
        // "market" order the cleanup pass never sees.
        if price.is_market() && price != side.market_sentinel() {
            warn!(instrument, ?side, "rejecting mismatched market sentinel");
            return None;
        }
        let book = match self.books.get_or_create(instrument, &self.listener) {
            Ok(book) => book,
            Err(e) => {
                warn!(instrument, error = %e, "order rejected");
                return None;
            }
        };

        let mut writer = book.write();
        let exchange_id = ids::next_exchange_id();
        let order = Order::new(
            session_id,
            order_id.unwrap_or(""),
            book.instrument_arc(),
            price,
            quantity,
            side,
            exchange_id,
            false,
        );
        // Publish before inserting: the id must resolve the moment it is
        // returned, and insertion may already fill or cancel the order.
        self.orders.add(Arc::clone(&order));
        writer.insert_order(&order);
        debug!(exchange_id, instrument, ?side, price = %price, quantity, "order submitted");
        Some(exchange_id)
    }

    /// Submit a market order: a limit at the side's sentinel price.
    pub fn submit_market(
        &self,
        side: Side,
        session_id: &str,
        instrument: &str,
        quantity: i64,
        order_id: Option<&str>,
    ) -> Option<u64> {
        self.submit_limit(
            side,
            session_id,
            instrument,
            side.market_sentinel(),
            quantity,
            order_id,
        )
    }

    pub fn buy(
        &self,
        session_id: &str,
        instrument: &str,
        price: Px,
        quantity: i64,
        order_id: Option<&str>,
    ) -> Option<u64> {
        self.submit_limit(Side::Buy, session_id, instrument, price, quantity, order_id)
    }

    pub fn sell(
        &self,
        session_id: &str,
        instrument: &str,
        price: Px,
        quantity: i64,
        order_id: Option<&str>,
    ) -> Option<u64> {
        self.submit_limit(Side::Sell, session_id, instrument, price, quantity, order_id)
    }

    pub fn market_buy(
        &self,
        session_id: &str,
        instrument: &str,
        quantity: i64,
        order_id: Option<&str>,
    ) -> Option<u64> {
        self.submit_market(Side::Buy, session_id, instrument, quantity, order_id)
    }

    pub fn market_sell(
        &self,
        session_id: &str,
        instrument: &str,
        quantity: i64,
        order_id: Option<&str>,
    ) -> Option<u64> {
        self.submit_market(Side::Sell, session_id, instrument, quantity, order_id)
    }

    /// Post or re-arm a two-sided quote.
    ///
    /// The first call for a `(session, quote_id)` pair creates the carrier
    /// orders — only for the sides quoted with positive quantity. Later
    /// calls re-arm those carriers in place; a zero quantity pulls the
    /// side.
    #[allow(clippy::too_many_arguments)]
    pub fn quote(
        &self,
        session_id: &str,
        instrument: &str,
        bid_price: Px,
        bid_quantity: i64,
        ask_price: Px,
        ask_quantity: i64,
        quote_id: &str,
    ) {
        if instrument.is_empty() {
            warn!("ignoring quote with empty instrument");
            return;
        }
        let book = match self.books.get_or_create(instrument, &self.listener) {
            Ok(book) => book,
            Err(e) => {
                warn!(instrument, error = %e, "quote ignored");
                return;
            }
        };

        let mut writer = book.write();
        let orders = writer.quotes(session_id, quote_id, || {
            let mut carriers = QuoteOrders::default();
            if bid_quantity > 0 {
                let bid = Order::new(
                    session_id,
                    quote_id,
                    book.instrument_arc(),
                    bid_price,
                    bid_quantity,
                    Side::Buy,
                    ids::next_exchange_id(),
                    true,
                );
                self.orders.add(Arc::clone(&bid));
                carriers.bid = Some(bid);
            }
            if ask_quantity > 0 {
                let ask = Order::new(
                    session_id,
                    quote_id,
                    book.instrument_arc(),
                    ask_price,
                    ask_quantity,
                    Side::Sell,
                    ids::next_exchange_id(),
                    true,
                );
                self.orders.add(Arc::clone(&ask));
                carriers.ask = Some(ask);
            }
            carriers
        });
        writer.quote(&orders, bid_price, bid_quantity, ask_price, ask_quantity);
        debug!(instrument, session_id, quote_id, bid_quantity, ask_quantity, "quote re-armed");
    }

    /// Cancel an order by exchange id.
    ///
    /// Fails (returns false) when the id is unknown, the session does not
    /// own the order, or the order is already terminal.
    pub fn cancel(&self, exchange_id: u64, session_id: &str) -> bool {
        let Some(order) = self.orders.get(exchange_id) else {
            return false;
        };
        if order.session_id() != session_id {
            debug!(exchange_id, session_id, "cancel rejected: session mismatch");
            return false;
        }
        let Some(book) = self.books.get(order.instrument()) else {
            return false;
        };
        let cancelled = book.cancel_order(&order);
        debug!(exchange_id, cancelled, "cancel processed");
        cancelled
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Consistent snapshot of one order, taken under its book's lock.
    pub fn get_order(&self, exchange_id: u64) -> Option<OrderSnapshot> {
        let order = self.orders.get(exchange_id)?;
        let book = self.books.get(order.instrument())?;
        Some(book.snapshot_order(&order))
    }

    /// Snapshot of one instrument's book.
    pub fn book(&self, instrument: &str) -> Option<Book> {
        Some(self.books.get(instrument)?.book())
    }

    /// Instruments with a published book.
    pub fn instruments(&self) -> Vec<String> {
        self.books.instruments()
    }

    /// Snapshot of every order ever accepted. Introspection only: each
    /// order is copied field-atomically without taking its book's lock.
    pub fn all_orders(&self) -> Vec<OrderSnapshot> {
        self.orders.all().iter().map(|o| o.snapshot()).collect()
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("books", &self.books)
            .field("orders", &self.orders)
            .finish_non_exhaustive()
    }
}
