//! # Matchbook
//!
//! A multi-instrument, price-time-priority limit order matching engine.
//!
//! ## Design Principles
//!
//! - **One writer per book**: every mutation of an instrument's book runs
//!   under that book's lock; books on different instruments are fully
//!   independent.
//! - **Lock-free lookup**: the instrument table and the order id table
//!   publish with compare-and-swap and never block readers.
//! - **O(1) cancel**: resting orders carry an arena-index handle into their
//!   price level's FIFO queue.
//! - **Exact prices**: fixed-point `Px` with market sentinels; equality is
//!   exact, which level lookup depends on.
//!
//! ## Architecture
//!
//! ```text
//! [Caller Threads] --> [Exchange] --> [BookMap] --> [OrderBook (locked)]
//!                          |                              |
//!                      [OrderMap]                  [Listener events]
//! ```
//!
//! Listener callbacks fire on the calling thread while the book lock is
//! held; see [`ExchangeListener`] before doing anything slow in one.

pub mod book_map;
pub mod events;
pub mod exchange;
pub mod ids;
pub mod order;
pub mod order_book;
pub mod order_list;
pub mod order_map;
pub mod price;
pub mod price_levels;

// Re-exports for convenience
pub use book_map::{BookMap, EngineError, MAX_INSTRUMENTS};
pub use events::{ExchangeListener, NopListener, Trade, TradeRecord};
pub use exchange::{EngineConfig, Exchange};
pub use order::{Order, OrderSnapshot, OrderStatus, Side};
pub use order_book::{Book, BookLevel, OrderBook, QuoteOrders, SessionQuoteId};
pub use order_list::{NodeArena, OrderList, NULL_INDEX};
pub use order_map::{OrderMap, ORDER_MAP_BUCKETS};
pub use price::{Px, PriceError, PRICE_DECIMALS, PRICE_SCALE};
pub use price_levels::{PriceLevels, TreeLevels, VecLevels};
