//! Price ladders: ordered collections of price levels for one book side.
//!
//! Two interchangeable implementations with identical APIs, so the book can
//! pick one at compile time:
//!
//! - [`VecLevels`] — ordered vector with binary-search insertion, best level
//!   at index 0. Wins for shallow books where levels fit a few cache lines.
//! - [`TreeLevels`] — `BTreeMap` keyed by price. Wins for deep books.
//!
//! The default is the vector; build with `--features btree-levels` to switch.
//! Bids order descending (best = highest), asks ascending (best = lowest).
//! Both sides expose the best level first; a level exists iff it holds at
//! least one resting order.

use std::collections::BTreeMap;

use std::sync::Arc;

use crate::order::Order;
use crate::order_list::{NodeArena, OrderList};
use crate::price::Px;

/// Ladder implementation selected for the book.
#[cfg(not(feature = "btree-levels"))]
pub type PriceLevels = VecLevels;

/// Ladder implementation selected for the book.
#[cfg(feature = "btree-levels")]
pub type PriceLevels = TreeLevels;

// ============================================================================
// Ordered-vector ladder
// ============================================================================

/// Ordered vector of levels, best first.
pub struct VecLevels {
    ascending: bool,
    levels: Vec<OrderList>,
}

impl VecLevels {
    /// `ascending = true` for asks (lowest price first), false for bids.
    pub fn new(ascending: bool) -> Self {
        VecLevels {
            ascending,
            levels: Vec::new(),
        }
    }

    fn locate(&self, price: Px) -> Result<usize, usize> {
        if self.ascending {
            self.levels.binary_search_by(|l| l.price().cmp(&price))
        } else {
            self.levels.binary_search_by(|l| price.cmp(&l.price()))
        }
    }

    /// Append the order to its price level, creating the level in sorted
    /// position if absent.
    pub fn insert(&mut self, arena: &mut NodeArena, order: &Arc<Order>) {
        let price = order.price();
        match self.locate(price) {
            Ok(i) => self.levels[i].push_back(arena, order),
            Err(i) => {
                let mut list = OrderList::new(price);
                list.push_back(arena, order);
                self.levels.insert(i, list);
            }
        }
    }

    /// Remove a resting order, dropping its level if emptied.
    ///
    /// Fatal if no level exists at the order's price: a resting order
    /// without a level means the ladder is corrupt.
    pub fn remove(&mut self, arena: &mut NodeArena, order: &Arc<Order>) {
        let i = self
            .locate(order.price())
            .unwrap_or_else(|_| panic!("price level for order does not exist"));
        self.levels[i].remove(arena, order);
        if self.levels[i].is_empty() {
            self.levels.remove(i);
        }
    }

    /// Head order of the best level.
    pub fn front(&self, arena: &NodeArena) -> Option<Arc<Order>> {
        self.levels.first().and_then(|l| l.front(arena))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Visit levels best-first for snapshots.
    pub fn for_each(&self, mut f: impl FnMut(&OrderList)) {
        for level in &self.levels {
            f(level);
        }
    }
}

// ============================================================================
// BTreeMap ladder
// ============================================================================

/// Balanced-tree ladder keyed by price.
pub struct TreeLevels {
    ascending: bool,
    levels: BTreeMap<Px, OrderList>,
}

impl TreeLevels {
    /// `ascending = true` for asks (lowest price first), false for bids.
    pub fn new(ascending: bool) -> Self {
        TreeLevels {
            ascending,
            levels: BTreeMap::new(),
        }
    }

    /// Append the order to its price level, creating the level if absent.
    pub fn insert(&mut self, arena: &mut NodeArena, order: &Arc<Order>) {
        let price = order.price();
        self.levels
            .entry(price)
            .or_insert_with(|| OrderList::new(price))
            .push_back(arena, order);
    }

    /// Remove a resting order, dropping its level if emptied.
    ///
    /// Fatal if no level exists at the order's price.
    pub fn remove(&mut self, arena: &mut NodeArena, order: &Arc<Order>) {
        let price = order.price();
        let level = self
            .levels
            .get_mut(&price)
            .unwrap_or_else(|| panic!("price level for order does not exist"));
        level.remove(arena, order);
        if level.is_empty() {
            self.levels.remove(&price);
        }
    }

    /// Head order of the best level.
    pub fn front(&self, arena: &NodeArena) -> Option<Arc<Order>> {
        let best = if self.ascending {
            self.levels.values().next()
        } else {
            self.levels.values().next_back()
        };
        best.and_then(|l| l.front(arena))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Visit levels best-first for snapshots.
    pub fn for_each(&self, mut f: impl FnMut(&OrderList)) {
        if self.ascending {
            for level in self.levels.values() {
                f(level);
            }
        } else {
            for level in self.levels.values().rev() {
                f(level);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;

    fn px(s: &str) -> Px {
        s.parse().unwrap()
    }

    fn order(id: u64, price: &str, qty: i64) -> Arc<Order> {
        Order::new("s", "", Arc::from("ACME"), px(price), qty, Side::Buy, id, false)
    }

    fn level_prices(ladder: &impl Ladder) -> Vec<Px> {
        let mut prices = Vec::new();
        ladder.for_each_dyn(&mut |l: &OrderList| prices.push(l.price()));
        prices
    }

    /// Test-only object-safe view so the same suite drives both ladders.
    trait Ladder {
        fn insert(&mut self, arena: &mut NodeArena, order: &Arc<Order>);
        fn remove(&mut self, arena: &mut NodeArena, order: &Arc<Order>);
        fn front(&self, arena: &NodeArena) -> Option<Arc<Order>>;
        fn len(&self) -> usize;
        fn for_each_dyn(&self, f: &mut dyn FnMut(&OrderList));
    }

    macro_rules! impl_ladder {
        ($ty:ty) => {
            impl Ladder for $ty {
                fn insert(&mut self, arena: &mut NodeArena, order: &Arc<Order>) {
                    <$ty>::insert(self, arena, order)
                }
                fn remove(&mut self, arena: &mut NodeArena, order: &Arc<Order>) {
                    <$ty>::remove(self, arena, order)
                }
                fn front(&self, arena: &NodeArena) -> Option<Arc<Order>> {
                    <$ty>::front(self, arena)
                }
                fn len(&self) -> usize {
                    <$ty>::len(self)
                }
                fn for_each_dyn(&self, f: &mut dyn FnMut(&OrderList)) {
                    <$ty>::for_each(self, |l| f(l))
                }
            }
        };
    }

    impl_ladder!(VecLevels);
    impl_ladder!(TreeLevels);

    macro_rules! ladder_suite {
        ($name:ident, $make:expr) => {
            mod $name {
                use super::*;

                #[test]
                fn test_ascending_orders_levels_low_to_high() {
                    let mut arena = NodeArena::new();
                    let mut ladder = $make(true);
                    let orders: Vec<_> = [(1, "20"), (2, "10"), (3, "30")]
                        .into_iter()
                        .map(|(id, p)| order(id, p, 100))
                        .collect();
                    for o in &orders {
                        ladder.insert(&mut arena, o);
                    }
                    assert_eq!(level_prices(&ladder), vec![px("10"), px("20"), px("30")]);
                    assert_eq!(ladder.front(&arena).unwrap().exchange_id(), 2);
                }

                #[test]
                fn test_descending_orders_levels_high_to_low() {
                    let mut arena = NodeArena::new();
                    let mut ladder = $make(false);
                    let orders: Vec<_> = [(1, "20"), (2, "10"), (3, "30")]
                        .into_iter()
                        .map(|(id, p)| order(id, p, 100))
                        .collect();
                    for o in &orders {
                        ladder.insert(&mut arena, o);
                    }
                    assert_eq!(level_prices(&ladder), vec![px("30"), px("20"), px("10")]);
                    assert_eq!(ladder.front(&arena).unwrap().exchange_id(), 3);
                }

                #[test]
                fn test_equal_prices_share_one_level() {
                    let mut arena = NodeArena::new();
                    let mut ladder = $make(true);
                    let a = order(1, "10", 100);
                    let b = order(2, "10", 100);
                    ladder.insert(&mut arena, &a);
                    ladder.insert(&mut arena, &b);
                    assert_eq!(ladder.len(), 1);
                    // FIFO within the level
                    assert_eq!(ladder.front(&arena).unwrap().exchange_id(), 1);
                }

                #[test]
                fn test_level_dropped_when_emptied() {
                    let mut arena = NodeArena::new();
                    let mut ladder = $make(true);
                    let a = order(1, "10", 100);
                    let b = order(2, "20", 100);
                    ladder.insert(&mut arena, &a);
                    ladder.insert(&mut arena, &b);
                    ladder.remove(&mut arena, &a);
                    assert_eq!(ladder.len(), 1);
                    assert_eq!(level_prices(&ladder), vec![px("20")]);
                    ladder.remove(&mut arena, &b);
                    assert_eq!(ladder.len(), 0);
                    assert!(ladder.front(&arena).is_none());
                }

                #[test]
                fn test_level_survives_partial_removal() {
                    let mut arena = NodeArena::new();
                    let mut ladder = $make(true);
                    let a = order(1, "10", 100);
                    let b = order(2, "10", 100);
                    ladder.insert(&mut arena, &a);
                    ladder.insert(&mut arena, &b);
                    ladder.remove(&mut arena, &a);
                    assert_eq!(ladder.len(), 1);
                    assert_eq!(ladder.front(&arena).unwrap().exchange_id(), 2);
                }

                #[test]
                #[should_panic(expected = "price level for order does not exist")]
                fn test_remove_without_level_is_fatal() {
                    let mut arena = NodeArena::new();
                    let mut ladder = $make(true);
                    ladder.insert(&mut arena, &order(1, "10", 100));
                    // Never inserted at this price.
                    ladder.remove(&mut arena, &order(2, "20", 100));
                }
            }
        };
    }

    ladder_suite!(vec_levels, |asc| VecLevels::new(asc));
    ladder_suite!(tree_levels, |asc| TreeLevels::new(asc));
}
