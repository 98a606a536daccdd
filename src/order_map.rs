//! Lock-free exchange-id -> order table.
//!
//! Append-only chained hash table: each bucket is a singly-linked stack of
//! heap nodes, pushed with a compare-and-swap on the bucket head. Entries
//! are never removed — terminal orders stay queryable by id for the life of
//! the process — so readers can walk a chain without ever observing a torn
//! or reclaimed node. The chains keep the table correct past the bucket
//! count; the count only sizes the fan-out.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::order::Order;

/// Default bucket count.
pub const ORDER_MAP_BUCKETS: usize = 1_000_000;

struct Entry {
    order: Arc<Order>,
    next: *mut Entry,
}

/// Concurrent append-only map of exchange id to order.
pub struct OrderMap {
    buckets: Box<[AtomicPtr<Entry>]>,
}

// Entries are immutable once published and only freed in Drop under
// exclusive access, so sharing the raw chain pointers across threads is
// safe.
unsafe impl Send for OrderMap {}
unsafe impl Sync for OrderMap {}

impl OrderMap {
    pub fn new() -> Self {
        Self::with_buckets(ORDER_MAP_BUCKETS)
    }

    pub fn with_buckets(buckets: usize) -> Self {
        assert!(buckets > 0, "order map needs at least one bucket");
        let buckets = (0..buckets)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        OrderMap { buckets }
    }

    #[inline]
    fn bucket(&self, exchange_id: u64) -> &AtomicPtr<Entry> {
        &self.buckets[(exchange_id % self.buckets.len() as u64) as usize]
    }

    /// Publish an order under its exchange id.
    ///
    /// The order must carry its final identity fields; lookups are valid
    /// the moment this returns. Adding the same id twice is a programmer
    /// error (ids are allocator-unique) and is not defended against.
    pub fn add(&self, order: Arc<Order>) {
        let bucket = self.bucket(order.exchange_id());
        let node = Box::into_raw(Box::new(Entry {
            order,
            next: ptr::null_mut(),
        }));
        let mut head = bucket.load(Ordering::Acquire);
        loop {
            // The candidate node is still exclusively ours until the CAS
            // lands, so patching its next pointer is safe.
            unsafe { (*node).next = head };
            match bucket.compare_exchange_weak(head, node, Ordering::Release, Ordering::Acquire) {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    /// Look up an order by exchange id.
    pub fn get(&self, exchange_id: u64) -> Option<Arc<Order>> {
        let mut current = self.bucket(exchange_id).load(Ordering::Acquire);
        while !current.is_null() {
            // Safety: published entries are live until Drop.
            let entry = unsafe { &*current };
            if entry.order.exchange_id() == exchange_id {
                return Some(Arc::clone(&entry.order));
            }
            current = entry.next;
        }
        None
    }

    /// Every order ever published, in no particular order. Introspection
    /// only; walks all buckets.
    pub fn all(&self) -> Vec<Arc<Order>> {
        let mut orders = Vec::new();
        for bucket in self.buckets.iter() {
            let mut current = bucket.load(Ordering::Acquire);
            while !current.is_null() {
                let entry = unsafe { &*current };
                orders.push(Arc::clone(&entry.order));
                current = entry.next;
            }
        }
        orders
    }

    /// Instrument names referenced by published orders (with repeats), for
    /// debugging.
    pub fn instruments(&self) -> Vec<String> {
        self.all()
            .iter()
            .map(|o| o.instrument().to_string())
            .collect()
    }
}

impl Default for OrderMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OrderMap {
    fn drop(&mut self) {
        for bucket in self.buckets.iter_mut() {
            let mut current = *bucket.get_mut();
            while !current.is_null() {
                // Safety: exclusive access; each node was Box::into_raw'd.
                let entry = unsafe { Box::from_raw(current) };
                current = entry.next;
            }
        }
    }
}

impl std::fmt::Debug for OrderMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderMap")
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;
    use crate::price::Px;
    use std::thread;

    fn order(id: u64, instrument: &str) -> Arc<Order> {
        Order::new(
            "s",
            "",
            Arc::from(instrument),
            Px::from_int(10),
            100,
            Side::Buy,
            id,
            false,
        )
    }

    #[test]
    fn test_add_then_get() {
        let map = OrderMap::with_buckets(64);
        map.add(order(1, "ACME"));
        assert_eq!(map.get(1).unwrap().exchange_id(), 1);
        assert!(map.get(2).is_none());
    }

    #[test]
    fn test_colliding_ids_chain_in_one_bucket() {
        // Bucket count 1: everything chains.
        let map = OrderMap::with_buckets(1);
        for id in 1..=100 {
            map.add(order(id, "ACME"));
        }
        for id in 1..=100 {
            assert_eq!(map.get(id).unwrap().exchange_id(), id);
        }
        assert!(map.get(101).is_none());
    }

    #[test]
    fn test_terminal_orders_stay_queryable() {
        let map = OrderMap::with_buckets(64);
        let o = order(1, "ACME");
        map.add(Arc::clone(&o));
        o.cancel();
        assert!(map.get(1).unwrap().is_cancelled());
    }

    #[test]
    fn test_all_walks_every_bucket() {
        let map = OrderMap::with_buckets(7);
        for id in 1..=20 {
            map.add(order(id, "ACME"));
        }
        let mut ids: Vec<u64> = map.all().iter().map(|o| o.exchange_id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
    }

    #[test]
    fn test_instruments_lists_referenced_names() {
        let map = OrderMap::with_buckets(8);
        map.add(order(1, "AAA"));
        map.add(order(2, "BBB"));
        let mut names = map.instruments();
        names.sort();
        assert_eq!(names, vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_concurrent_adds_lose_nothing() {
        let map = Arc::new(OrderMap::with_buckets(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..500u64 {
                        let id = t * 1000 + i + 1;
                        map.add(order(id, "ACME"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for t in 0..8u64 {
            for i in 0..500u64 {
                let id = t * 1000 + i + 1;
                assert_eq!(map.get(id).unwrap().exchange_id(), id);
            }
        }
        assert_eq!(map.all().len(), 4000);
    }
}
