//! Lock-free instrument -> book table.
//!
//! A fixed-capacity open-addressed table of atomic slots. Keys hash to a
//! starting bucket and probe linearly; publication is a compare-and-swap of
//! a fully constructed book, so readers observe either an empty slot or a
//! complete book, never a partial one. Slots are write-once: a published
//! book stays at its slot for the life of the map, which is what makes the
//! reader side safe without any locking or epoch scheme.

use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use rustc_hash::FxHasher;
use thiserror::Error;

use crate::events::ExchangeListener;
use crate::order_book::OrderBook;

/// Default maximum number of instruments.
pub const MAX_INSTRUMENTS: usize = 1024;

/// Engine-internal failures. The public facade maps these to empty returns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("no room in the instrument table ({0} slots)")]
    BooksFull(usize),
}

/// Concurrent map of instrument name to its unique [`OrderBook`].
pub struct BookMap {
    slots: Box<[AtomicPtr<OrderBook>]>,
}

// Slots hold leaked Arc pointers that are only reclaimed in Drop, where we
// have exclusive access; concurrent readers only ever clone out of live
// slots. The raw pointers are what stops the auto-derive.
unsafe impl Send for BookMap {}
unsafe impl Sync for BookMap {}

impl BookMap {
    pub fn new() -> Self {
        Self::with_capacity(MAX_INSTRUMENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "instrument table cannot be empty");
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        BookMap { slots }
    }

    #[inline]
    fn start_slot(&self, instrument: &str) -> usize {
        let mut hasher = FxHasher::default();
        instrument.hash(&mut hasher);
        (hasher.finish() as usize) % self.slots.len()
    }

    /// Clone the Arc held in a non-empty slot.
    ///
    /// Safety: `p` was produced by `Arc::into_raw` and the slot keeps its
    /// own strong count until Drop, so the allocation is live.
    #[inline]
    fn clone_slot(p: *mut OrderBook) -> Arc<OrderBook> {
        unsafe {
            Arc::increment_strong_count(p);
            Arc::from_raw(p)
        }
    }

    /// Return the book for `instrument`, publishing a new one if none
    /// exists. Repeated calls with the same name always return the same
    /// book. Fails only when the table has no free slot left.
    pub fn get_or_create(
        &self,
        instrument: &str,
        listener: &Arc<dyn ExchangeListener>,
    ) -> Result<Arc<OrderBook>, EngineError> {
        let start = self.start_slot(instrument);
        let mut index = start;
        let mut current = self.slots[index].load(Ordering::SeqCst);
        if let Some(book) = Self::matching(current, instrument) {
            return Ok(book);
        }

        // Construct once, publish with CAS; a racing winner for the same
        // name makes this candidate a throwaway.
        let candidate = Arc::new(OrderBook::new(instrument, Arc::clone(listener)));
        loop {
            if current.is_null() {
                let raw = Arc::into_raw(Arc::clone(&candidate)) as *mut OrderBook;
                match self.slots[index].compare_exchange(
                    ptr::null_mut(),
                    raw,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => {
                        tracing::debug!(instrument, slot = index, "order book created");
                        return Ok(candidate);
                    }
                    Err(observed) => {
                        // Lost the race for this slot; give the extra
                        // strong count back and look at what won.
                        unsafe { drop(Arc::from_raw(raw)) };
                        current = observed;
                        if let Some(book) = Self::matching(current, instrument) {
                            return Ok(book);
                        }
                    }
                }
            } else {
                index = (index + 1) % self.slots.len();
                if index == start {
                    return Err(EngineError::BooksFull(self.slots.len()));
                }
                current = self.slots[index].load(Ordering::SeqCst);
                if let Some(book) = Self::matching(current, instrument) {
                    return Ok(book);
                }
            }
        }
    }

    /// Read-only lookup.
    pub fn get(&self, instrument: &str) -> Option<Arc<OrderBook>> {
        let start = self.start_slot(instrument);
        let mut index = start;
        loop {
            let current = self.slots[index].load(Ordering::SeqCst);
            if let Some(book) = Self::matching(current, instrument) {
                return Some(book);
            }
            index = (index + 1) % self.slots.len();
            if index == start {
                return None;
            }
        }
    }

    #[inline]
    fn matching(p: *mut OrderBook, instrument: &str) -> Option<Arc<OrderBook>> {
        if p.is_null() {
            return None;
        }
        // Safety: non-null slots hold live leaked Arcs (see clone_slot).
        if unsafe { (*p).instrument() } == instrument {
            Some(Self::clone_slot(p))
        } else {
            None
        }
    }

    /// Names of all instruments currently published.
    pub fn instruments(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let p = slot.load(Ordering::SeqCst);
                if p.is_null() {
                    None
                } else {
                    Some(unsafe { (*p).instrument() }.to_string())
                }
            })
            .collect()
    }
}

impl Default for BookMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BookMap {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let p = *slot.get_mut();
            if !p.is_null() {
                // Safety: exclusive access; this releases the slot's count.
                unsafe { drop(Arc::from_raw(p)) };
            }
        }
    }
}

impl std::fmt::Debug for BookMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookMap")
            .field("capacity", &self.slots.len())
            .field("instruments", &self.instruments().len())
            .finish()
    }
}
