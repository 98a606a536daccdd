//! Process-wide id allocation.
//!
//! Exchange ids and execution ids are handed out by static atomic counters:
//! wait-free, strictly monotonic, never reused, starting above zero. Ids
//! stay unique across every `Exchange` instance in the process, so an id
//! never refers to two different orders no matter how tests or embedders
//! wire things up.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_EXEC_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next order exchange id.
#[inline]
pub fn next_exchange_id() -> u64 {
    NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Allocate the next trade execution id.
#[inline]
pub fn next_exec_id() -> u64 {
    NEXT_EXEC_ID.fetch_add(1, Ordering::Relaxed)
}
