//! Rate Ledger
//!
//! A fixed ring of the most recently observed query sources. The hot path
//! claims a slot with one atomic increment and writes it with one 64-bit
//! store, so concurrent recorders never share a slot and no reader ever sees
//! half an address. The aggregator turns the ring into per-source counts
//! once per epoch.
//!
//! The ring is not cleared by a drain unless configured to: counts describe
//! the trailing window of recorded events, not a wall-clock epoch.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::{Result, ShieldError};

/// Marks a slot as holding a sample; the low 32 bits are the address.
const OCCUPIED: u64 = 1 << 32;

/// Per-source sample counts for one epoch, ascending by address
pub type EpochCounts = BTreeMap<Ipv4Addr, u32>;

pub struct RateLedger {
    slots: Box<[AtomicU64]>,
    cursor: AtomicUsize,
    max_entries: usize,
    clear_on_drain: bool,
}

impl RateLedger {
    /// Create a ledger with `window_size` ring slots.
    ///
    /// `max_entries` bounds the number of distinct sources a drain may
    /// materialize; `window_size` must be non-zero.
    pub fn new(window_size: usize, max_entries: usize, clear_on_drain: bool) -> Self {
        let slots = (0..window_size.max(1)).map(|_| AtomicU64::new(0)).collect();

        Self {
            slots,
            cursor: AtomicUsize::new(0),
            max_entries,
            clear_on_drain,
        }
    }

    /// Ring capacity
    pub fn window_size(&self) -> usize {
        self.slots.len()
    }

    /// Record one query from `source`. O(1), lock-free.
    #[inline]
    pub fn record(&self, source: Ipv4Addr) {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.slots[index].store(OCCUPIED | u64::from(u32::from(source)), Ordering::Release);
    }

    /// Total number of `record` calls since creation or the last `reset`
    pub fn recorded(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Current ring contents, oldest first
    pub fn snapshot(&self) -> Vec<Ipv4Addr> {
        let len = self.slots.len();
        let start = self.cursor.load(Ordering::Acquire) % len;

        (0..len)
            .filter_map(|offset| decode(self.slots[(start + offset) % len].load(Ordering::Acquire)))
            .collect()
    }

    /// Turn the ring into per-source counts for this epoch.
    ///
    /// Fails without side effects on the caller's state when more than
    /// `max_entries` distinct sources would be materialized.
    pub fn drain_and_reset(&self) -> Result<EpochCounts> {
        let mut counts = EpochCounts::new();

        for slot in self.slots.iter() {
            let raw = if self.clear_on_drain {
                slot.swap(0, Ordering::AcqRel)
            } else {
                slot.load(Ordering::Acquire)
            };

            let Some(source) = decode(raw) else {
                continue;
            };

            if let Some(count) = counts.get_mut(&source) {
                *count += 1;
                continue;
            }

            if counts.len() >= self.max_entries {
                return Err(ShieldError::exhausted("rate ledger", self.max_entries));
            }
            counts.insert(source, 1);
        }

        Ok(counts)
    }

    /// Forget every sample (teardown)
    pub fn reset(&self) {
        for slot in self.slots.iter() {
            slot.store(0, Ordering::Release);
        }
        self.cursor.store(0, Ordering::Release);
    }
}

#[inline]
fn decode(raw: u64) -> Option<Ipv4Addr> {
    if raw & OCCUPIED == 0 {
        None
    } else {
        Some(Ipv4Addr::from(raw as u32))
    }
}
