//! Blocklist
//!
//! Ordered map from source address to block strength (the epoch count that
//! caused the promotion, kept for reporting only). Read on every DNS query,
//! written only by the aggregator, so a reader-writer lock fits: readers never
//! contend with each other and each write holds the lock for a single map
//! operation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

use crate::error::{Result, ShieldError};
use crate::lock_utils::{read_lock_or_recover, write_lock_or_recover};

const LOCK_CONTEXT: &str = "dns shield blocklist";

/// One blocked source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub source: Ipv4Addr,
    pub strength: u32,
}

pub struct Blocklist {
    entries: RwLock<BTreeMap<Ipv4Addr, u32>>,
    max_entries: usize,
}

impl Blocklist {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            max_entries,
        }
    }

    /// Hot-path membership test
    #[inline]
    pub fn contains(&self, source: Ipv4Addr) -> bool {
        read_lock_or_recover(&self.entries, LOCK_CONTEXT).contains_key(&source)
    }

    /// Strength recorded at the last promotion
    pub fn strength(&self, source: Ipv4Addr) -> Option<u32> {
        read_lock_or_recover(&self.entries, LOCK_CONTEXT)
            .get(&source)
            .copied()
    }

    /// Insert or refresh an entry. Returns `true` if the source was not
    /// blocked before.
    pub fn upsert(&self, source: Ipv4Addr, strength: u32) -> Result<bool> {
        let mut entries = write_lock_or_recover(&self.entries, LOCK_CONTEXT);

        if let Some(existing) = entries.get_mut(&source) {
            *existing = strength;
            return Ok(false);
        }

        if entries.len() >= self.max_entries {
            return Err(ShieldError::exhausted("blocklist", self.max_entries));
        }

        entries.insert(source, strength);
        Ok(true)
    }

    /// Remove an entry; a no-op for unknown sources. Returns whether anything
    /// was removed.
    pub fn remove(&self, source: Ipv4Addr) -> bool {
        write_lock_or_recover(&self.entries, LOCK_CONTEXT)
            .remove(&source)
            .is_some()
    }

    /// Release every entry (shutdown). Returns how many were dropped.
    pub fn clear_all(&self) -> usize {
        let mut entries = write_lock_or_recover(&self.entries, LOCK_CONTEXT);
        let released = entries.len();
        entries.clear();
        released
    }

    pub fn len(&self) -> usize {
        read_lock_or_recover(&self.entries, LOCK_CONTEXT).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Consistent copy of all entries, ascending by address
    pub fn entries(&self) -> Vec<BlocklistEntry> {
        read_lock_or_recover(&self.entries, LOCK_CONTEXT)
            .iter()
            .map(|(source, strength)| BlocklistEntry {
                source: *source,
                strength: *strength,
            })
            .collect()
    }
}
