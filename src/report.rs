//! Blocklist reporting surface
//!
//! Read-only view over the blocklist, rendered as `<address> <count>` lines
//! in ascending address order or as JSON.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::blocklist::{Blocklist, BlocklistEntry};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocklistReport {
    pub entries: Vec<BlocklistEntry>,
}

impl BlocklistReport {
    /// Snapshot the blocklist through its read path
    pub fn capture(blocklist: &Blocklist) -> Self {
        Self {
            entries: blocklist.entries(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 24);
        for entry in &self.entries {
            let _ = writeln!(out, "{} {}", entry.source, entry.strength);
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
