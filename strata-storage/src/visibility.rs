// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Logical-deletion overlays for frozen edges.
//!
//! The max-visible-level map assigns each deleted edge the highest level at
//! which it is still yielded; an absent entry means the edge is visible
//! everywhere. Values only ever move down, and concurrent callers converge
//! to the minimum of all requested lowerings (the entry lock makes the
//! compare-and-lower atomic).
//!
//! The deletion map records the logical timestamp of the first delete of
//! each frozen edge since the last checkpoint; repeats keep the minimum,
//! which makes deletion idempotent.

use dashmap::DashMap;

use strata_core::{EdgeId, Timestamp};

type FastState = ahash::RandomState;

/// Per-edge watermark: the edge is invisible at any query level above its
/// entry.
#[derive(Debug, Default)]
pub struct VisibilityMap {
    map: DashMap<u64, u16, FastState>,
}

impl VisibilityMap {
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(FastState::new()),
        }
    }

    /// Lower `edge`'s watermark to `new_level`; no-op if it is already at
    /// or below. Returns whether the stored value changed.
    pub fn lower_only(&self, edge: EdgeId, new_level: u16) -> bool {
        debug_assert!(!edge.is_writable() && !edge.is_nil());
        debug_assert!(new_level >= edge.level());
        match self.map.entry(edge.raw()) {
            dashmap::mapref::entry::Entry::Occupied(mut e) => {
                if *e.get() > new_level {
                    *e.get_mut() = new_level;
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(new_level);
                true
            }
        }
    }

    /// Current watermark, or `None` when the edge has never been lowered.
    pub fn max_visible(&self, edge: EdgeId) -> Option<u16> {
        self.map.get(&edge.raw()).map(|v| *v)
    }

    /// Whether `edge` is yielded by queries pinned at `query_level`.
    #[inline]
    pub fn visible_at(&self, edge: EdgeId, query_level: u16) -> bool {
        match self.map.get(&edge.raw()) {
            Some(v) => *v >= query_level,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of all entries; test and stats support.
    pub fn entries(&self) -> Vec<(EdgeId, u16)> {
        self.map
            .iter()
            .map(|kv| (EdgeId::from_raw(*kv.key()), *kv.value()))
            .collect()
    }
}

/// First-delete timestamps for frozen edges, reset at every checkpoint.
#[derive(Debug, Default)]
pub struct DeletionMap {
    map: DashMap<u64, Timestamp, FastState>,
}

impl DeletionMap {
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(FastState::new()),
        }
    }

    /// Record a delete of `edge` at `ts`. Keeps the minimum timestamp;
    /// returns `true` only for the first record.
    pub fn mark(&self, edge: EdgeId, ts: Timestamp) -> bool {
        match self.map.entry(edge.raw()) {
            dashmap::mapref::entry::Entry::Occupied(mut e) => {
                if *e.get() > ts {
                    *e.get_mut() = ts;
                }
                false
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(ts);
                true
            }
        }
    }

    pub fn contains(&self, edge: EdgeId) -> bool {
        self.map.contains_key(&edge.raw())
    }

    pub fn deleted_at(&self, edge: EdgeId) -> Option<Timestamp> {
        self.map.get(&edge.raw()).map(|v| *v)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_entry_is_visible_everywhere() {
        let vis = VisibilityMap::new();
        let e = EdgeId::frozen(0, 3);
        assert!(vis.visible_at(e, 0));
        assert!(vis.visible_at(e, 9));
        assert_eq!(vis.max_visible(e), None);
    }

    #[test]
    fn test_lower_only_converges_to_minimum() {
        let vis = VisibilityMap::new();
        let e = EdgeId::frozen(0, 3);

        assert!(vis.lower_only(e, 4));
        assert!(vis.lower_only(e, 2));
        // Raising back up is a no-op.
        assert!(!vis.lower_only(e, 5));
        assert_eq!(vis.max_visible(e), Some(2));

        assert!(vis.visible_at(e, 2));
        assert!(!vis.visible_at(e, 3));
    }

    #[test]
    fn test_watermark_is_monotone_under_contention() {
        use std::sync::Arc;
        let vis = Arc::new(VisibilityMap::new());
        let e = EdgeId::frozen(0, 0);

        let handles: Vec<_> = (1..=8u16)
            .map(|lvl| {
                let vis = Arc::clone(&vis);
                std::thread::spawn(move || {
                    vis.lower_only(e, lvl);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(vis.max_visible(e), Some(1));
    }

    #[test]
    fn test_deletion_mark_keeps_minimum_timestamp() {
        let del = DeletionMap::new();
        let e = EdgeId::frozen(1, 0);

        assert!(del.mark(e, 10));
        assert!(!del.mark(e, 20));
        assert!(!del.mark(e, 5));
        assert_eq!(del.deleted_at(e), Some(5));
        assert_eq!(del.len(), 1);
    }
}
