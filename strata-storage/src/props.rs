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

//! Edge property columns.
//!
//! A column is a family of per-level arrays parallel to each level's edge
//! table, addressed by `(edge.level, edge.index)`, plus a writable overflow
//! for edges still in the delta. Frozen arrays are written exactly once,
//! during checkpoint; updates to live edges land in the overflow and
//! migrate into the next level's array when the edge is promoted.
//!
//! Columns are 32- or 64-bit; the accessor widens to `u64` and callers
//! reinterpret (the `weight` column stores `f32` bits).

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use strata_core::EdgeId;

/// Reserved column fed by weighted sources and the duplicate-squash mode.
pub const WEIGHT_COLUMN: &str = "weight";

/// Reserved u64 columns mapping each out-edge to its reverse twin and
/// back, built by the checkpoint when id correspondence is enabled.
pub const OUT_TO_IN_COLUMN: &str = "out_to_in";
pub const IN_TO_OUT_COLUMN: &str = "in_to_out";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    U32,
    U64,
}

#[derive(Debug)]
enum ColumnLevels {
    U32(Vec<Arc<Vec<u32>>>),
    U64(Vec<Arc<Vec<u64>>>),
}

impl ColumnLevels {
    fn len(&self) -> usize {
        match self {
            ColumnLevels::U32(v) => v.len(),
            ColumnLevels::U64(v) => v.len(),
        }
    }

    fn get(&self, level: usize, index: usize) -> Option<u64> {
        match self {
            ColumnLevels::U32(v) => v.get(level)?.get(index).map(|&x| x as u64),
            ColumnLevels::U64(v) => v.get(level)?.get(index).copied(),
        }
    }

    fn push(&mut self, values: Vec<u64>) {
        match self {
            ColumnLevels::U32(v) => {
                v.push(Arc::new(values.into_iter().map(|x| x as u32).collect()))
            }
            ColumnLevels::U64(v) => v.push(Arc::new(values)),
        }
    }

    fn push_empty(&mut self) {
        match self {
            ColumnLevels::U32(v) => v.push(Arc::new(Vec::new())),
            ColumnLevels::U64(v) => v.push(Arc::new(Vec::new())),
        }
    }
}

/// One named, typed edge property.
#[derive(Debug)]
pub struct PropertyColumn {
    name: String,
    kind: ColumnKind,
    levels: RwLock<ColumnLevels>,
    overflow: DashMap<u64, u64, ahash::RandomState>,
}

impl PropertyColumn {
    fn new(name: String, kind: ColumnKind) -> Self {
        let levels = match kind {
            ColumnKind::U32 => ColumnLevels::U32(Vec::new()),
            ColumnKind::U64 => ColumnLevels::U64(Vec::new()),
        };
        Self {
            name,
            kind,
            levels: RwLock::new(levels),
            overflow: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// Value for `edge`, widened to `u64`. `None` when the edge has no
    /// value in this column.
    pub fn get(&self, edge: EdgeId) -> Option<u64> {
        if edge.is_nil() {
            return None;
        }
        if edge.is_writable() {
            return self.overflow.get(&edge.raw()).map(|v| *v);
        }
        self.levels
            .read()
            .get(edge.level() as usize, edge.index() as usize)
    }

    /// Set the value of a delta-resident edge.
    ///
    /// # Panics
    ///
    /// Panics if `edge` is frozen; frozen arrays are immutable and only
    /// the checkpoint writes them.
    pub fn set_writable(&self, edge: EdgeId, value: u64) {
        assert!(edge.is_writable(), "frozen property arrays are immutable");
        self.overflow.insert(edge.raw(), value);
    }

    /// Add `delta` to a delta-resident edge's value (missing counts as 0).
    pub fn add_writable(&self, edge: EdgeId, delta: u64) {
        assert!(edge.is_writable(), "frozen property arrays are immutable");
        *self.overflow.entry(edge.raw()).or_insert(0) += delta;
    }

    /// Remove and return the overflow value of a promoted edge.
    pub(crate) fn take_writable(&self, edge: EdgeId) -> Option<u64> {
        self.overflow.remove(&edge.raw()).map(|(_, v)| v)
    }

    /// Attach the frozen array for level `level_index`, padding any levels
    /// published before this column existed with empty arrays.
    pub(crate) fn push_level(&self, level_index: usize, values: Vec<u64>) {
        let mut levels = self.levels.write();
        while levels.len() < level_index {
            levels.push_empty();
        }
        debug_assert_eq!(levels.len(), level_index);
        levels.push(values);
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }
}

/// The set of columns attached to one store. Registration is serialized by
/// a single lock; readers clone `Arc`s out and never hold it.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    columns: Mutex<Vec<Arc<PropertyColumn>>>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a column. An existing name wins regardless of the
    /// requested kind.
    pub fn register(&self, name: &str, kind: ColumnKind) -> Arc<PropertyColumn> {
        let mut cols = self.columns.lock();
        if let Some(col) = cols.iter().find(|c| c.name == name) {
            return Arc::clone(col);
        }
        let col = Arc::new(PropertyColumn::new(name.to_string(), kind));
        cols.push(Arc::clone(&col));
        col
    }

    pub fn get(&self, name: &str) -> Option<Arc<PropertyColumn>> {
        self.columns.lock().iter().find(|c| c.name == name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<PropertyColumn>> {
        self.columns.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.columns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let reg = PropertyRegistry::new();
        let a = reg.register("weight", ColumnKind::U32);
        let b = reg.register("weight", ColumnKind::U32);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_writable_overflow_roundtrip() {
        let col = PropertyColumn::new("weight".into(), ColumnKind::U32);
        let e = EdgeId::writable(5);
        assert_eq!(col.get(e), None);
        col.set_writable(e, 7);
        assert_eq!(col.get(e), Some(7));
        col.add_writable(e, 3);
        assert_eq!(col.get(e), Some(10));
        assert_eq!(col.take_writable(e), Some(10));
        assert_eq!(col.get(e), None);
    }

    #[test]
    fn test_frozen_lookup_by_level_and_index() {
        let col = PropertyColumn::new("ts".into(), ColumnKind::U64);
        col.push_level(0, vec![10, 20, 30]);
        col.push_level(1, vec![40]);

        assert_eq!(col.get(EdgeId::frozen(0, 2)), Some(30));
        assert_eq!(col.get(EdgeId::frozen(1, 0)), Some(40));
        assert_eq!(col.get(EdgeId::frozen(1, 1)), None);
        assert_eq!(col.get(EdgeId::frozen(2, 0)), None);
    }

    #[test]
    fn test_late_registration_pads_missing_levels() {
        let col = PropertyColumn::new("w".into(), ColumnKind::U32);
        // Column registered after two levels already exist.
        col.push_level(2, vec![1, 2]);
        assert_eq!(col.get(EdgeId::frozen(0, 0)), None);
        assert_eq!(col.get(EdgeId::frozen(2, 1)), Some(2));
    }

    #[test]
    fn test_u32_column_narrows_storage() {
        let col = PropertyColumn::new("w".into(), ColumnKind::U32);
        col.push_level(0, vec![0xFFFF_FFFF]);
        assert_eq!(col.get(EdgeId::frozen(0, 0)), Some(0xFFFF_FFFF));
        assert_eq!(col.kind(), ColumnKind::U32);
    }
}
