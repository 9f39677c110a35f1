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

//! The multi-level CSR store.
//!
//! An ordered stack of immutable [`CsrLevel`]s (oldest first) with a
//! visibility overlay, property columns, and an optional reverse-direction
//! twin. A node's effective out-neighbors are the union over all visible
//! levels minus edges masked by the max-visible-level map.
//!
//! Only the checkpoint engine extends the stack. Publication is ordered:
//! property arrays and level slots are attached before the level count is
//! bumped with release semantics, and readers pin the count once per query
//! by taking a [`GraphSnapshot`]. A snapshot never exposes levels published
//! after it was taken, even while the store keeps advancing underneath it.
//! Retired levels are dropped from the stack but stay alive until the last
//! snapshot holding them goes away.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use strata_core::{EdgeId, NodeId, Result, StoreConfig};

use crate::level::{AdjacencyIter, CsrLevel};
use crate::props::{PropertyColumn, PropertyRegistry};
use crate::visibility::VisibilityMap;

/// One direction's stack of levels plus its visibility overlay. Retired
/// slots become `None`; indices are stable because frozen edge ids address
/// levels by position.
#[derive(Debug, Default)]
pub(crate) struct LevelStack {
    slots: RwLock<Vec<Option<Arc<CsrLevel>>>>,
    visibility: Arc<VisibilityMap>,
}

impl LevelStack {
    fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            visibility: Arc::new(VisibilityMap::new()),
        }
    }

    fn snapshot_slots(&self) -> Vec<Option<Arc<CsrLevel>>> {
        self.slots.read().clone()
    }

    fn push(&self, level: CsrLevel) {
        self.slots.write().push(Some(Arc::new(level)));
    }

    fn retire_below(&self, keep: usize) -> usize {
        let mut slots = self.slots.write();
        let cut = slots.len().saturating_sub(keep);
        let mut retired = 0;
        for slot in slots.iter_mut().take(cut) {
            if slot.take().is_some() {
                retired += 1;
            }
        }
        retired
    }
}

/// Multi-versioned graph store. See the module docs.
#[derive(Debug)]
pub struct MultiVersionGraph {
    cfg: StoreConfig,
    out: LevelStack,
    rev: Option<LevelStack>,
    num_levels: AtomicUsize,
    max_nodes: AtomicU32,
    props: Arc<PropertyRegistry>,
    publish_lock: Mutex<()>,
}

impl MultiVersionGraph {
    pub fn new(cfg: StoreConfig) -> Result<Self> {
        cfg.validate()?;
        let rev = cfg.reverse_edges.then(LevelStack::new);
        Ok(Self {
            cfg,
            out: LevelStack::new(),
            rev,
            num_levels: AtomicUsize::new(0),
            max_nodes: AtomicU32::new(0),
            props: Arc::new(PropertyRegistry::new()),
            publish_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.cfg
    }

    /// Published level count; snapshots pin this once per query.
    #[inline]
    pub fn num_levels(&self) -> usize {
        self.num_levels.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max_nodes(&self) -> NodeId {
        self.max_nodes.load(Ordering::Acquire)
    }

    pub fn has_reverse(&self) -> bool {
        self.rev.is_some()
    }

    pub fn properties(&self) -> &PropertyRegistry {
        &self.props
    }

    /// Out-direction max-visible-level overlay.
    pub fn visibility(&self) -> &VisibilityMap {
        &self.out.visibility
    }

    /// Reverse-direction overlay, when the twin exists.
    pub fn reverse_visibility(&self) -> Option<&VisibilityMap> {
        self.rev.as_ref().map(|s| &*s.visibility)
    }

    /// Lower an out-edge's watermark; concurrent callers converge to the
    /// minimum requested value.
    pub fn update_max_visible_level_lower_only(&self, edge: EdgeId, new_level: u16) -> bool {
        self.out.visibility.lower_only(edge, new_level)
    }

    /// Release level arrays older than the `n` most recent. Memory is
    /// actually freed when the last snapshot covering a retired level is
    /// dropped.
    pub fn keep_only_recent_versions(&self, n: usize) -> usize {
        let retired = self.out.retire_below(n);
        if let Some(rev) = &self.rev {
            rev.retire_below(n);
        }
        if retired > 0 {
            tracing::info!(retired, keep = n, "retired old levels");
        }
        retired
    }

    /// Attach a new level (and its reverse twin and property arrays) and
    /// make it visible to subsequent snapshots. Returns the new level's
    /// index.
    pub(crate) fn publish(
        &self,
        out_level: CsrLevel,
        rev_level: Option<CsrLevel>,
        columns: Vec<(Arc<PropertyColumn>, Vec<u64>)>,
    ) -> u16 {
        let _guard = self.publish_lock.lock();
        let level_index = self.num_levels.load(Ordering::Relaxed);
        let new_max = out_level.max_nodes();

        for (col, values) in columns {
            col.push_level(level_index, values);
        }
        debug_assert_eq!(rev_level.is_some(), self.rev.is_some());
        if let (Some(stack), Some(level)) = (&self.rev, rev_level) {
            stack.push(level);
        }
        self.out.push(out_level);

        self.max_nodes.fetch_max(new_max, Ordering::AcqRel);
        self.num_levels.store(level_index + 1, Ordering::Release);
        level_index as u16
    }

    /// Pin the current state for reading.
    pub fn snapshot(&self) -> GraphSnapshot {
        let out_levels = self.out.snapshot_slots();
        let rev_levels = self.rev.as_ref().map(|s| s.snapshot_slots());
        GraphSnapshot {
            max_nodes: self.max_nodes(),
            out_vis: Arc::clone(&self.out.visibility),
            rev_vis: self.rev.as_ref().map(|s| Arc::clone(&s.visibility)),
            props: Arc::clone(&self.props),
            out_levels,
            rev_levels,
        }
    }

    /// First visible `src -> dst` edge at the latest level.
    pub fn find(&self, src: NodeId, dst: NodeId) -> Option<EdgeId> {
        self.snapshot().find(src, dst)
    }
}

/// A read-only view pinned at the level count current when it was taken.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    out_levels: Vec<Option<Arc<CsrLevel>>>,
    rev_levels: Option<Vec<Option<Arc<CsrLevel>>>>,
    out_vis: Arc<VisibilityMap>,
    rev_vis: Option<Arc<VisibilityMap>>,
    props: Arc<PropertyRegistry>,
    max_nodes: NodeId,
}

impl GraphSnapshot {
    #[inline]
    pub fn num_levels(&self) -> usize {
        self.out_levels.len()
    }

    /// Index of the newest pinned level, or `None` for an empty store.
    #[inline]
    pub fn top_level(&self) -> Option<u16> {
        self.out_levels.len().checked_sub(1).map(|l| l as u16)
    }

    #[inline]
    pub fn max_nodes(&self) -> NodeId {
        self.max_nodes
    }

    pub fn has_reverse(&self) -> bool {
        self.rev_levels.is_some()
    }

    pub fn property(&self, name: &str) -> Option<Arc<PropertyColumn>> {
        self.props.get(name)
    }

    /// Level by index, if it is pinned and not retired.
    pub fn level(&self, index: u16) -> Option<&Arc<CsrLevel>> {
        self.out_levels.get(index as usize)?.as_ref()
    }

    /// Reverse-twin level by index.
    pub fn rev_level(&self, index: u16) -> Option<&Arc<CsrLevel>> {
        self.rev_levels.as_ref()?.get(index as usize)?.as_ref()
    }

    /// Whether a frozen out-edge is visible at this snapshot's top level.
    pub fn is_visible(&self, edge: EdgeId) -> bool {
        match self.top_level() {
            Some(top) => self.out_vis.visible_at(edge, top),
            None => false,
        }
    }

    /// Whether a frozen in-edge is visible at this snapshot's top level.
    pub fn is_visible_in(&self, edge: EdgeId) -> bool {
        match (self.top_level(), &self.rev_vis) {
            (Some(top), Some(vis)) => vis.visible_at(edge, top),
            _ => false,
        }
    }

    /// Head node of a frozen out-edge.
    pub fn head_of(&self, edge: EdgeId) -> Option<NodeId> {
        let level = self.level(edge.level())?;
        Some(level.head(edge.index()))
    }

    /// Visible out-neighbors of `v` across all pinned levels, newest level
    /// first. Cross-level order is an implementation detail; within one
    /// level the frozen order is kept.
    pub fn out_iter(&self, v: NodeId) -> MultiLevelIter<'_> {
        MultiLevelIter::new(&self.out_levels, &self.out_vis, v)
    }

    /// Like [`out_iter`](Self::out_iter) but pinned at an older level:
    /// only levels `0..=at_level` are walked and visibility is evaluated
    /// at `at_level`.
    pub fn out_iter_at(&self, v: NodeId, at_level: u16) -> MultiLevelIter<'_> {
        let end = (at_level as usize + 1).min(self.out_levels.len());
        MultiLevelIter::new(&self.out_levels[..end], &self.out_vis, v)
    }

    /// Visible in-neighbors of `v`, when the reverse twin exists.
    pub fn in_iter(&self, v: NodeId) -> Option<MultiLevelIter<'_>> {
        let levels = self.rev_levels.as_deref()?;
        let vis = self.rev_vis.as_ref()?;
        Some(MultiLevelIter::new(levels, vis, v))
    }

    /// Reverse counterpart of [`out_iter_at`](Self::out_iter_at).
    pub fn in_iter_at(&self, v: NodeId, at_level: u16) -> Option<MultiLevelIter<'_>> {
        let levels = self.rev_levels.as_deref()?;
        let vis = self.rev_vis.as_ref()?;
        let end = (at_level as usize + 1).min(levels.len());
        Some(MultiLevelIter::new(&levels[..end], vis, v))
    }

    /// Visible out-degree of `v` at this snapshot.
    pub fn out_degree(&self, v: NodeId) -> usize {
        self.out_iter(v).count()
    }

    pub fn in_degree(&self, v: NodeId) -> Option<usize> {
        self.in_iter(v).map(|it| it.count())
    }

    /// Heads of `v`'s visible out-edges; convenience for tests and
    /// analytics that want materialized lists.
    pub fn out_neighbors(&self, v: NodeId) -> Vec<NodeId> {
        self.out_iter(v).map(|(_, head)| head).collect()
    }

    /// First visible `src -> dst` match, scanning the most recent level
    /// first and using binary search within sorted levels.
    pub fn find(&self, src: NodeId, dst: NodeId) -> Option<EdgeId> {
        let top = self.top_level()?;
        for lvl in (0..=top).rev() {
            if let Some(level) = self.level(lvl) {
                if let Some(index) = level.find(src, dst) {
                    let edge = EdgeId::frozen(lvl, index);
                    if self.out_vis.visible_at(edge, top) {
                        return Some(edge);
                    }
                }
            }
        }
        None
    }

    /// Reverse-direction `find` over the twin: first visible `dst <- src`.
    pub fn find_in(&self, dst: NodeId, src: NodeId) -> Option<EdgeId> {
        let levels = self.rev_levels.as_deref()?;
        let vis = self.rev_vis.as_ref()?;
        let top = levels.len().checked_sub(1)? as u16;
        for lvl in (0..=top).rev() {
            if let Some(level) = levels.get(lvl as usize)?.as_ref() {
                if let Some(index) = level.find(dst, src) {
                    let edge = EdgeId::frozen(lvl, index);
                    if vis.visible_at(edge, top) {
                        return Some(edge);
                    }
                }
            }
        }
        None
    }
}

/// Iterator over one vertex's visible edges across levels: a level cursor,
/// a within-level cursor, and nothing else.
#[derive(Debug)]
pub struct MultiLevelIter<'a> {
    levels: &'a [Option<Arc<CsrLevel>>],
    visibility: &'a VisibilityMap,
    query_level: u16,
    v: NodeId,
    /// Next level to open, walking downward. `None` once exhausted.
    level_cursor: Option<u16>,
    inner: Option<(u16, AdjacencyIter<'a>)>,
}

impl<'a> MultiLevelIter<'a> {
    fn new(levels: &'a [Option<Arc<CsrLevel>>], visibility: &'a VisibilityMap, v: NodeId) -> Self {
        let top = levels.len().checked_sub(1).map(|l| l as u16);
        Self {
            levels,
            visibility,
            query_level: top.unwrap_or(0),
            v,
            level_cursor: top,
            inner: None,
        }
    }
}

impl<'a> Iterator for MultiLevelIter<'a> {
    /// `(edge id, head)`
    type Item = (EdgeId, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((lvl, iter)) = &mut self.inner {
                for (index, head) in iter.by_ref() {
                    let edge = EdgeId::frozen(*lvl, index);
                    if self.visibility.visible_at(edge, self.query_level) {
                        return Some((edge, head));
                    }
                }
                self.inner = None;
            }

            let lvl = self.level_cursor?;
            self.level_cursor = lvl.checked_sub(1);
            if let Some(level) = self.levels[lvl as usize].as_ref() {
                self.inner = Some((lvl, level.neighbors(self.v)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::StoreConfig;

    fn store(reverse: bool) -> MultiVersionGraph {
        MultiVersionGraph::new(StoreConfig {
            reverse_edges: reverse,
            ..StoreConfig::default()
        })
        .unwrap()
    }

    fn publish_pairs(g: &MultiVersionGraph, max_nodes: NodeId, pairs: &[(NodeId, NodeId)]) -> u16 {
        let mut sorted = pairs.to_vec();
        sorted.sort_unstable();
        let out = CsrLevel::from_sorted_edges(max_nodes, sorted.iter().copied(), true);
        let rev = g.has_reverse().then(|| {
            let mut flipped: Vec<_> = pairs.iter().map(|&(t, h)| (h, t)).collect();
            flipped.sort_unstable();
            CsrLevel::from_sorted_edges(max_nodes, flipped, true)
        });
        g.publish(out, rev, Vec::new())
    }

    #[test]
    fn test_publish_bumps_level_count() {
        let g = store(false);
        assert_eq!(g.num_levels(), 0);
        let idx = publish_pairs(&g, 3, &[(0, 1), (1, 2)]);
        assert_eq!(idx, 0);
        assert_eq!(g.num_levels(), 1);
        assert_eq!(g.max_nodes(), 3);
    }

    #[test]
    fn test_union_across_levels() {
        let g = store(false);
        publish_pairs(&g, 3, &[(0, 1), (1, 2)]);
        publish_pairs(&g, 3, &[(0, 2)]);

        let snap = g.snapshot();
        let mut heads = snap.out_neighbors(0);
        heads.sort_unstable();
        assert_eq!(heads, vec![1, 2]);
        assert_eq!(snap.out_degree(1), 1);
    }

    #[test]
    fn test_snapshot_is_pinned_against_later_levels() {
        let g = store(false);
        publish_pairs(&g, 2, &[(0, 1)]);
        let snap = g.snapshot();

        publish_pairs(&g, 3, &[(0, 2)]);
        assert_eq!(g.num_levels(), 2);

        assert_eq!(snap.num_levels(), 1);
        assert_eq!(snap.out_neighbors(0), vec![1]);
        // A fresh snapshot sees both.
        assert_eq!(g.snapshot().out_degree(0), 2);
    }

    #[test]
    fn test_find_prefers_newest_level() {
        let g = store(false);
        publish_pairs(&g, 3, &[(0, 2)]);
        publish_pairs(&g, 3, &[(0, 2)]);

        let e = g.find(0, 2).unwrap();
        assert_eq!(e.level(), 1);
    }

    #[test]
    fn test_masked_edge_is_skipped() {
        let g = store(false);
        publish_pairs(&g, 3, &[(0, 1), (0, 2)]);
        publish_pairs(&g, 3, &[]);

        let victim = g.find(0, 1).unwrap();
        assert_eq!(victim.level(), 0);
        g.update_max_visible_level_lower_only(victim, 0);

        let snap = g.snapshot();
        assert_eq!(snap.out_neighbors(0), vec![2]);
        assert_eq!(snap.find(0, 1), None);
    }

    #[test]
    fn test_retired_levels_vanish_from_new_snapshots() {
        let g = store(false);
        publish_pairs(&g, 2, &[(0, 1)]);
        let old = g.snapshot();
        publish_pairs(&g, 2, &[(1, 0)]);

        assert_eq!(g.keep_only_recent_versions(1), 1);

        // The old snapshot still reads the retired level.
        assert_eq!(old.out_neighbors(0), vec![1]);
        // New snapshots do not.
        let fresh = g.snapshot();
        assert_eq!(fresh.out_neighbors(0), Vec::<NodeId>::new());
        assert_eq!(fresh.out_neighbors(1), vec![0]);
        // Level indices stay stable for surviving levels.
        assert_eq!(fresh.find(1, 0).unwrap().level(), 1);
    }

    #[test]
    fn test_reverse_twin_mirrors_out_edges() {
        let g = store(true);
        publish_pairs(&g, 3, &[(0, 1), (2, 1)]);

        let snap = g.snapshot();
        let mut ins: Vec<_> = snap.in_iter(1).unwrap().map(|(_, t)| t).collect();
        ins.sort_unstable();
        assert_eq!(ins, vec![0, 2]);
        assert!(snap.find_in(1, 2).is_some());
    }

    #[test]
    fn test_empty_store_queries() {
        let g = store(false);
        let snap = g.snapshot();
        assert_eq!(snap.top_level(), None);
        assert_eq!(snap.out_degree(0), 0);
        assert_eq!(snap.find(0, 1), None);
    }
}
