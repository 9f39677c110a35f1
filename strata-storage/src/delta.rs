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

//! The writable delta layer.
//!
//! Absorbs single-edge mutations between checkpoints. Edge records live in
//! a chunked arena addressed by a 48-bit slot packed into a writable-tagged
//! [`EdgeId`]; each touched node keeps the heads of two slot chains (out
//! and in) in reverse insertion order, a pair of live counters, and a lock.
//! When two vertices are involved the locks are always taken in ascending
//! node-id order. Back-references are plain slot indices into the same
//! arena, so nothing here is cyclic.
//!
//! Deletes of frozen edges do not touch the frozen arrays: they record the
//! first-delete timestamp in a per-direction deletion map and lower the
//! edge's max-visible-level watermark, which hides it from the current top
//! level onward while strictly older levels keep their history.
//!
//! The arena is freed only at checkpoint boundaries, never per edge.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use smallvec::SmallVec;

use strata_core::{EdgeId, IngestContext, NodeId, Timestamp};

use crate::props::{ColumnKind, PropertyColumn, WEIGHT_COLUMN};
use crate::store::{GraphSnapshot, MultiVersionGraph};
use crate::visibility::DeletionMap;

const CHUNK_BITS: u32 = 16;
const CHUNK_SIZE: usize = 1 << CHUNK_BITS;

/// Arena chain terminator.
const NIL_SLOT: u64 = u64::MAX;

/// One pending edge record. Fields are atomics because the record is
/// published to readers through a release store of the list head; only the
/// `deleted` pair changes after publication.
struct EdgeSlot {
    src: AtomicU32,
    dst: AtomicU32,
    prev_out: AtomicU64,
    prev_in: AtomicU64,
    created: AtomicU32,
    deleted: AtomicBool,
    deleted_at: AtomicU32,
}

impl EdgeSlot {
    fn vacant() -> Self {
        Self {
            src: AtomicU32::new(0),
            dst: AtomicU32::new(0),
            prev_out: AtomicU64::new(NIL_SLOT),
            prev_in: AtomicU64::new(NIL_SLOT),
            created: AtomicU32::new(0),
            deleted: AtomicBool::new(false),
            deleted_at: AtomicU32::new(0),
        }
    }
}

type Chunk = Box<[EdgeSlot]>;

/// Chunked slab of edge records. Slots are handed out by a fetch-add
/// counter; chunks are appended under a short write lock when the counter
/// crosses a chunk boundary.
struct EdgeArena {
    chunks: RwLock<Vec<Arc<Chunk>>>,
    next: AtomicU64,
}

impl EdgeArena {
    fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            next: AtomicU64::new(0),
        }
    }

    fn alloc(&self) -> u64 {
        let slot = self.next.fetch_add(1, Ordering::Relaxed);
        let chunk_idx = (slot >> CHUNK_BITS) as usize;
        loop {
            if self.chunks.read().len() > chunk_idx {
                return slot;
            }
            let mut chunks = self.chunks.write();
            while chunks.len() <= chunk_idx {
                let fresh: Vec<EdgeSlot> = (0..CHUNK_SIZE).map(|_| EdgeSlot::vacant()).collect();
                chunks.push(Arc::new(fresh.into_boxed_slice()));
            }
        }
    }

    fn chunk(&self, slot: u64) -> Arc<Chunk> {
        Arc::clone(&self.chunks.read()[(slot >> CHUNK_BITS) as usize])
    }

    fn reset(&self) {
        self.chunks.write().clear();
        self.next.store(0, Ordering::Relaxed);
    }
}

/// A borrowed view of one record.
struct SlotRef {
    chunk: Arc<Chunk>,
    offset: usize,
}

impl SlotRef {
    fn get(&self) -> &EdgeSlot {
        &self.chunk[self.offset]
    }
}

/// Node lifecycle within the delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    /// Slot exists (an id below a touched one) but nothing referenced it.
    Untouched = 0,
    Alive = 1,
    Deleted = 2,
}

/// Per-node delta record.
struct NodeDelta {
    lock: Mutex<()>,
    out_head: AtomicU64,
    in_head: AtomicU64,
    out_live: AtomicU32,
    in_live: AtomicU32,
    state: AtomicU8,
    created: AtomicU32,
    deleted_at: AtomicU32,
}

impl NodeDelta {
    fn vacant() -> Self {
        Self {
            lock: Mutex::new(()),
            out_head: AtomicU64::new(NIL_SLOT),
            in_head: AtomicU64::new(NIL_SLOT),
            out_live: AtomicU32::new(0),
            in_live: AtomicU32::new(0),
            state: AtomicU8::new(NodeState::Untouched as u8),
            created: AtomicU32::new(0),
            deleted_at: AtomicU32::new(0),
        }
    }

    fn state(&self) -> NodeState {
        match self.state.load(Ordering::Acquire) {
            1 => NodeState::Alive,
            2 => NodeState::Deleted,
            _ => NodeState::Untouched,
        }
    }
}

/// Mutation counters accumulated since the last checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaStats {
    pub new_nodes: u64,
    /// Live (not yet deleted) edges pending promotion.
    pub live_edges: u64,
    pub deleted_new_edges: u64,
    pub deleted_frozen_edges: u64,
}

impl DeltaStats {
    pub fn is_clean(&self) -> bool {
        self.new_nodes == 0
            && self.live_edges == 0
            && self.deleted_new_edges == 0
            && self.deleted_frozen_edges == 0
    }
}

/// The writable graph: the delta plus a handle to the frozen store it
/// overlays.
pub struct WritableGraph {
    graph: Arc<MultiVersionGraph>,
    ctx: Arc<IngestContext>,
    arena: EdgeArena,
    nodes: RwLock<Vec<Arc<NodeDelta>>>,
    /// Frozen id space as of the last checkpoint; ids at or above it count
    /// as new nodes when first touched.
    frozen_max_nodes: AtomicU32,
    new_nodes: AtomicU64,
    live_edges: AtomicU64,
    deleted_new_edges: AtomicU64,
    deleted_frozen_edges: AtomicU64,
    del_out: DeletionMap,
    del_in: DeletionMap,
    /// Mutators hold this shared; the checkpoint holds it exclusively
    /// while it walks and clears the delta.
    freeze: RwLock<()>,
    /// Checkpoint epoch, bumped on every clear.
    generation: AtomicUsize,
}

impl WritableGraph {
    pub fn new(graph: Arc<MultiVersionGraph>, ctx: Arc<IngestContext>) -> Self {
        let frozen = graph.max_nodes();
        Self {
            graph,
            ctx,
            arena: EdgeArena::new(),
            nodes: RwLock::new(Vec::new()),
            frozen_max_nodes: AtomicU32::new(frozen),
            new_nodes: AtomicU64::new(0),
            live_edges: AtomicU64::new(0),
            deleted_new_edges: AtomicU64::new(0),
            deleted_frozen_edges: AtomicU64::new(0),
            del_out: DeletionMap::new(),
            del_in: DeletionMap::new(),
            freeze: RwLock::new(()),
            generation: AtomicUsize::new(0),
        }
    }

    /// Exclusive hold for the checkpoint: no mutator runs while this guard
    /// lives.
    pub(crate) fn freeze_exclusive(&self) -> parking_lot::RwLockWriteGuard<'_, ()> {
        self.freeze.write()
    }

    pub fn store(&self) -> &Arc<MultiVersionGraph> {
        &self.graph
    }

    pub fn context(&self) -> &IngestContext {
        &self.ctx
    }

    /// Id space covered by delta and frozen store together.
    pub fn max_nodes(&self) -> NodeId {
        (self.nodes.read().len() as NodeId).max(self.frozen_max_nodes.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> DeltaStats {
        DeltaStats {
            new_nodes: self.new_nodes.load(Ordering::Relaxed),
            live_edges: self.live_edges.load(Ordering::Relaxed),
            deleted_new_edges: self.deleted_new_edges.load(Ordering::Relaxed),
            deleted_frozen_edges: self.deleted_frozen_edges.load(Ordering::Relaxed),
        }
    }

    /// Checkpoint epoch; bumped every time the delta is cleared.
    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Acquire)
    }

    pub fn node_state(&self, v: NodeId) -> NodeState {
        self.nodes
            .read()
            .get(v as usize)
            .map(|n| n.state())
            .unwrap_or(NodeState::Untouched)
    }

    fn slot_ref(&self, slot: u64) -> SlotRef {
        SlotRef {
            chunk: self.arena.chunk(slot),
            offset: (slot & (CHUNK_SIZE as u64 - 1)) as usize,
        }
    }

    fn node(&self, v: NodeId) -> Option<Arc<NodeDelta>> {
        self.nodes.read().get(v as usize).cloned()
    }

    fn ensure_node(&self, v: NodeId) -> Arc<NodeDelta> {
        if let Some(n) = self.node(v) {
            return n;
        }
        let mut nodes = self.nodes.write();
        while nodes.len() <= v as usize {
            nodes.push(Arc::new(NodeDelta::vacant()));
        }
        Arc::clone(&nodes[v as usize])
    }

    fn mark_alive(&self, v: NodeId, node: &NodeDelta) {
        if node
            .state
            .compare_exchange(
                NodeState::Untouched as u8,
                NodeState::Alive as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            node.created.store(self.ctx.now(), Ordering::Relaxed);
            if v >= self.frozen_max_nodes.load(Ordering::Acquire) {
                self.new_nodes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Create (or revive a reference to) node `v`.
    pub fn add_node(&self, v: NodeId) {
        let _ingest = self.freeze.read();
        let node = self.ensure_node(v);
        self.mark_alive(v, &node);
    }

    /// Lock the endpoint records in ascending node-id order.
    fn lock_pair<'a>(
        &self,
        src: NodeId,
        src_node: &'a NodeDelta,
        dst: NodeId,
        dst_node: &'a NodeDelta,
    ) -> (MutexGuard<'a, ()>, Option<MutexGuard<'a, ()>>) {
        if src == dst {
            (src_node.lock.lock(), None)
        } else if src < dst {
            let a = src_node.lock.lock();
            let b = dst_node.lock.lock();
            (a, Some(b))
        } else {
            let b = dst_node.lock.lock();
            let a = src_node.lock.lock();
            (a, Some(b))
        }
    }

    fn push_record(&self, src: NodeId, src_node: &NodeDelta, dst: NodeId, dst_node: &NodeDelta) -> EdgeId {
        let slot = self.arena.alloc();
        let rec = self.slot_ref(slot);
        let rec = rec.get();
        rec.src.store(src, Ordering::Relaxed);
        rec.dst.store(dst, Ordering::Relaxed);
        rec.created.store(self.ctx.now(), Ordering::Relaxed);
        rec.deleted.store(false, Ordering::Relaxed);
        rec.prev_out
            .store(src_node.out_head.load(Ordering::Relaxed), Ordering::Relaxed);
        rec.prev_in
            .store(dst_node.in_head.load(Ordering::Relaxed), Ordering::Relaxed);

        // Publish: readers that observe the new head see fully written
        // fields.
        src_node.out_head.store(slot, Ordering::Release);
        dst_node.in_head.store(slot, Ordering::Release);

        src_node.out_live.fetch_add(1, Ordering::Relaxed);
        dst_node.in_live.fetch_add(1, Ordering::Relaxed);
        self.live_edges.fetch_add(1, Ordering::Relaxed);
        EdgeId::writable(slot)
    }

    /// Append a `src -> dst` edge and return its writable-tagged id.
    pub fn add_edge(&self, src: NodeId, dst: NodeId) -> EdgeId {
        let _ingest = self.freeze.read();
        let src_node = self.ensure_node(src);
        let dst_node = self.ensure_node(dst);
        self.mark_alive(src, &src_node);
        self.mark_alive(dst, &dst_node);

        let _guards = self.lock_pair(src, &src_node, dst, &dst_node);
        self.push_record(src, &src_node, dst, &dst_node)
    }

    /// Pending live `src -> dst` edge in the delta, if any.
    pub fn probe_writable(&self, src: NodeId, dst: NodeId) -> Option<EdgeId> {
        let node = self.node(src)?;
        let mut cursor = node.out_head.load(Ordering::Acquire);
        while cursor != NIL_SLOT {
            let rec = self.slot_ref(cursor);
            let rec = rec.get();
            if rec.dst.load(Ordering::Relaxed) == dst && !rec.deleted.load(Ordering::Acquire) {
                return Some(EdgeId::writable(cursor));
            }
            cursor = rec.prev_out.load(Ordering::Relaxed);
        }
        None
    }

    /// Insert `src -> dst` unless a visible copy already exists in the
    /// frozen levels or the delta. Returns the edge and whether it was
    /// newly created.
    pub fn add_edge_if_not_exists(&self, src: NodeId, dst: NodeId) -> (EdgeId, bool) {
        let _ingest = self.freeze.read();
        let src_node = self.ensure_node(src);
        let dst_node = self.ensure_node(dst);

        let _guards = self.lock_pair(src, &src_node, dst, &dst_node);
        if let Some(existing) = self.probe_frozen(src, dst) {
            return (existing, false);
        }
        if let Some(existing) = self.probe_writable(src, dst) {
            return (existing, false);
        }
        self.mark_alive(src, &src_node);
        self.mark_alive(dst, &dst_node);
        (self.push_record(src, &src_node, dst, &dst_node), true)
    }

    fn probe_frozen(&self, src: NodeId, dst: NodeId) -> Option<EdgeId> {
        let edge = self.graph.find(src, dst)?;
        (!self.del_out.contains(edge)).then_some(edge)
    }

    /// Delete an edge of `src`. Writable-tagged ids flip the record's
    /// deleted flag; frozen ids are recorded in the deletion map and their
    /// watermark is lowered so the edge disappears from the level that is
    /// current now while strictly older levels keep it. Repeats are no-ops
    /// either way; the deletion map keeps the earliest timestamp.
    pub fn delete_edge(&self, src: NodeId, edge: EdgeId) -> bool {
        let _ingest = self.freeze.read();
        assert!(!edge.is_nil(), "cannot delete NIL edge");
        if edge.is_writable() {
            self.delete_writable(src, edge)
        } else {
            self.delete_frozen(src, edge, self.ctx.now())
        }
    }

    fn delete_writable(&self, src: NodeId, edge: EdgeId) -> bool {
        let rec_ref = self.slot_ref(edge.index());
        let rec = rec_ref.get();
        debug_assert_eq!(rec.src.load(Ordering::Relaxed), src);
        let dst = rec.dst.load(Ordering::Relaxed);

        let src_node = self.ensure_node(src);
        let dst_node = self.ensure_node(dst);
        let _guards = self.lock_pair(src, &src_node, dst, &dst_node);

        if rec
            .deleted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        rec.deleted_at.store(self.ctx.now(), Ordering::Relaxed);
        src_node.out_live.fetch_sub(1, Ordering::Relaxed);
        dst_node.in_live.fetch_sub(1, Ordering::Relaxed);
        self.live_edges.fetch_sub(1, Ordering::Relaxed);
        self.deleted_new_edges.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn delete_frozen(&self, src: NodeId, edge: EdgeId, ts: Timestamp) -> bool {
        let num_levels = self.graph.num_levels() as u16;
        debug_assert!(edge.level() < num_levels);
        let top = num_levels.saturating_sub(1);

        let first = self.del_out.mark(edge, ts);
        let watermark = top.saturating_sub(1).max(edge.level());
        self.graph.update_max_visible_level_lower_only(edge, watermark);

        if first {
            self.deleted_frozen_edges.fetch_add(1, Ordering::Relaxed);
        }

        // Keep the reverse twin in lockstep.
        if let Some(rev_vis) = self.graph.reverse_visibility() {
            let snap = self.graph.snapshot();
            if let Some(dst) = snap.head_of(edge) {
                if let Some(rev_edge) = self.reverse_of(&snap, edge, src, dst) {
                    self.del_in.mark(rev_edge, ts);
                    rev_vis.lower_only(rev_edge, watermark.max(rev_edge.level()));
                }
            }
        }
        first
    }

    /// In-direction twin of a frozen out-edge: through the id
    /// correspondence column when it exists, by reverse lookup otherwise.
    fn reverse_of(
        &self,
        snap: &GraphSnapshot,
        edge: EdgeId,
        src: NodeId,
        dst: NodeId,
    ) -> Option<EdgeId> {
        if let Some(col) = snap.property(crate::props::OUT_TO_IN_COLUMN) {
            if let Some(raw) = col.get(edge) {
                let mapped = EdgeId::from_raw(raw);
                if !mapped.is_nil() {
                    return Some(mapped);
                }
            }
        }
        snap.find_in(dst, src)
    }

    /// Tombstone node `v`: mark it deleted, drop its pending edges, and
    /// mask every visible frozen edge in both directions. Frozen in-edges
    /// can only be enumerated through the reverse twin; without one, only
    /// the delta's in-list and the frozen out-edges are masked.
    pub fn delete_node(&self, v: NodeId) {
        let _ingest = self.freeze.read();
        let node = self.ensure_node(v);
        let ts = self.ctx.now();
        {
            let _guard = node.lock.lock();
            if node
                .state
                .swap(NodeState::Deleted as u8, Ordering::AcqRel)
                == NodeState::Deleted as u8
            {
                return;
            }
            node.deleted_at.store(ts, Ordering::Relaxed);
        }

        // Pending out-edges.
        for (edge, _) in self.writable_out(v) {
            self.delete_writable(v, edge);
        }
        // Pending in-edges.
        for (edge, tail) in self.writable_in(v) {
            self.delete_writable(tail, edge);
        }

        // Frozen out-edges.
        let snap = self.graph.snapshot();
        let frozen_out: Vec<EdgeId> = snap.out_iter(v).map(|(e, _)| e).collect();
        for edge in frozen_out {
            self.delete_frozen(v, edge, ts);
        }
        // Frozen in-edges, reachable only via the twin.
        if snap.has_reverse() {
            let frozen_in: Vec<(EdgeId, NodeId)> = snap.in_iter(v).into_iter().flatten().collect();
            for (_, tail) in frozen_in {
                if let Some(out_edge) = snap.find(tail, v) {
                    self.delete_frozen(tail, out_edge, ts);
                }
            }
        }
    }

    /// Live pending out-edges of `v`, reverse insertion order.
    fn writable_out(&self, v: NodeId) -> SmallVec<[(EdgeId, NodeId); 8]> {
        let mut out = SmallVec::new();
        let Some(node) = self.node(v) else {
            return out;
        };
        let mut cursor = node.out_head.load(Ordering::Acquire);
        while cursor != NIL_SLOT {
            let rec = self.slot_ref(cursor);
            let rec = rec.get();
            if !rec.deleted.load(Ordering::Acquire) {
                out.push((EdgeId::writable(cursor), rec.dst.load(Ordering::Relaxed)));
            }
            cursor = rec.prev_out.load(Ordering::Relaxed);
        }
        out
    }

    /// Live pending in-edges of `v`, reverse insertion order.
    fn writable_in(&self, v: NodeId) -> SmallVec<[(EdgeId, NodeId); 8]> {
        let mut out = SmallVec::new();
        let Some(node) = self.node(v) else {
            return out;
        };
        let mut cursor = node.in_head.load(Ordering::Acquire);
        while cursor != NIL_SLOT {
            let rec = self.slot_ref(cursor);
            let rec = rec.get();
            if !rec.deleted.load(Ordering::Acquire) {
                out.push((EdgeId::writable(cursor), rec.src.load(Ordering::Relaxed)));
            }
            cursor = rec.prev_in.load(Ordering::Relaxed);
        }
        out
    }

    /// Visible out-degree: live delta edges plus frozen edges that are
    /// neither masked by a watermark nor deleted since the last
    /// checkpoint.
    pub fn out_degree(&self, v: NodeId) -> usize {
        self.out_iter(v).count()
    }

    /// Visible in-degree; the frozen contribution needs the reverse twin.
    pub fn in_degree(&self, v: NodeId) -> usize {
        self.in_iter(v).count()
    }

    /// Delta edges first (reverse insertion order), then the frozen levels
    /// newest-first.
    pub fn out_iter(&self, v: NodeId) -> DeltaIter<'_> {
        DeltaIter::new(self, v, DeltaDirection::Out)
    }

    pub fn in_iter(&self, v: NodeId) -> DeltaIter<'_> {
        DeltaIter::new(self, v, DeltaDirection::In)
    }

    /// Apply one staged edge under a duplicate policy. `Drop` collapses
    /// duplicates within the current delta window; `SquashWeights` folds
    /// them into the surviving edge's weight instead (each unweighted
    /// duplicate counts 1.0).
    pub fn ingest(&self, rec: strata_core::EdgeRec, mode: strata_core::DuplicateMode) -> EdgeId {
        use strata_core::DuplicateMode;
        match mode {
            DuplicateMode::Keep => {
                let e = self.add_edge(rec.tail, rec.head);
                if let Some(w) = rec.weight {
                    self.set_weight(e, w);
                }
                e
            }
            DuplicateMode::Drop => {
                let (e, created) = self.add_edge_if_not_exists(rec.tail, rec.head);
                if created {
                    if let Some(w) = rec.weight {
                        self.set_weight(e, w);
                    }
                }
                e
            }
            DuplicateMode::SquashWeights => {
                let increment = rec.weight.unwrap_or(1.0);
                if let Some(e) = self.probe_writable(rec.tail, rec.head) {
                    self.bump_weight(e, increment);
                    e
                } else {
                    let e = self.add_edge(rec.tail, rec.head);
                    self.set_weight(e, increment);
                    e
                }
            }
        }
    }

    /// Set a delta edge's weight (f32 stored by bit pattern).
    pub fn set_weight(&self, edge: EdgeId, weight: f32) {
        let col = self.weight_column();
        col.set_writable(edge, weight.to_bits() as u64);
    }

    /// Add to a delta edge's weight; missing counts as zero.
    pub fn bump_weight(&self, edge: EdgeId, delta: f32) {
        let col = self.weight_column();
        let current = col
            .get(edge)
            .map(|bits| f32::from_bits(bits as u32))
            .unwrap_or(0.0);
        col.set_writable(edge, (current + delta).to_bits() as u64);
    }

    pub fn weight_of(&self, edge: EdgeId) -> Option<f32> {
        let col = self.graph.properties().get(WEIGHT_COLUMN)?;
        col.get(edge).map(|bits| f32::from_bits(bits as u32))
    }

    fn weight_column(&self) -> Arc<PropertyColumn> {
        self.graph.properties().register(WEIGHT_COLUMN, ColumnKind::U32)
    }

    // ---- checkpoint support -------------------------------------------

    /// Number of node slots the delta has grown to.
    pub(crate) fn touched_nodes(&self) -> usize {
        self.nodes.read().len()
    }

    /// Live out-adjacency of `v` in insertion order, with arena slots for
    /// property migration.
    pub(crate) fn live_out_in_order(&self, v: NodeId) -> Vec<(u64, NodeId)> {
        let mut list: Vec<(u64, NodeId)> = self
            .writable_out(v)
            .into_iter()
            .map(|(e, dst)| (e.index(), dst))
            .collect();
        list.reverse();
        list
    }

    /// Drop all pending state and refresh the cached frozen id space.
    /// Node tombstones and creation stamps survive; list heads, counters,
    /// the arena, and the deletion maps do not.
    pub(crate) fn clear_after_checkpoint(&self) {
        let nodes = self.nodes.read();
        for node in nodes.iter() {
            node.out_head.store(NIL_SLOT, Ordering::Relaxed);
            node.in_head.store(NIL_SLOT, Ordering::Relaxed);
            node.out_live.store(0, Ordering::Relaxed);
            node.in_live.store(0, Ordering::Relaxed);
        }
        drop(nodes);
        self.arena.reset();
        self.del_out.clear();
        self.del_in.clear();
        self.new_nodes.store(0, Ordering::Relaxed);
        self.live_edges.store(0, Ordering::Relaxed);
        self.deleted_new_edges.store(0, Ordering::Relaxed);
        self.deleted_frozen_edges.store(0, Ordering::Relaxed);
        self.frozen_max_nodes
            .store(self.graph.max_nodes(), Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Clone, Copy)]
enum DeltaDirection {
    Out,
    In,
}

/// Iterator over a node's visible edges: the delta chain first, then the
/// frozen levels. Holds a pinned snapshot, a level cursor, and a
/// within-level position.
pub struct DeltaIter<'a> {
    delta: &'a WritableGraph,
    v: NodeId,
    dir: DeltaDirection,
    cursor: u64,
    snap: GraphSnapshot,
    level_cursor: Option<u16>,
    within: usize,
}

impl<'a> DeltaIter<'a> {
    fn new(delta: &'a WritableGraph, v: NodeId, dir: DeltaDirection) -> Self {
        let cursor = delta
            .node(v)
            .map(|n| match dir {
                DeltaDirection::Out => n.out_head.load(Ordering::Acquire),
                DeltaDirection::In => n.in_head.load(Ordering::Acquire),
            })
            .unwrap_or(NIL_SLOT);
        let snap = delta.graph.snapshot();
        let level_cursor = match dir {
            DeltaDirection::Out => snap.top_level(),
            DeltaDirection::In => {
                if snap.has_reverse() {
                    snap.top_level()
                } else {
                    None
                }
            }
        };
        Self {
            delta,
            v,
            dir,
            cursor,
            snap,
            level_cursor,
            within: 0,
        }
    }
}

impl<'a> Iterator for DeltaIter<'a> {
    /// `(edge id, other endpoint)`
    type Item = (EdgeId, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        // Phase one: the delta chain, reverse insertion order.
        while self.cursor != NIL_SLOT {
            let slot = self.cursor;
            let rec_ref = self.delta.slot_ref(slot);
            let rec = rec_ref.get();
            let (next, other) = match self.dir {
                DeltaDirection::Out => (
                    rec.prev_out.load(Ordering::Relaxed),
                    rec.dst.load(Ordering::Relaxed),
                ),
                DeltaDirection::In => (
                    rec.prev_in.load(Ordering::Relaxed),
                    rec.src.load(Ordering::Relaxed),
                ),
            };
            self.cursor = next;
            if !rec.deleted.load(Ordering::Acquire) {
                return Some((EdgeId::writable(slot), other));
            }
        }

        // Phase two: frozen levels, newest first.
        loop {
            let lvl = self.level_cursor?;
            let level = match self.dir {
                DeltaDirection::Out => self.snap.level(lvl),
                DeltaDirection::In => self.snap.rev_level(lvl),
            };
            if let Some(level) = level {
                let adj = level.adjacency(self.v);
                if self.within < adj.len() {
                    let base = level.adjacency_base(self.v);
                    let index = base + self.within as u64;
                    let head = adj[self.within];
                    self.within += 1;
                    let edge = EdgeId::frozen(lvl, index);
                    // A frozen edge deleted since the last checkpoint may
                    // still sit above its watermark (it cannot drop below
                    // its own level); the deletion map hides it from live
                    // reads immediately.
                    let visible = match self.dir {
                        DeltaDirection::Out => {
                            self.snap.is_visible(edge) && !self.delta.del_out.contains(edge)
                        }
                        DeltaDirection::In => {
                            self.snap.is_visible_in(edge) && !self.delta.del_in.contains(edge)
                        }
                    };
                    if visible {
                        return Some((edge, head));
                    }
                    continue;
                }
            }
            self.level_cursor = lvl.checked_sub(1);
            self.within = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::StoreConfig;

    fn writable(reverse: bool) -> WritableGraph {
        let graph = Arc::new(
            MultiVersionGraph::new(StoreConfig {
                reverse_edges: reverse,
                ..StoreConfig::default()
            })
            .unwrap(),
        );
        WritableGraph::new(graph, Arc::new(IngestContext::new(0)))
    }

    #[test]
    fn test_add_edge_returns_writable_id() {
        let w = writable(false);
        let e = w.add_edge(0, 1);
        assert!(e.is_writable());
        assert_eq!(w.stats().live_edges, 1);
        assert_eq!(w.stats().new_nodes, 2);
        assert_eq!(w.max_nodes(), 2);
    }

    #[test]
    fn test_out_iter_reverse_insertion_order() {
        let w = writable(false);
        w.add_edge(0, 1);
        w.add_edge(0, 2);
        w.add_edge(0, 3);
        let heads: Vec<NodeId> = w.out_iter(0).map(|(_, h)| h).collect();
        assert_eq!(heads, vec![3, 2, 1]);
    }

    #[test]
    fn test_in_list_tracks_back_references() {
        let w = writable(false);
        w.add_edge(0, 2);
        w.add_edge(1, 2);
        let tails: Vec<NodeId> = w.in_iter(2).map(|(_, t)| t).collect();
        assert_eq!(tails, vec![1, 0]);
        assert_eq!(w.in_degree(2), 2);
    }

    #[test]
    fn test_delete_writable_edge_is_idempotent() {
        let w = writable(false);
        let e = w.add_edge(0, 1);
        assert!(w.delete_edge(0, e));
        assert!(!w.delete_edge(0, e));
        assert_eq!(w.stats().live_edges, 0);
        assert_eq!(w.stats().deleted_new_edges, 1);
        assert_eq!(w.out_iter(0).count(), 0);
    }

    #[test]
    fn test_add_edge_if_not_exists_probes_delta() {
        let w = writable(false);
        let (e1, created) = w.add_edge_if_not_exists(0, 1);
        assert!(created);
        let (e2, created) = w.add_edge_if_not_exists(0, 1);
        assert!(!created);
        assert_eq!(e1, e2);
        assert_eq!(w.stats().live_edges, 1);
    }

    #[test]
    fn test_self_loop_takes_single_lock() {
        let w = writable(false);
        let e = w.add_edge(5, 5);
        assert!(e.is_writable());
        let heads: Vec<NodeId> = w.out_iter(5).map(|(_, h)| h).collect();
        assert_eq!(heads, vec![5]);
        let tails: Vec<NodeId> = w.in_iter(5).map(|(_, t)| t).collect();
        assert_eq!(tails, vec![5]);
    }

    #[test]
    fn test_delete_node_tombstones_and_drops_pending() {
        let w = writable(false);
        w.add_edge(0, 1);
        w.add_edge(2, 0);
        w.delete_node(0);

        assert_eq!(w.node_state(0), NodeState::Deleted);
        assert_eq!(w.out_iter(0).count(), 0);
        assert_eq!(w.out_iter(2).count(), 0);
        // Second delete is a no-op.
        w.delete_node(0);
        assert_eq!(w.stats().deleted_new_edges, 2);
    }

    #[test]
    fn test_concurrent_adds_converge() {
        let graph = Arc::new(MultiVersionGraph::new(StoreConfig::default()).unwrap());
        let w = Arc::new(WritableGraph::new(graph, Arc::new(IngestContext::new(0))));

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let w = Arc::clone(&w);
                std::thread::spawn(move || {
                    for i in 0..256u32 {
                        w.add_edge(t, 4 + (i % 8));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(w.stats().live_edges, 4 * 256);
        for t in 0..4 {
            assert_eq!(w.out_iter(t).count(), 256);
        }
        let total_in: usize = (4..12).map(|v| w.in_iter(v).count()).sum();
        assert_eq!(total_in, 4 * 256);
    }

    #[test]
    fn test_weight_bump_accumulates() {
        let w = writable(false);
        let e = w.add_edge(0, 1);
        w.bump_weight(e, 1.0);
        w.bump_weight(e, 2.5);
        assert_eq!(w.weight_of(e), Some(3.5));
    }

    #[test]
    fn test_clear_resets_pending_but_keeps_tombstones() {
        let w = writable(false);
        w.add_edge(0, 1);
        w.delete_node(1);
        w.clear_after_checkpoint();

        let stats = w.stats();
        assert!(stats.is_clean());
        assert_eq!(w.out_iter(0).count(), 0);
        assert_eq!(w.node_state(1), NodeState::Deleted);
        assert_eq!(w.generation(), 1);
    }
}
