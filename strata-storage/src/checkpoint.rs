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

//! The checkpoint engine: freezes the writable delta into a new level.
//!
//! The whole operation is local and blocking. Pending edges stream through
//! the external sorter ordered by `(tail, head)`, a new CSR level is built
//! from the per-node degree array, promoted edges receive their final
//! `(level, index)` ids, property overflow values migrate into freshly
//! allocated level arrays, and the reverse twin (plus the out/in id
//! correspondence columns when enabled) is built from the same records
//! flipped. Only then is anything attached to the store, atomically;
//! failure before that point leaves the store unchanged. Mutators are held
//! off for the duration by the delta's freeze lock.

use std::sync::Arc;
use std::time::Instant;

use strata_core::{EdgeId, NodeId, Result};

use crate::delta::WritableGraph;
use crate::level::LevelBuilder;
use crate::props::{IN_TO_OUT_COLUMN, OUT_TO_IN_COLUMN, ColumnKind, PropertyColumn};
use crate::store::MultiVersionGraph;
use crate::xms::{ExternalSorter, SortRecord};

/// A pending edge en route to promotion; ordered by `(tail, head)` with
/// the arena slot as a stable tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PromoteRec {
    tail: u32,
    head: u32,
    slot: u64,
}

impl SortRecord for PromoteRec {
    const SIZE: usize = 16;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.tail.to_le_bytes());
        buf[4..8].copy_from_slice(&self.head.to_le_bytes());
        buf[8..16].copy_from_slice(&self.slot.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            tail: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            head: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            slot: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        }
    }
}

/// What one checkpoint did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointStats {
    /// Index of the published level; `None` for a no-op checkpoint.
    pub level: Option<u16>,
    pub promoted_edges: u64,
    pub new_nodes: u64,
    pub dropped_new_edges: u64,
    pub masked_frozen_edges: u64,
    pub retired_levels: usize,
    pub elapsed_us: u64,
}

/// Freezes a [`WritableGraph`] into its backing store.
pub struct CheckpointEngine {
    delta: Arc<WritableGraph>,
    graph: Arc<MultiVersionGraph>,
}

impl CheckpointEngine {
    pub fn new(delta: Arc<WritableGraph>) -> Self {
        let graph = Arc::clone(delta.store());
        Self { delta, graph }
    }

    pub fn store(&self) -> &Arc<MultiVersionGraph> {
        &self.graph
    }

    pub fn delta(&self) -> &Arc<WritableGraph> {
        &self.delta
    }

    /// Freeze all pending changes into a new level. A delta with nothing
    /// recorded since the last checkpoint is a no-op.
    pub fn checkpoint(&self) -> Result<CheckpointStats> {
        let started = Instant::now();
        let _frozen = self.delta.freeze_exclusive();

        let before = self.delta.stats();
        if before.is_clean() {
            return Ok(CheckpointStats::default());
        }

        let max_nodes = self.delta.max_nodes();
        let level_index = self.graph.num_levels() as u16;

        // Sort the live adjacencies by (tail, head); the level builder
        // needs per-node contiguity and find() wants sorted heads.
        let mut sorter: ExternalSorter<PromoteRec> =
            ExternalSorter::new(self.graph.config().xms.clone());
        let touched = self.delta.touched_nodes() as NodeId;
        for v in 0..touched {
            for (slot, dst) in self.delta.live_out_in_order(v) {
                sorter.push(PromoteRec {
                    tail: v,
                    head: dst,
                    slot,
                })?;
            }
        }
        sorter.sort()?;

        // Degree pass.
        let mut degrees = vec![0u32; max_nodes as usize];
        sorter.for_each_sorted(|rec| degrees[rec.tail as usize] += 1)?;

        // Placement pass: stream into the computed offsets and remember
        // each promoted record's arena slot for property migration.
        let mut builder = LevelBuilder::from_degrees(&degrees);
        let promoted = sorter.len();
        let mut slots: Vec<u64> = vec![0; promoted as usize];
        let mut placed: Vec<(u32, u32)> = Vec::new();
        let build_reverse = self.graph.has_reverse();
        sorter.rewind_sorted()?;
        sorter.for_each_sorted(|rec| {
            let index = builder.next_index(rec.tail);
            builder.place(rec.tail, rec.head);
            slots[index as usize] = rec.slot;
            if build_reverse {
                placed.push((rec.tail, rec.head));
            }
        })?;
        let out_level = builder.finish(true);
        debug_assert!(out_level.check_invariants());

        // Property columns: migrate overflow values of promoted edges into
        // this level's arrays. Edges with no recorded value get zero.
        let mut columns: Vec<(Arc<PropertyColumn>, Vec<u64>)> = Vec::new();
        if !self.graph.config().no_properties {
            for col in self.graph.properties().all() {
                if col.name() == OUT_TO_IN_COLUMN || col.name() == IN_TO_OUT_COLUMN {
                    continue;
                }
                let values: Vec<u64> = slots
                    .iter()
                    .map(|&slot| {
                        col.take_writable(EdgeId::writable(slot)).unwrap_or(0)
                    })
                    .collect();
                columns.push((col, values));
            }
        }

        // Reverse twin from the same records flipped, with optional id
        // correspondence columns.
        let rev_level = if build_reverse {
            let mut rev_sorter: ExternalSorter<PromoteRec> =
                ExternalSorter::new(self.graph.config().xms.clone());
            for (out_index, &(tail, head)) in placed.iter().enumerate() {
                rev_sorter.push(PromoteRec {
                    tail: head,
                    head: tail,
                    slot: out_index as u64,
                })?;
            }
            rev_sorter.sort()?;

            let mut rev_degrees = vec![0u32; max_nodes as usize];
            rev_sorter.for_each_sorted(|rec| rev_degrees[rec.tail as usize] += 1)?;

            let mut rev_builder = LevelBuilder::from_degrees(&rev_degrees);
            let maps = self.graph.config().reverse_maps;
            let mut out_to_in = vec![0u64; if maps { promoted as usize } else { 0 }];
            let mut in_to_out = vec![0u64; if maps { promoted as usize } else { 0 }];
            rev_sorter.rewind_sorted()?;
            rev_sorter.for_each_sorted(|rec| {
                let rev_index = rev_builder.next_index(rec.tail);
                rev_builder.place(rec.tail, rec.head);
                if maps {
                    out_to_in[rec.slot as usize] = EdgeId::frozen(level_index, rev_index).raw();
                    in_to_out[rev_index as usize] = EdgeId::frozen(level_index, rec.slot).raw();
                }
            })?;

            if maps {
                let fwd = self.graph.properties().register(OUT_TO_IN_COLUMN, ColumnKind::U64);
                let bwd = self.graph.properties().register(IN_TO_OUT_COLUMN, ColumnKind::U64);
                columns.push((fwd, out_to_in));
                columns.push((bwd, in_to_out));
            }
            Some(rev_builder.finish(true))
        } else {
            None
        };

        // Publish atomically, clear the delta, apply retention.
        let published = self.graph.publish(out_level, rev_level, columns);
        debug_assert_eq!(published, level_index);
        self.delta.clear_after_checkpoint();

        let retired = match self.graph.config().window_levels {
            Some(n) => self.graph.keep_only_recent_versions(n),
            None => 0,
        };

        let stats = CheckpointStats {
            level: Some(published),
            promoted_edges: promoted,
            new_nodes: before.new_nodes,
            dropped_new_edges: before.deleted_new_edges,
            masked_frozen_edges: before.deleted_frozen_edges,
            retired_levels: retired,
            elapsed_us: started.elapsed().as_micros() as u64,
        };
        tracing::info!(
            level = published,
            edges = stats.promoted_edges,
            nodes = stats.new_nodes,
            dropped = stats.dropped_new_edges,
            masked = stats.masked_frozen_edges,
            "checkpoint published"
        );
        Ok(stats)
    }
}
