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

//! Property tests: the sorter produces an ordered permutation for any
//! input, and ingest-then-checkpoint round-trips any edge multiset.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use strata_core::{IngestContext, StoreConfig, XmsConfig};
use strata_storage::{CheckpointEngine, EdgePair, ExternalSorter, MultiVersionGraph, WritableGraph};

fn multiset(pairs: &[(u32, u32)]) -> HashMap<(u32, u32), usize> {
    let mut counts = HashMap::new();
    for &p in pairs {
        *counts.entry(p).or_insert(0) += 1;
    }
    counts
}

proptest! {
    #[test]
    fn prop_sort_yields_ordered_permutation(
        input in prop::collection::vec((0u32..1000, 0u32..1000), 0..400),
        buffer in 1usize..48,
    ) {
        let cfg = XmsConfig { buffer_bytes: 0, tmp_dirs: vec![], parallel: false };
        let mut sorter = ExternalSorter::new(cfg).with_buffer_records(buffer);
        for &(tail, head) in &input {
            sorter.push(EdgePair { tail, head }).unwrap();
        }
        sorter.sort().unwrap();

        let mut out = Vec::new();
        sorter.for_each_sorted(|r| out.push((r.tail, r.head))).unwrap();

        prop_assert_eq!(out.len(), input.len());
        prop_assert!(out.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(multiset(&out), multiset(&input));
    }

    #[test]
    fn prop_ingest_checkpoint_roundtrip(
        edges in prop::collection::vec((0u32..40, 0u32..40), 0..200),
        splits in prop::collection::vec(any::<bool>(), 0..200),
    ) {
        let graph = Arc::new(MultiVersionGraph::new(StoreConfig::default()).unwrap());
        let delta = Arc::new(WritableGraph::new(graph, Arc::new(IngestContext::new(0))));
        let eng = CheckpointEngine::new(delta);

        // Apply in arbitrary order, spread over several checkpoints.
        for (i, &(tail, head)) in edges.iter().enumerate() {
            eng.delta().add_edge(tail, head);
            if splits.get(i).copied().unwrap_or(false) {
                eng.checkpoint().unwrap();
            }
        }
        eng.checkpoint().unwrap();

        // The union over every vertex's visible out-edges equals the
        // input multiset, up to within-vertex ordering.
        let snap = eng.store().snapshot();
        let mut seen = Vec::new();
        for v in 0..snap.max_nodes() {
            for (_, head) in snap.out_iter(v) {
                seen.push((v, head));
            }
        }
        prop_assert_eq!(multiset(&seen), multiset(&edges));

        // Structural invariants on every surviving level.
        for lvl in 0..snap.num_levels() as u16 {
            let level = snap.level(lvl).unwrap();
            prop_assert!(level.check_invariants());
        }
    }
}
