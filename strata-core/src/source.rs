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

//! The edge-producer seam.
//!
//! A source stages up to `max_edges` pairs on each `pull` and the consumer
//! drains them with `next_edge`. End of stream is not an error: `pull`
//! returns `false` once nothing further will ever be staged. One trait
//! covers every producer; format-specific capability differences are data
//! (`SourceStat`), not subtypes.

use crate::error::Result;
use crate::ids::NodeId;

/// One staged edge. `weight` is present only for formats that carry one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeRec {
    pub tail: NodeId,
    pub head: NodeId,
    pub weight: Option<f32>,
}

impl EdgeRec {
    pub fn new(tail: NodeId, head: NodeId) -> Self {
        Self {
            tail,
            head,
            weight: None,
        }
    }

    pub fn weighted(tail: NodeId, head: NodeId, weight: f32) -> Self {
        Self {
            tail,
            head,
            weight: Some(weight),
        }
    }
}

/// Advertised source statistics; every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStat {
    /// Declared vertex count, if the format carries one.
    pub nodes: Option<u64>,
    /// Declared edge count, if the format carries one.
    pub edges: Option<u64>,
    /// Human-readable origin (path, generator name).
    pub origin: String,
}

/// Pull-based edge producer.
pub trait DataSource: Send {
    /// Stage up to `max_edges` further edges. Returns `true` while more
    /// input remains after this call, `false` once the source is drained.
    fn pull(&mut self, max_edges: usize) -> Result<bool>;

    /// Pop the next staged edge, or `None` when the stage is empty.
    fn next_edge(&mut self) -> Option<EdgeRec>;

    fn stat(&self) -> SourceStat;

    /// Restart from the beginning of the input.
    fn rewind(&mut self) -> Result<()>;
}

/// In-memory source over a fixed edge list. The trivial implementation of
/// the seam; used by the driver tests and anywhere a caller already holds
/// the edges.
#[derive(Debug, Clone)]
pub struct MemorySource {
    edges: Vec<EdgeRec>,
    cursor: usize,
    staged: std::collections::VecDeque<EdgeRec>,
    origin: String,
}

impl MemorySource {
    pub fn new(edges: Vec<EdgeRec>) -> Self {
        Self {
            edges,
            cursor: 0,
            staged: std::collections::VecDeque::new(),
            origin: "memory".into(),
        }
    }

    pub fn from_pairs(pairs: &[(NodeId, NodeId)]) -> Self {
        Self::new(pairs.iter().map(|&(t, h)| EdgeRec::new(t, h)).collect())
    }
}

impl DataSource for MemorySource {
    fn pull(&mut self, max_edges: usize) -> Result<bool> {
        let end = (self.cursor + max_edges).min(self.edges.len());
        self.staged.extend(self.edges[self.cursor..end].iter().copied());
        self.cursor = end;
        Ok(self.cursor < self.edges.len())
    }

    fn next_edge(&mut self) -> Option<EdgeRec> {
        self.staged.pop_front()
    }

    fn stat(&self) -> SourceStat {
        SourceStat {
            nodes: None,
            edges: Some(self.edges.len() as u64),
            origin: self.origin.clone(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        self.staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_pull_and_drain() {
        let mut src = MemorySource::from_pairs(&[(0, 1), (1, 2), (0, 2)]);
        assert!(src.pull(2).unwrap());
        assert_eq!(src.next_edge(), Some(EdgeRec::new(0, 1)));
        assert_eq!(src.next_edge(), Some(EdgeRec::new(1, 2)));
        assert_eq!(src.next_edge(), None);

        assert!(!src.pull(2).unwrap());
        assert_eq!(src.next_edge(), Some(EdgeRec::new(0, 2)));
        assert_eq!(src.next_edge(), None);
    }

    #[test]
    fn test_memory_source_rewind() {
        let mut src = MemorySource::from_pairs(&[(0, 1)]);
        assert!(!src.pull(10).unwrap());
        src.rewind().unwrap();
        assert!(!src.pull(10).unwrap());
        assert_eq!(src.next_edge(), Some(EdgeRec::new(0, 1)));
    }

    #[test]
    fn test_stat_reports_edge_count() {
        let src = MemorySource::from_pairs(&[(0, 1), (1, 0)]);
        assert_eq!(src.stat().edges, Some(2));
    }
}
