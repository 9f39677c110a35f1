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

//! Shared shaping of raw `(tail, head)` pairs.
//!
//! Direction handling happens here so every reader behaves identically:
//! `directed` passes pairs through, `undirected_double` emits both
//! directions, `undirected_ordered` canonicalizes so that `tail < head`.
//! Partial loading is plain byte arithmetic: part `p` of `n` covers
//! `[size*(p-1)/n, size*p/n)` and each reader resyncs to its record
//! boundary at the range start.

use std::collections::VecDeque;

use strata_core::{Direction, EdgeRec, PartialLoad};

/// Byte range `[start, end)` of one partial-load shard.
pub fn partial_range(filesize: u64, p: PartialLoad) -> (u64, u64) {
    let start = filesize * (p.part - 1) / p.num_parts;
    let end = filesize * p.part / p.num_parts;
    (start, end)
}

/// Stateless direction shaper shared by the readers.
#[derive(Debug, Clone, Copy)]
pub struct Shaper {
    direction: Direction,
}

impl Shaper {
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }

    /// Stage the shaped form of one raw pair. Returns how many edges were
    /// staged (1, or 2 for `undirected_double`).
    pub fn stage(&self, rec: EdgeRec, staged: &mut VecDeque<EdgeRec>) -> usize {
        match self.direction {
            Direction::Directed => {
                staged.push_back(rec);
                1
            }
            Direction::UndirectedDouble => {
                staged.push_back(rec);
                staged.push_back(EdgeRec {
                    tail: rec.head,
                    head: rec.tail,
                    weight: rec.weight,
                });
                2
            }
            Direction::UndirectedOrdered => {
                let (tail, head) = if rec.tail <= rec.head {
                    (rec.tail, rec.head)
                } else {
                    (rec.head, rec.tail)
                };
                staged.push_back(EdgeRec {
                    tail,
                    head,
                    weight: rec.weight,
                });
                1
            }
        }
    }
}
