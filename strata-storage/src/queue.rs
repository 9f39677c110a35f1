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

//! Striped request queue.
//!
//! Pending mutations are sharded by the low bits of the source node id so
//! parallel producers land on different stripes. Each stripe is a
//! single-consumer queue: every entry carries a sequence number and the
//! dequeue verifies the popped sequence equals the stripe's expected head.
//! Divergence means two consumers raced on one stripe, which is misuse,
//! not load; it surfaces as a fatal [`StrataError::QueueRace`].
//!
//! Workers poll; an empty stripe costs a 10 µs sleep with a shutdown
//! check before every re-poll.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use strata_core::{DuplicateMode, EdgeId, EdgeRec, NodeId, Result, StrataError};

use crate::delta::WritableGraph;

/// Poll back-off when a stripe is empty.
const IDLE_SLEEP: Duration = Duration::from_micros(10);

/// One queued mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    AddEdge {
        src: NodeId,
        dst: NodeId,
        weight: Option<f32>,
    },
    DeleteEdge {
        src: NodeId,
        edge: EdgeId,
    },
    AddNode {
        node: NodeId,
    },
    DeleteNode {
        node: NodeId,
    },
}

impl Request {
    /// Node whose low bits choose the stripe.
    fn key(&self) -> NodeId {
        match *self {
            Request::AddEdge { src, .. } => src,
            Request::DeleteEdge { src, .. } => src,
            Request::AddNode { node } => node,
            Request::DeleteNode { node } => node,
        }
    }
}

struct Stripe {
    queue: Mutex<VecDeque<(u64, Request)>>,
    /// Next sequence to hand out.
    tail: AtomicU64,
    /// Sequence the single consumer must observe next.
    head: AtomicU64,
}

impl Stripe {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            tail: AtomicU64::new(0),
            head: AtomicU64::new(0),
        }
    }
}

/// Sharded mutation queue; see the module docs.
pub struct RequestQueue {
    stripes: Vec<Stripe>,
    mask: u32,
    shutdown: AtomicBool,
}

impl RequestQueue {
    /// `stripes` is rounded up to a power of two so the shard choice is a
    /// mask of the source id.
    pub fn new(stripes: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        Self {
            stripes: (0..count).map(|_| Stripe::new()).collect(),
            mask: (count - 1) as u32,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    #[inline]
    pub fn stripe_of(&self, src: NodeId) -> usize {
        (src & self.mask) as usize
    }

    pub fn enqueue(&self, request: Request) {
        let stripe = &self.stripes[self.stripe_of(request.key())];
        let mut queue = stripe.queue.lock();
        let seq = stripe.tail.fetch_add(1, Ordering::Relaxed);
        queue.push_back((seq, request));
    }

    /// Pop one request from `stripe`, returning `None` immediately when it
    /// is empty. The sequence check enforces single-consumer discipline.
    pub fn dequeue(&self, stripe: usize) -> Result<Option<Request>> {
        let s = &self.stripes[stripe];
        let mut queue = s.queue.lock();
        let Some((seq, request)) = queue.pop_front() else {
            return Ok(None);
        };
        let expected = s.head.load(Ordering::Acquire);
        if seq != expected {
            return Err(StrataError::QueueRace {
                stripe,
                expected,
                observed: seq,
            });
        }
        s.head.store(expected + 1, Ordering::Release);
        Ok(Some(request))
    }

    /// Total backlog across stripes.
    pub fn len(&self) -> usize {
        self.stripes.iter().map(|s| s.queue.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stripes.iter().all(|s| s.queue.lock().is_empty())
    }

    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn apply(delta: &WritableGraph, request: Request, mode: DuplicateMode) {
        match request {
            Request::AddEdge { src, dst, weight } => {
                delta.ingest(
                    EdgeRec {
                        tail: src,
                        head: dst,
                        weight,
                    },
                    mode,
                );
            }
            Request::DeleteEdge { src, edge } => {
                delta.delete_edge(src, edge);
            }
            Request::AddNode { node } => delta.add_node(node),
            Request::DeleteNode { node } => delta.delete_node(node),
        }
    }

    /// Apply everything currently queued; returns how many requests ran.
    pub fn drain_into(&self, delta: &WritableGraph, mode: DuplicateMode) -> Result<usize> {
        let mut applied = 0;
        for stripe in 0..self.stripes.len() {
            while let Some(request) = self.dequeue(stripe)? {
                Self::apply(delta, request, mode);
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Dedicated consumer loop over a set of stripes; runs until shutdown.
    pub fn worker(&self, delta: &WritableGraph, stripes: &[usize], mode: DuplicateMode) -> Result<u64> {
        let mut applied = 0u64;
        loop {
            let mut idle = true;
            for &stripe in stripes {
                while let Some(request) = self.dequeue(stripe)? {
                    Self::apply(delta, request, mode);
                    applied += 1;
                    idle = false;
                }
            }
            if self.is_shut_down() {
                return Ok(applied);
            }
            if idle {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MultiVersionGraph;
    use std::sync::Arc;
    use strata_core::{IngestContext, StoreConfig};

    fn delta() -> WritableGraph {
        let graph = Arc::new(MultiVersionGraph::new(StoreConfig::default()).unwrap());
        WritableGraph::new(graph, Arc::new(IngestContext::new(0)))
    }

    #[test]
    fn test_stripe_selection_masks_source_bits() {
        let q = RequestQueue::new(4);
        assert_eq!(q.stripe_count(), 4);
        assert_eq!(q.stripe_of(0), 0);
        assert_eq!(q.stripe_of(5), 1);
        assert_eq!(q.stripe_of(7), 3);
    }

    #[test]
    fn test_fifo_within_stripe() {
        let q = RequestQueue::new(1);
        q.enqueue(Request::AddNode { node: 1 });
        q.enqueue(Request::AddNode { node: 2 });
        assert_eq!(q.dequeue(0).unwrap(), Some(Request::AddNode { node: 1 }));
        assert_eq!(q.dequeue(0).unwrap(), Some(Request::AddNode { node: 2 }));
        assert_eq!(q.dequeue(0).unwrap(), None);
    }

    #[test]
    fn test_drain_applies_mutations() {
        let q = RequestQueue::new(2);
        let w = delta();
        q.enqueue(Request::AddEdge {
            src: 0,
            dst: 1,
            weight: None,
        });
        q.enqueue(Request::AddEdge {
            src: 1,
            dst: 2,
            weight: None,
        });
        let applied = q.drain_into(&w, DuplicateMode::Keep).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(w.stats().live_edges, 2);
        assert!(q.is_empty());
    }

    #[test]
    fn test_worker_stops_after_shutdown() {
        let q = Arc::new(RequestQueue::new(2));
        let w = Arc::new(delta());
        for i in 0..64u32 {
            q.enqueue(Request::AddEdge {
                src: i % 8,
                dst: (i + 1) % 8,
                weight: None,
            });
        }

        let handle = {
            let q = Arc::clone(&q);
            let w = Arc::clone(&w);
            std::thread::spawn(move || q.worker(&w, &[0, 1], DuplicateMode::Keep))
        };
        // The worker drains what is queued, then parks until shutdown.
        while w.stats().live_edges < 64 {
            std::thread::sleep(Duration::from_micros(50));
        }
        q.shut_down();
        let applied = handle.join().unwrap().unwrap();
        assert_eq!(applied, 64);
    }

    #[test]
    fn test_sequence_divergence_is_fatal() {
        let q = RequestQueue::new(1);
        q.enqueue(Request::AddNode { node: 0 });
        q.enqueue(Request::AddNode { node: 1 });

        // Simulate a second consumer having skipped the head entry.
        {
            let mut inner = q.stripes[0].queue.lock();
            inner.pop_front();
        }
        match q.dequeue(0) {
            Err(StrataError::QueueRace {
                stripe,
                expected,
                observed,
            }) => {
                assert_eq!(stripe, 0);
                assert_eq!(expected, 0);
                assert_eq!(observed, 1);
            }
            other => panic!("expected queue race, got {other:?}"),
        }
    }
}
