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

//! Sliding-window driver.
//!
//! Two cooperating workers on plain threads:
//!
//! - the **ingester** pulls batches from the data source, applies them
//!   under the configured duplicate policy, opportunistically drains the
//!   request queue it owns, and optionally paces itself against a
//!   monotonic schedule (ahead: sleep the deficit; behind: warn and keep
//!   going);
//! - the **analyst** wakes every `advance_interval_ms`, drains the queue
//!   if the backlog passed the threshold, advances the window according to
//!   the configured [`WindowMode`], and invokes the analytics callback on
//!   the freshly pinned snapshot.
//!
//! The analyst's snapshot stays valid while further checkpoints land; its
//! `Arc`s keep the older levels alive. `terminate` is checked at batch and
//! advance boundaries only; nothing is interrupted mid-batch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use strata_core::{
    BatchSizing, DataSource, DriverConfig, DuplicateMode, EdgeRec, NodeId, Result, StrataError,
    WindowMode,
};

use crate::checkpoint::CheckpointEngine;
use crate::delta::WritableGraph;
use crate::level::CsrLevel;
use crate::queue::RequestQueue;
use crate::store::{GraphSnapshot, MultiVersionGraph};

/// Tolerated scheduling slack before the ingester reports itself behind.
const BEHIND_SLACK: Duration = Duration::from_millis(50);

/// Outcome of one driver run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverStats {
    /// Analytics invocations performed.
    pub advances: u64,
    pub ingested_edges: u64,
    pub drained_requests: u64,
    /// Times the rate-limited ingester fell behind schedule.
    pub behind_events: u64,
}

/// Draws batch sizes from the configured distribution.
struct BatchSampler {
    sizing: BatchSizing,
}

impl BatchSampler {
    fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        match self.sizing {
            BatchSizing::Fixed { size } => size,
            BatchSizing::Uniform { min, max } => rng.gen_range(min..=max),
            BatchSizing::Gaussian {
                min,
                max,
                mean,
                std_dev,
            } => {
                // Box-Muller, rejected until it lands in [min, max].
                for _ in 0..64 {
                    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                    let u2: f64 = rng.gen();
                    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
                    let x = mean + z * std_dev;
                    if x >= min as f64 && x <= max as f64 {
                        return x as usize;
                    }
                }
                (mean as usize).clamp(min, max)
            }
        }
    }
}

/// Coordinates continuous ingest and periodic analytics; see module docs.
pub struct SlidingWindowDriver {
    cfg: DriverConfig,
    duplicates: DuplicateMode,
    engine: CheckpointEngine,
    queue: Option<Arc<RequestQueue>>,
    terminate: Arc<AtomicBool>,
}

impl SlidingWindowDriver {
    pub fn new(
        delta: Arc<WritableGraph>,
        queue: Option<Arc<RequestQueue>>,
        duplicates: DuplicateMode,
        cfg: DriverConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            duplicates,
            engine: CheckpointEngine::new(delta),
            queue,
            terminate: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle for requesting shutdown from outside the run.
    pub fn terminate_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminate)
    }

    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    pub fn store(&self) -> &Arc<MultiVersionGraph> {
        self.engine.store()
    }

    pub fn delta(&self) -> &Arc<WritableGraph> {
        self.engine.delta()
    }

    /// Run ingest and analytics to completion: until `max_advances` is
    /// reached, `terminate` is raised, or the source is exhausted and the
    /// final advance has flushed it.
    pub fn run<S, F>(&self, mut source: S, mut on_snapshot: F) -> Result<DriverStats>
    where
        S: DataSource,
        F: FnMut(&GraphSnapshot) + Send,
    {
        let delta = Arc::clone(self.engine.delta());
        let graph = Arc::clone(self.engine.store());
        let terminate = &self.terminate;
        let source_done = AtomicBool::new(false);
        let ingested = AtomicU64::new(0);
        let behind_events = AtomicU64::new(0);
        let drained = AtomicU64::new(0);
        // Window buffer for the modes that bypass the delta.
        let window_edges: Mutex<Vec<EdgeRec>> = Mutex::new(Vec::new());

        let mut advances = 0u64;
        let mut worker_error: Option<StrataError> = None;

        std::thread::scope(|scope| {
            let ingest_handle = scope.spawn(|| -> Result<()> {
                let mut rng = rand::thread_rng();
                let sampler = BatchSampler {
                    sizing: self.cfg.batch,
                };
                let started = Instant::now();

                loop {
                    if terminate.load(Ordering::Acquire) {
                        return Ok(());
                    }
                    let batch = sampler.sample(&mut rng);
                    let more = source.pull(batch)?;
                    let mut applied = 0u64;
                    while let Some(rec) = source.next_edge() {
                        match self.cfg.mode {
                            WindowMode::DeltaCheckpoint => {
                                delta.ingest(rec, self.duplicates);
                            }
                            WindowMode::DirectToReadOnly | WindowMode::SingleSnapshot => {
                                window_edges.lock().push(rec);
                            }
                        }
                        applied += 1;
                    }
                    ingested.fetch_add(applied, Ordering::Relaxed);
                    delta.context().advance();

                    if let Some(queue) = &self.queue {
                        let n = queue.drain_into(&delta, self.duplicates)?;
                        drained.fetch_add(n as u64, Ordering::Relaxed);
                    }

                    if let Some(eps) = self.cfg.rate_limit_eps {
                        let total = ingested.load(Ordering::Relaxed);
                        let target = Duration::from_secs_f64(total as f64 / eps as f64);
                        let elapsed = started.elapsed();
                        if elapsed < target {
                            std::thread::sleep(target - elapsed);
                        } else if elapsed > target + BEHIND_SLACK {
                            let behind = (elapsed - target).as_millis();
                            tracing::warn!(behind_ms = behind as u64, "ingest behind schedule");
                            behind_events.fetch_add(1, Ordering::Relaxed);
                        }
                    }

                    if !more {
                        source_done.store(true, Ordering::Release);
                        return Ok(());
                    }
                }
            });

            let analyst_result: Result<()> = (|| {
                let interval = Duration::from_millis(self.cfg.advance_interval_ms);
                loop {
                    if terminate.load(Ordering::Acquire) {
                        break;
                    }
                    std::thread::sleep(interval);

                    if let Some(queue) = &self.queue {
                        if queue.len() > self.cfg.drain_threshold {
                            let n = queue.drain_into(&delta, self.duplicates)?;
                            drained.fetch_add(n as u64, Ordering::Relaxed);
                        }
                    }

                    match self.cfg.mode {
                        WindowMode::DeltaCheckpoint => {
                            self.engine.checkpoint()?;
                            if let Some(n) = self.cfg.window_levels {
                                graph.keep_only_recent_versions(n);
                            }
                            let snap = graph.snapshot();
                            on_snapshot(&snap);
                        }
                        WindowMode::DirectToReadOnly => {
                            let edges = std::mem::take(&mut *window_edges.lock());
                            Self::flush_direct(&graph, edges);
                            if let Some(n) = self.cfg.window_levels {
                                graph.keep_only_recent_versions(n);
                            }
                            let snap = graph.snapshot();
                            on_snapshot(&snap);
                        }
                        WindowMode::SingleSnapshot => {
                            let edges = std::mem::take(&mut *window_edges.lock());
                            let standalone = Self::build_single(edges)?;
                            on_snapshot(&standalone.snapshot());
                        }
                    }
                    advances += 1;

                    if let Some(max) = self.cfg.max_advances {
                        if advances >= max {
                            self.terminate();
                            break;
                        }
                    }
                    // An unbounded run unwinds once the source is spent
                    // and the final advance flushed everything; a bounded
                    // run always performs its full advance count.
                    if self.cfg.max_advances.is_none()
                        && source_done.load(Ordering::Acquire)
                        && delta.stats().is_clean()
                        && self.queue.as_ref().map_or(true, |q| q.is_empty())
                        && window_edges.lock().is_empty()
                    {
                        self.terminate();
                        break;
                    }
                }
                Ok(())
            })();

            // A finished analyst releases the ingester too.
            self.terminate();
            let ingest_result = ingest_handle.join().expect("ingest worker panicked");
            worker_error = analyst_result.err().or(ingest_result.err());
        });

        if let Some(err) = worker_error {
            return Err(err);
        }
        Ok(DriverStats {
            advances,
            ingested_edges: ingested.load(Ordering::Relaxed),
            drained_requests: drained.load(Ordering::Relaxed),
            behind_events: behind_events.load(Ordering::Relaxed),
        })
    }

    /// Mode (b): buffered edges become a level directly, no delta pass and
    /// no deletion support.
    fn flush_direct(graph: &MultiVersionGraph, mut edges: Vec<EdgeRec>) {
        if edges.is_empty() {
            return;
        }
        edges.sort_unstable_by_key(|e| (e.tail, e.head));
        let max_id = edges.iter().map(|e| e.tail.max(e.head)).max().unwrap_or(0);
        let max_nodes = (max_id + 1).max(graph.max_nodes());
        let level = CsrLevel::from_sorted_edges(
            max_nodes,
            edges.iter().map(|e| (e.tail, e.head)),
            true,
        );
        let rev = graph.has_reverse().then(|| {
            let mut flipped: Vec<(NodeId, NodeId)> =
                edges.iter().map(|e| (e.head, e.tail)).collect();
            flipped.sort_unstable();
            CsrLevel::from_sorted_edges(max_nodes, flipped, true)
        });
        graph.publish(level, rev, Vec::new());
    }

    /// Mode (c): a brand-new standalone one-level graph from the window.
    fn build_single(mut edges: Vec<EdgeRec>) -> Result<MultiVersionGraph> {
        let standalone = MultiVersionGraph::new(Default::default())?;
        if edges.is_empty() {
            return Ok(standalone);
        }
        edges.sort_unstable_by_key(|e| (e.tail, e.head));
        let max_id = edges.iter().map(|e| e.tail.max(e.head)).max().unwrap_or(0);
        let level = CsrLevel::from_sorted_edges(
            max_id + 1,
            edges.iter().map(|e| (e.tail, e.head)),
            true,
        );
        standalone.publish(level, None, Vec::new());
        Ok(standalone)
    }
}
