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

//! Configuration structs.
//!
//! All knobs are explicit values validated up front; an invalid combination
//! is rejected before any work begins. The window mechanics are a closed
//! enum chosen at driver construction time, not a compile-time switch.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// How raw `(tail, head)` pairs are interpreted on ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Store pairs as given.
    #[default]
    Directed,
    /// Emit both directions for every pair.
    UndirectedDouble,
    /// Canonicalize so that `tail < head`.
    UndirectedOrdered,
}

/// What to do with repeated `(tail, head)` pairs within one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMode {
    /// Keep duplicates as distinct edges.
    #[default]
    Keep,
    /// Drop later duplicates within a level.
    Drop,
    /// Fold duplicates into one edge and count them in its `weight`
    /// property. The weight shares the surviving edge's visibility.
    SquashWeights,
}

/// Window mechanics, fixed at driver construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Mutations buffer in the writable delta; every advance freezes one
    /// new level and old levels retire by count.
    #[default]
    DeltaCheckpoint,
    /// New edges buffer outside the delta and flush directly as a new
    /// level. Deletions are not supported in this mode.
    DirectToReadOnly,
    /// Every advance builds a standalone single-level graph from the
    /// window's edges; nothing is shared across windows.
    SingleSnapshot,
}

/// External merge sort tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XmsConfig {
    /// In-memory buffer in bytes; 0 selects the built-in default. The
    /// effective value is clamped to at least 1 MiB and halved when the
    /// parallel in-memory sort is enabled, since both merge halves are
    /// resident at once.
    pub buffer_bytes: usize,
    /// Spill directories, used round-robin. Empty means the system temp
    /// directory.
    pub tmp_dirs: Vec<PathBuf>,
    /// Sort buffered runs on the rayon pool.
    pub parallel: bool,
}

/// Default spill buffer. A fixed constant rather than an OS free-memory
/// probe; deployments that know better set `buffer_bytes` directly.
pub const XMS_DEFAULT_BUFFER: usize = 256 * 1024 * 1024;

/// Lower clamp for the spill buffer.
pub const XMS_MIN_BUFFER: usize = 1024 * 1024;

impl Default for XmsConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: 0,
            tmp_dirs: Vec::new(),
            parallel: true,
        }
    }
}

impl XmsConfig {
    /// Resolve the configured buffer size to the value the sorter uses.
    pub fn effective_buffer_bytes(&self) -> usize {
        let mut bytes = if self.buffer_bytes == 0 {
            XMS_DEFAULT_BUFFER
        } else {
            self.buffer_bytes
        };
        if self.parallel {
            bytes /= 2;
        }
        bytes.max(XMS_MIN_BUFFER)
    }
}

/// Multi-version store construction options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maintain the reverse-direction twin (in-edges).
    pub reverse_edges: bool,
    /// Also build the out-edge to in-edge id correspondence columns.
    /// Requires `reverse_edges`.
    pub reverse_maps: bool,
    /// Skip property columns entirely.
    pub no_properties: bool,
    /// Keep only the `n` most recent levels; `None` keeps everything.
    pub window_levels: Option<usize>,
    /// External sort tuning used by checkpoints.
    #[serde(default)]
    pub xms: XmsConfig,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reverse_maps && !self.reverse_edges {
            return Err(StrataError::InvalidConfig(
                "reverse_maps requires reverse_edges".into(),
            ));
        }
        if let Some(n) = self.window_levels {
            if n == 0 {
                return Err(StrataError::InvalidConfig(
                    "window_levels must be at least 1".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Byte-offset sharding of a source file across loader instances.
///
/// Part numbers are 1-based; part `p` of `n` covers
/// `[filesize*(p-1)/n, filesize*p/n)` with resync to the next record
/// boundary at the start of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialLoad {
    pub part: u64,
    pub num_parts: u64,
}

/// Options shared by every file-format reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub duplicates: DuplicateMode,
    /// Per-`pull` cap on staged edges; `None` leaves it to the caller's
    /// `max_edges` argument alone.
    pub max_edges: Option<usize>,
    /// Parse-error budget before a text input is abandoned.
    pub error_limit: u64,
    /// Skip property columns while reading property-graph inputs.
    pub no_properties: bool,
    pub partial_load: Option<PartialLoad>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Directed,
            duplicates: DuplicateMode::Keep,
            max_edges: None,
            error_limit: 100,
            no_properties: false,
            partial_load: None,
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.partial_load {
            if p.num_parts == 0 {
                return Err(StrataError::InvalidConfig("num_parts must be > 0".into()));
            }
            if p.part == 0 || p.part > p.num_parts {
                return Err(StrataError::InvalidConfig(format!(
                    "partial load part {} out of range 1..={}",
                    p.part, p.num_parts
                )));
            }
        }
        Ok(())
    }
}

/// Batch-size distribution for the ingest worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSizing {
    Fixed { size: usize },
    Uniform { min: usize, max: usize },
    /// Gaussian truncated to `[min, max]`.
    Gaussian { min: usize, max: usize, mean: f64, std_dev: f64 },
}

impl Default for BatchSizing {
    fn default() -> Self {
        BatchSizing::Fixed { size: 1024 }
    }
}

/// Sliding-window driver options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Wall-clock between analytics advances.
    pub advance_interval_ms: u64,
    /// Stop after this many advances; `None` runs until terminated or the
    /// source is exhausted.
    pub max_advances: Option<u64>,
    #[serde(default)]
    pub batch: BatchSizing,
    /// Ingest rate limit in edges per second; `None` runs unthrottled.
    pub rate_limit_eps: Option<u64>,
    /// Request-queue backlog above which the analyst drains before
    /// advancing.
    pub drain_threshold: usize,
    #[serde(default)]
    pub mode: WindowMode,
    /// Retention applied after each advance.
    pub window_levels: Option<usize>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            advance_interval_ms: 1000,
            max_advances: None,
            batch: BatchSizing::default(),
            rate_limit_eps: None,
            drain_threshold: 1 << 16,
            mode: WindowMode::DeltaCheckpoint,
            window_levels: None,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.advance_interval_ms == 0 {
            return Err(StrataError::InvalidConfig(
                "advance_interval_ms must be > 0".into(),
            ));
        }
        match self.batch {
            BatchSizing::Fixed { size } if size == 0 => {
                return Err(StrataError::InvalidConfig("batch size must be > 0".into()));
            }
            BatchSizing::Uniform { min, max } | BatchSizing::Gaussian { min, max, .. }
                if min == 0 || min > max =>
            {
                return Err(StrataError::InvalidConfig(format!(
                    "batch bounds [{min}, {max}] are not a valid range"
                )));
            }
            _ => {}
        }
        Ok(())
    }
}
