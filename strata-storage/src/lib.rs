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

//! Strata Storage Engine
//!
//! The multi-versioned graph store: an evolving directed graph that
//! absorbs a continuous edge stream into a writable delta, periodically
//! freezes the accumulated changes into immutable CSR levels, and serves
//! analytics from pinned read-only snapshots while ingest keeps running.
//!
//! ## Architecture
//!
//! ```text
//! producers ──> WritableGraph (arena + per-vertex locks)
//!                  │  checkpoint (XMS sort -> CSR build -> publish)
//!                  ▼
//!              MultiVersionGraph (L0 L1 L2 ... + visibility + columns)
//!                  │  snapshot (pinned level count)
//!                  ▼
//!              analytics workers
//! ```
//!
//! The sliding-window driver wires a data source to the delta and runs
//! checkpoint + analytics on a wall-clock schedule; old levels retire by
//! count and are freed once the last snapshot holding them is gone.

pub mod checkpoint;
pub mod delta;
pub mod driver;
pub mod level;
pub mod persist;
pub mod props;
pub mod queue;
pub mod store;
pub mod visibility;
pub mod xms;

pub use checkpoint::{CheckpointEngine, CheckpointStats};
pub use delta::{DeltaStats, NodeState, WritableGraph};
pub use driver::{DriverStats, SlidingWindowDriver};
pub use level::{AdjacencyIter, CsrLevel, LevelBuilder};
pub use persist::{load_level, load_store, save_level, save_store, PersistConfig};
pub use props::{ColumnKind, PropertyColumn, PropertyRegistry, WEIGHT_COLUMN};
pub use queue::{Request, RequestQueue};
pub use store::{GraphSnapshot, MultiLevelIter, MultiVersionGraph};
pub use visibility::{DeletionMap, VisibilityMap};
pub use xms::{EdgePair, ExternalSorter, SortRecord};
