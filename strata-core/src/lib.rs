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

//! Strata Core Types
//!
//! Shared vocabulary for the multi-versioned graph engine: node and edge
//! identifiers, the error taxonomy, configuration structs, the ingest
//! context (logical clock), and the `DataSource` seam that edge producers
//! implement.
//!
//! Everything here is storage-agnostic; the engine itself lives in
//! `strata-storage` and the file-format readers in `strata-ingest`.

pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod source;

pub use config::{
    BatchSizing, Direction, DriverConfig, DuplicateMode, LoaderConfig, PartialLoad, StoreConfig,
    WindowMode, XmsConfig,
};
pub use context::{IngestContext, Timestamp};
pub use error::{Result, StrataError};
pub use ids::{EdgeId, NodeId, NIL_NODE, WRITABLE_LEVEL};
pub use source::{DataSource, EdgeRec, MemorySource, SourceStat};
