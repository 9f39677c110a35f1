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

//! Strata Ingest Layer
//!
//! File-format readers behind the [`strata_core::DataSource`] seam:
//!
//! - [`SnapEdgeList`]: plain ASCII edge lists (`.net`/`.snap`) with `#`
//!   comments; malformed lines are logged and skipped up to an error
//!   budget.
//! - [`XsBinary`]: packed little-endian `{u32 tail, u32 head, f32 weight}`
//!   records (`.dat`/`.xs1`) with an optional `.ini` stats sidecar.
//! - [`FgfReader`]: the big-endian block-framed binary property graph
//!   (`.fgf`).
//!
//! All readers share the same shaping options: direction handling, a
//! per-pull edge cap, and byte-range partial loading with record-boundary
//! resync.

pub mod fgf;
pub mod shape;
pub mod snap;
pub mod xsb;

pub use fgf::FgfReader;
pub use shape::{partial_range, Shaper};
pub use snap::SnapEdgeList;
pub use xsb::XsBinary;
