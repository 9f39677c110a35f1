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

//! Packed node and edge identifiers.
//!
//! Nodes are dense `u32` indices assigned on first touch and never reused
//! within a run. Edges are packed `u64`s with two subfields:
//!
//! ```text
//! | level: 16 bits | index: 48 bits |
//! ```
//!
//! The level field names the immutable snapshot the edge was frozen into;
//! the index addresses that level's edge table. Level `0xFFFF` is reserved
//! as the writable tag: such an edge still lives in the delta layer and its
//! index encodes the arena slot instead. The level bits are assigned once
//! and never change, so a frozen edge id stays valid for the whole run no
//! matter how many snapshots follow.

use std::fmt;

/// Dense node identifier in `[0, max_nodes)`.
pub type NodeId = u32;

/// Sentinel for "no node".
pub const NIL_NODE: NodeId = u32::MAX;

/// Level tag marking an edge that has not been frozen yet.
pub const WRITABLE_LEVEL: u16 = u16::MAX;

const INDEX_BITS: u32 = 48;
const INDEX_MASK: u64 = (1u64 << INDEX_BITS) - 1;

/// Packed edge identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u64);

impl EdgeId {
    /// Sentinel for "no edge". Shares the writable level tag but uses the
    /// all-ones index, which the arena never hands out.
    pub const NIL: EdgeId = EdgeId(u64::MAX);

    /// Pack an edge frozen into `level` at position `index`.
    #[inline]
    pub fn frozen(level: u16, index: u64) -> Self {
        debug_assert!(level != WRITABLE_LEVEL, "level 0xFFFF is the writable tag");
        debug_assert!(index <= INDEX_MASK);
        EdgeId(((level as u64) << INDEX_BITS) | index)
    }

    /// Pack a writable-delta edge by its arena slot.
    #[inline]
    pub fn writable(slot: u64) -> Self {
        debug_assert!(slot < INDEX_MASK, "arena slot collides with NIL");
        EdgeId(((WRITABLE_LEVEL as u64) << INDEX_BITS) | slot)
    }

    /// Snapshot level this edge was frozen into, or [`WRITABLE_LEVEL`].
    #[inline]
    pub fn level(self) -> u16 {
        (self.0 >> INDEX_BITS) as u16
    }

    /// Position within the level's edge table (or the arena slot for
    /// writable edges).
    #[inline]
    pub fn index(self) -> u64 {
        self.0 & INDEX_MASK
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.level() == WRITABLE_LEVEL && !self.is_nil()
    }

    #[inline]
    pub fn is_nil(self) -> bool {
        self.0 == u64::MAX
    }

    /// Raw packed representation, usable as a map key.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        EdgeId(raw)
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "EdgeId(NIL)")
        } else if self.is_writable() {
            write!(f, "EdgeId(w:{})", self.index())
        } else {
            write!(f, "EdgeId({}:{})", self.level(), self.index())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_roundtrip() {
        let e = EdgeId::frozen(3, 0x0000_1234_5678);
        assert_eq!(e.level(), 3);
        assert_eq!(e.index(), 0x0000_1234_5678);
        assert!(!e.is_writable());
        assert!(!e.is_nil());
    }

    #[test]
    fn test_writable_tag() {
        let e = EdgeId::writable(42);
        assert_eq!(e.level(), WRITABLE_LEVEL);
        assert_eq!(e.index(), 42);
        assert!(e.is_writable());
    }

    #[test]
    fn test_nil_is_not_writable() {
        assert!(EdgeId::NIL.is_nil());
        assert!(!EdgeId::NIL.is_writable());
        assert_eq!(EdgeId::NIL.level(), WRITABLE_LEVEL);
    }

    #[test]
    fn test_raw_roundtrip() {
        let e = EdgeId::frozen(7, 99);
        assert_eq!(EdgeId::from_raw(e.raw()), e);
    }

    #[test]
    fn test_ordering_follows_level_then_index() {
        assert!(EdgeId::frozen(0, 500) < EdgeId::frozen(1, 0));
        assert!(EdgeId::frozen(1, 0) < EdgeId::frozen(1, 1));
        assert!(EdgeId::frozen(1, 1) < EdgeId::writable(0));
    }
}
