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

//! Engine error taxonomy.
//!
//! Recoverable conditions (a bad input line, a missing optional sidecar)
//! are logged and skipped at the point of occurrence; everything that
//! reaches this enum aborts the operation that produced it. There is no
//! middle ground: the caller either sees a clean completion with stats or
//! one of these.

use thiserror::Error;

use crate::ids::NodeId;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, StrataError>;

#[derive(Debug, Error)]
pub enum StrataError {
    /// Read/write/seek failure. Fatal for the operation; XMS and checkpoint
    /// make no attempt at partial-result recovery.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Too many malformed lines/records; the input file is abandoned.
    #[error("abandoned {path} after {errors} parse errors")]
    InputAbandoned { path: String, errors: u64 },

    /// A malformed framed record that cannot be skipped (binary formats
    /// have no resync point inside a block).
    #[error("malformed {format} input at byte {offset}: {reason}")]
    MalformedRecord {
        format: &'static str,
        offset: u64,
        reason: String,
    },

    /// Rejected configuration; surfaced during validation before any work
    /// begins.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A feature combination the engine does not support.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Node id outside `[0, max_nodes)` reached a frozen-store operation.
    #[error("node {0} out of range")]
    NodeOutOfRange(NodeId),

    /// The queried level was retired by the window policy.
    #[error("level {0} has been retired")]
    LevelRetired(u16),

    /// Single-consumer discipline on a request-queue stripe was violated:
    /// the dequeued sequence number diverged from the expected head.
    /// Indicates multi-writer misuse and is not recoverable.
    #[error("queue stripe {stripe}: expected head sequence {expected}, observed {observed}")]
    QueueRace {
        stripe: usize,
        expected: u64,
        observed: u64,
    },

    /// The sorter was used out of protocol (e.g. `push` after `sort`).
    #[error("sorter protocol violation: {0}")]
    SorterState(&'static str),

    /// A persisted level file failed its integrity check.
    #[error("corrupt level file {path}: {reason}")]
    CorruptLevelFile { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_actionable() {
        let e = StrataError::QueueRace {
            stripe: 3,
            expected: 10,
            observed: 12,
        };
        assert_eq!(
            e.to_string(),
            "queue stripe 3: expected head sequence 10, observed 12"
        );

        let e = StrataError::InputAbandoned {
            path: "graph.net".into(),
            errors: 101,
        };
        assert!(e.to_string().contains("graph.net"));
    }
}
