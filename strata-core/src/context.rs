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

//! Ingest context: an explicit logical clock.
//!
//! Mutators take the context as an argument instead of consulting
//! thread-local or global state, which keeps the library independent of
//! any particular threading model. Timestamps are logical ticks, not wall
//! clock; the driver advances the clock once per applied batch.

use std::sync::atomic::{AtomicU32, Ordering};

/// Logical timestamp stamped on node/edge create and delete events.
pub type Timestamp = u32;

/// Shared logical clock plus the identity of the open ingest session.
#[derive(Debug)]
pub struct IngestContext {
    clock: AtomicU32,
    session: u64,
}

impl IngestContext {
    pub fn new(session: u64) -> Self {
        Self {
            clock: AtomicU32::new(1),
            session,
        }
    }

    /// Current tick without advancing.
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.clock.load(Ordering::Relaxed)
    }

    /// Advance the clock and return the new tick.
    #[inline]
    pub fn advance(&self) -> Timestamp {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn session(&self) -> u64 {
        self.session
    }
}

impl Default for IngestContext {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_nonzero_and_advances() {
        let ctx = IngestContext::new(7);
        let t0 = ctx.now();
        assert!(t0 > 0);
        let t1 = ctx.advance();
        assert_eq!(t1, t0 + 1);
        assert_eq!(ctx.now(), t1);
        assert_eq!(ctx.session(), 7);
    }
}
