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

//! External merge sort over fixed-size records.
//!
//! Records accumulate in an in-memory buffer; when the buffer fills it is
//! sorted (on the rayon pool when enabled) and spilled as one run to a
//! temp file. `sort` finalizes the input, after which `next_block` streams
//! the globally sorted output: a k-way merge keeps one block per run
//! resident and picks the smallest head with a linear scan, which is the
//! right trade for the single-digit run counts a checkpoint produces.
//!
//! Spill files are created with `tempfile::tempfile_in`, so they are
//! unlinked the moment they exist and a crash cannot leak them. Spill
//! directories are used round-robin. All I/O errors are fatal for the
//! sorter instance; there is no partial-result recovery.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use rayon::prelude::*;

use strata_core::{Result, StrataError, XmsConfig};

/// Records per block handed out by [`ExternalSorter::next_block`] and read
/// from each run during the merge.
const BLOCK_RECORDS: usize = 8192;

/// A fixed-size record the sorter can spill and reload. Ordering is the
/// sort order; records that need a different key wrap themselves in a
/// newtype with its own `Ord`.
pub trait SortRecord: Copy + Send + Ord + 'static {
    /// Encoded size in bytes. Every record of a type encodes to exactly
    /// this many bytes.
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

/// A `(tail, head)` pair ordered by tail, then head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EdgePair {
    pub tail: u32,
    pub head: u32,
}

impl SortRecord for EdgePair {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.tail.to_le_bytes());
        buf[4..8].copy_from_slice(&self.head.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        EdgePair {
            tail: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            head: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        }
    }
}

/// One spilled sorted run.
struct Run {
    file: File,
    records: u64,
}

/// Streaming cursor over a spilled run during the merge phase.
struct RunCursor {
    reader: BufReader<File>,
    remaining: u64,
    block: Vec<u8>,
    /// Byte offset of the next record within `block`.
    pos: usize,
    /// Valid bytes in `block`.
    len: usize,
}

impl RunCursor {
    fn new(mut file: File, records: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            reader: BufReader::new(file),
            remaining: records,
            block: Vec::new(),
            pos: 0,
            len: 0,
        })
    }

    fn refill<R: SortRecord>(&mut self) -> Result<()> {
        let want = (self.remaining as usize).min(BLOCK_RECORDS) * R::SIZE;
        self.block.resize(want, 0);
        self.reader.read_exact(&mut self.block[..want])?;
        self.pos = 0;
        self.len = want;
        Ok(())
    }

    fn peek<R: SortRecord>(&mut self) -> Result<Option<R>> {
        if self.pos == self.len {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.refill::<R>()?;
        }
        Ok(Some(R::decode(&self.block[self.pos..self.pos + R::SIZE])))
    }

    fn advance<R: SortRecord>(&mut self) {
        debug_assert!(self.pos < self.len);
        self.pos += R::SIZE;
        self.remaining -= 1;
    }
}

/// Disk-backed sorter; see the module docs for the protocol.
pub struct ExternalSorter<R: SortRecord> {
    cfg: XmsConfig,
    capacity: usize,
    buffer: Vec<R>,
    runs: Vec<Run>,
    next_dir: usize,
    total: u64,
    sorted: bool,
    // Streaming state, built by `sort`.
    cursors: Vec<RunCursor>,
    mem_pos: usize,
    out_block: Vec<R>,
}

impl<R: SortRecord> ExternalSorter<R> {
    pub fn new(cfg: XmsConfig) -> Self {
        let capacity = (cfg.effective_buffer_bytes() / R::SIZE).max(1);
        Self {
            cfg,
            capacity,
            buffer: Vec::new(),
            runs: Vec::new(),
            next_dir: 0,
            total: 0,
            sorted: false,
            cursors: Vec::new(),
            mem_pos: 0,
            out_block: Vec::new(),
        }
    }

    /// Override the buffer capacity in records. Exists for tests and
    /// benches that need to force spills with small inputs.
    pub fn with_buffer_records(mut self, records: usize) -> Self {
        self.capacity = records.max(1);
        self
    }

    /// Records accepted so far.
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of spilled runs; zero means the whole input fit in memory.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Append a record, spilling the buffer as a sorted run if it is full.
    pub fn push(&mut self, record: R) -> Result<()> {
        if self.sorted {
            return Err(StrataError::SorterState("push after sort"));
        }
        if self.buffer.len() == self.capacity {
            self.spill()?;
        }
        self.buffer.push(record);
        self.total += 1;
        Ok(())
    }

    fn sort_buffer(&mut self) {
        if self.cfg.parallel {
            self.buffer.par_sort_unstable();
        } else {
            self.buffer.sort_unstable();
        }
    }

    fn spill(&mut self) -> Result<()> {
        self.sort_buffer();

        let file = match self.cfg.tmp_dirs.as_slice() {
            [] => tempfile::tempfile()?,
            dirs => {
                let dir = &dirs[self.next_dir % dirs.len()];
                self.next_dir += 1;
                tempfile::tempfile_in(dir)?
            }
        };

        let records = self.buffer.len() as u64;
        let mut writer = BufWriter::new(file);
        let mut scratch = vec![0u8; R::SIZE];
        for rec in &self.buffer {
            rec.encode(&mut scratch);
            writer.write_all(&scratch)?;
        }
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| StrataError::Io(e.into_error()))?;

        tracing::debug!(records, run = self.runs.len(), "spilled sorted run");
        self.runs.push(Run { file, records });
        self.buffer.clear();
        Ok(())
    }

    /// Finalize input. Afterwards `next_block` yields the whole input in
    /// non-decreasing order.
    pub fn sort(&mut self) -> Result<()> {
        if self.sorted {
            return Err(StrataError::SorterState("sort called twice"));
        }
        if self.runs.is_empty() {
            // Everything fit in memory; serve blocks straight from the
            // buffer.
            self.sort_buffer();
        } else {
            if !self.buffer.is_empty() {
                self.spill()?;
            }
            for run in self.runs.drain(..) {
                self.cursors.push(RunCursor::new(run.file, run.records)?);
            }
        }
        self.sorted = true;
        self.mem_pos = 0;
        Ok(())
    }

    /// Next block of sorted output, or `None` at end of stream.
    pub fn next_block(&mut self) -> Result<Option<&[R]>> {
        if !self.sorted {
            return Err(StrataError::SorterState("next_block before sort"));
        }

        if self.cursors.is_empty() {
            if self.mem_pos >= self.buffer.len() {
                return Ok(None);
            }
            let start = self.mem_pos;
            let end = (start + BLOCK_RECORDS).min(self.buffer.len());
            self.mem_pos = end;
            return Ok(Some(&self.buffer[start..end]));
        }

        self.out_block.clear();
        while self.out_block.len() < BLOCK_RECORDS {
            // Linear scan for the smallest head across runs; ties keep
            // the earlier run.
            let mut min: Option<(usize, R)> = None;
            for i in 0..self.cursors.len() {
                if let Some(head) = self.cursors[i].peek::<R>()? {
                    let better = match min {
                        Some((_, best)) => head < best,
                        None => true,
                    };
                    if better {
                        min = Some((i, head));
                    }
                }
            }
            match min {
                Some((i, rec)) => {
                    self.cursors[i].advance::<R>();
                    self.out_block.push(rec);
                }
                None => break,
            }
        }

        if self.out_block.is_empty() {
            Ok(None)
        } else {
            Ok(Some(&self.out_block))
        }
    }

    /// Restart iteration over the already-sorted output.
    pub fn rewind_sorted(&mut self) -> Result<()> {
        if !self.sorted {
            return Err(StrataError::SorterState("rewind before sort"));
        }
        self.mem_pos = 0;
        // Run length is recovered from the file size; cursors track only
        // what is left to read.
        let mut rebuilt = Vec::with_capacity(self.cursors.len());
        for cursor in self.cursors.drain(..) {
            let file = cursor.reader.into_inner();
            let bytes = file.metadata()?.len();
            rebuilt.push(RunCursor::new(file, bytes / R::SIZE as u64)?);
        }
        self.cursors = rebuilt;
        Ok(())
    }

    /// Discard all state. Only valid before `sort`.
    pub fn clear(&mut self) -> Result<()> {
        if self.sorted {
            return Err(StrataError::SorterState("clear after sort"));
        }
        self.buffer.clear();
        self.runs.clear();
        self.total = 0;
        self.next_dir = 0;
        Ok(())
    }

    /// Drain the sorted output through a callback, one record at a time.
    pub fn for_each_sorted<F: FnMut(R)>(&mut self, mut f: F) -> Result<()> {
        while let Some(block) = self.next_block()? {
            for rec in block {
                f(*rec);
            }
        }
        Ok(())
    }
}
