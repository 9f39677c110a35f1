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

//! Plain-text edge lists (SNAP `.net`/`.snap`).
//!
//! Newline-delimited, `#` starts a comment line, edges are
//! whitespace-separated ASCII integers `tail head` (extra columns are
//! ignored). A malformed line is logged and counted; once the error budget
//! is spent the file is abandoned. Partial loading seeks to the shard's
//! byte range and resyncs to the next line start.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use strata_core::{DataSource, EdgeRec, LoaderConfig, Result, SourceStat, StrataError};

use crate::shape::{partial_range, Shaper};

pub struct SnapEdgeList {
    path: PathBuf,
    cfg: LoaderConfig,
    shaper: Shaper,
    reader: BufReader<File>,
    staged: std::collections::VecDeque<EdgeRec>,
    /// Byte offset of the next unread line start.
    offset: u64,
    /// First byte past this shard's range.
    end: u64,
    errors: u64,
    line_no: u64,
    edges_seen: u64,
    done: bool,
}

impl SnapEdgeList {
    pub fn open(path: impl AsRef<Path>, cfg: LoaderConfig) -> Result<Self> {
        cfg.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let filesize = file.metadata()?.len();

        let (start, end) = match cfg.partial_load {
            Some(p) => partial_range(filesize, p),
            None => (0, filesize),
        };

        let mut reader = BufReader::new(file);
        let mut offset = start;
        if start > 0 {
            // Resync: a line belongs to the shard its first byte falls
            // into. Starting one byte early distinguishes "start is a
            // line boundary" (only the newline is consumed) from "start
            // cuts a line" (the remainder belongs to the previous shard).
            reader.seek(SeekFrom::Start(start - 1))?;
            let mut skipped = Vec::new();
            let n = reader.read_until(b'\n', &mut skipped)?;
            offset = start - 1 + n as u64;
        }

        let shaper = Shaper::new(cfg.direction);
        Ok(Self {
            path,
            cfg,
            shaper,
            reader,
            staged: Default::default(),
            offset,
            end,
            errors: 0,
            line_no: 0,
            edges_seen: 0,
            done: false,
        })
    }

    fn parse_line(line: &str) -> Option<(u32, u32)> {
        let mut tokens = line.split_whitespace();
        let tail = tokens.next()?.parse().ok()?;
        let head = tokens.next()?.parse().ok()?;
        Some((tail, head))
    }
}

impl DataSource for SnapEdgeList {
    fn pull(&mut self, max_edges: usize) -> Result<bool> {
        let budget = match self.cfg.max_edges {
            Some(cap) => max_edges.min(cap),
            None => max_edges,
        };

        let mut staged = 0;
        let mut line = String::new();
        while staged < budget && !self.done {
            if self.offset >= self.end {
                self.done = true;
                break;
            }
            line.clear();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                self.done = true;
                break;
            }
            self.offset += n as u64;
            self.line_no += 1;

            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            match Self::parse_line(text) {
                Some((tail, head)) => {
                    self.edges_seen += 1;
                    staged += self
                        .shaper
                        .stage(EdgeRec::new(tail, head), &mut self.staged);
                }
                None => {
                    self.errors += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        line = self.line_no,
                        "skipping malformed edge line"
                    );
                    if self.errors > self.cfg.error_limit {
                        return Err(StrataError::InputAbandoned {
                            path: self.path.display().to_string(),
                            errors: self.errors,
                        });
                    }
                }
            }
        }
        Ok(!self.done)
    }

    fn next_edge(&mut self) -> Option<EdgeRec> {
        self.staged.pop_front()
    }

    fn stat(&self) -> SourceStat {
        SourceStat {
            nodes: None,
            edges: Some(self.edges_seen),
            origin: self.path.display().to_string(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        *self = Self::open(&self.path, self.cfg.clone())?;
        Ok(())
    }
}
