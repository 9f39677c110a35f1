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

//! Packed binary edge lists (`.dat`/`.xs1`).
//!
//! Little-endian records of `{u32 tail, u32 head, f32 weight}`, 12 bytes
//! each, no framing. An optional sidecar `<file>.ini` carries `vertices=`
//! and `edges=` stats keys. Binary input has no resync point, so a
//! truncated record is fatal rather than skippable. Partial loading
//! aligns the byte range up to the next record boundary.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};

use strata_core::{DataSource, EdgeRec, LoaderConfig, Result, SourceStat, StrataError};

use crate::shape::{partial_range, Shaper};

/// Bytes per record: two u32 ids and one f32 weight.
const RECORD_BYTES: u64 = 12;

pub struct XsBinary {
    path: PathBuf,
    cfg: LoaderConfig,
    shaper: Shaper,
    reader: BufReader<File>,
    staged: std::collections::VecDeque<EdgeRec>,
    offset: u64,
    end: u64,
    declared_nodes: Option<u64>,
    declared_edges: Option<u64>,
    edges_seen: u64,
    done: bool,
}

impl XsBinary {
    pub fn open(path: impl AsRef<Path>, cfg: LoaderConfig) -> Result<Self> {
        cfg.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let filesize = file.metadata()?.len();

        let (raw_start, raw_end) = match cfg.partial_load {
            Some(p) => partial_range(filesize, p),
            None => (0, filesize),
        };
        // Resync to record boundaries: each shard owns the records whose
        // first byte falls inside its raw range.
        let start = raw_start.div_ceil(RECORD_BYTES) * RECORD_BYTES;
        let end = raw_end.div_ceil(RECORD_BYTES) * RECORD_BYTES;

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start))?;

        let (declared_nodes, declared_edges) = Self::read_sidecar(&path);
        let shaper = Shaper::new(cfg.direction);
        Ok(Self {
            path,
            cfg,
            shaper,
            reader,
            staged: Default::default(),
            offset: start,
            end: end.min(filesize),
            declared_nodes,
            declared_edges,
            edges_seen: 0,
            done: false,
        })
    }

    /// `vertices=` / `edges=` keys from the optional `.ini` sidecar.
    fn read_sidecar(path: &Path) -> (Option<u64>, Option<u64>) {
        let sidecar = path.with_extension("ini");
        let Ok(text) = std::fs::read_to_string(&sidecar) else {
            return (None, None);
        };
        let mut nodes = None;
        let mut edges = None;
        for line in text.lines() {
            let line = line.trim();
            if let Some(v) = line.strip_prefix("vertices=") {
                nodes = v.trim().parse().ok();
            } else if let Some(v) = line.strip_prefix("edges=") {
                edges = v.trim().parse().ok();
            }
        }
        (nodes, edges)
    }

    fn read_record(&mut self) -> Result<EdgeRec> {
        let tail = self.reader.read_u32::<LittleEndian>()?;
        let head = self.reader.read_u32::<LittleEndian>()?;
        let weight = self.reader.read_f32::<LittleEndian>()?;
        Ok(EdgeRec::weighted(tail, head, weight))
    }
}

impl DataSource for XsBinary {
    fn pull(&mut self, max_edges: usize) -> Result<bool> {
        let budget = match self.cfg.max_edges {
            Some(cap) => max_edges.min(cap),
            None => max_edges,
        };

        let mut staged = 0;
        while staged < budget && !self.done {
            if self.offset + RECORD_BYTES > self.end {
                if self.offset != self.end {
                    return Err(StrataError::MalformedRecord {
                        format: "xs1",
                        offset: self.offset,
                        reason: "file does not end on a record boundary".into(),
                    });
                }
                self.done = true;
                break;
            }
            let rec = self.read_record().map_err(|e| match e {
                StrataError::Io(io) => StrataError::MalformedRecord {
                    format: "xs1",
                    offset: self.offset,
                    reason: io.to_string(),
                },
                other => other,
            })?;
            self.offset += RECORD_BYTES;
            self.edges_seen += 1;
            staged += self.shaper.stage(rec, &mut self.staged);
        }
        Ok(!self.done)
    }

    fn next_edge(&mut self) -> Option<EdgeRec> {
        self.staged.pop_front()
    }

    fn stat(&self) -> SourceStat {
        SourceStat {
            nodes: self.declared_nodes,
            edges: self.declared_edges.or(Some(self.edges_seen)),
            origin: self.path.display().to_string(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        *self = Self::open(&self.path, self.cfg.clone())?;
        Ok(())
    }
}
