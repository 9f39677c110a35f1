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

//! Binary property graph reader (`.fgf`).
//!
//! Everything is big-endian and arrives through a block-framed wrapper for
//! streaming decode: each block is a one-byte magic (0x77 = one-byte
//! length, 0x7a = four-byte length) followed by that many payload bytes,
//! and the logical stream is the concatenation of payloads.
//!
//! Logical stream layout:
//!
//! ```text
//! "FGF" '1'
//! initial_vertex_id: u64,  initial_edge_id: u64
//! "CNTS"  node_type_count: u16  { name: u16-len utf8, count: u64 }...
//!         edge_type_count: u16  { name, count: u64 }...
//! "ATTR"  attr_count: u16  { name, type_code: u16 }...
//!             type codes: 0x01 = string, 0x12 = i32
//! per node type: "NODE" type_index: u16, then `count` records
//!     { bag_len: u16, bag_len x (attr_index: u16, value) }
//! per edge type: "EDGE" type_index: u16, then `count` records
//!     { head: u64, tail: u64, bag }
//! "ENDG"
//! ```
//!
//! Vertices are numbered densely from `initial_vertex_id` in record
//! order; edge endpoints are absolute vertex ids and are rebased to dense
//! node ids. An i32 edge attribute named `weight` surfaces as the edge
//! weight unless properties are disabled. A malformed byte is fatal:
//! framed binary has no resync point.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};

use strata_core::{DataSource, EdgeRec, LoaderConfig, NodeId, Result, SourceStat, StrataError};

use crate::shape::Shaper;

const BLOCK_SHORT: u8 = 0x77;
const BLOCK_LONG: u8 = 0x7a;

const TYPE_STRING: u16 = 0x01;
const TYPE_I32: u16 = 0x12;

/// Un-frames the 0x77/0x7a block wrapper into a plain byte stream.
#[derive(Debug)]
struct FramedReader<R: Read> {
    inner: R,
    /// Payload bytes left in the current block.
    remaining: usize,
    /// Logical (de-framed) offset, for error reporting.
    offset: u64,
}

impl<R: Read> FramedReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            remaining: 0,
            offset: 0,
        }
    }

    /// Opens the next block. `Ok(false)` at clean end of input.
    fn next_block(&mut self) -> std::io::Result<bool> {
        let mut magic = [0u8; 1];
        match self.inner.read_exact(&mut magic) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e),
        }
        self.remaining = match magic[0] {
            BLOCK_SHORT => self.inner.read_u8()? as usize,
            BLOCK_LONG => self.inner.read_u32::<BigEndian>()? as usize,
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("bad block magic 0x{other:02x}"),
                ))
            }
        };
        Ok(true)
    }
}

impl<R: Read> Read for FramedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.remaining == 0 {
            if !self.next_block()? {
                return Ok(0);
            }
        }
        let want = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..want])?;
        self.remaining -= n;
        self.offset += n as u64;
        Ok(n)
    }
}

#[derive(Debug, Clone)]
struct TypeEntry {
    #[allow(dead_code)]
    name: String,
    count: u64,
}

#[derive(Debug, Clone)]
struct AttrDef {
    name: String,
    type_code: u16,
}

/// The section the cursor is inside of.
#[derive(Debug, Clone, Copy)]
enum Section {
    /// Remaining node records of the current node type.
    Nodes(u64),
    /// Remaining edge records of the current edge type.
    Edges(u64),
    /// Between sections; the next tag decides.
    Idle,
    Finished,
}

#[derive(Debug)]
pub struct FgfReader {
    path: PathBuf,
    cfg: LoaderConfig,
    shaper: Shaper,
    stream: FramedReader<BufReader<File>>,
    staged: std::collections::VecDeque<EdgeRec>,
    initial_vertex_id: u64,
    #[allow(dead_code)]
    initial_edge_id: u64,
    node_types: Vec<TypeEntry>,
    edge_types: Vec<TypeEntry>,
    attrs: Vec<AttrDef>,
    section: Section,
    next_node_type: usize,
    next_edge_type: usize,
    nodes_seen: u64,
    edges_seen: u64,
}

impl FgfReader {
    pub fn open(path: impl AsRef<Path>, cfg: LoaderConfig) -> Result<Self> {
        cfg.validate()?;
        if cfg.partial_load.is_some() {
            return Err(StrataError::InvalidConfig(
                "partial load is not supported for fgf inputs".into(),
            ));
        }
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut reader = Self {
            shaper: Shaper::new(cfg.direction),
            stream: FramedReader::new(BufReader::new(file)),
            staged: Default::default(),
            initial_vertex_id: 0,
            initial_edge_id: 0,
            node_types: Vec::new(),
            edge_types: Vec::new(),
            attrs: Vec::new(),
            section: Section::Idle,
            next_node_type: 0,
            next_edge_type: 0,
            nodes_seen: 0,
            edges_seen: 0,
            path,
            cfg,
        };
        reader.read_header()?;
        Ok(reader)
    }

    fn malformed(&self, reason: impl Into<String>) -> StrataError {
        StrataError::MalformedRecord {
            format: "fgf",
            offset: self.stream.offset,
            reason: reason.into(),
        }
    }

    fn expect_tag(&mut self, tag: &[u8; 4]) -> Result<()> {
        let mut got = [0u8; 4];
        self.stream.read_exact(&mut got)?;
        if &got != tag {
            let want = String::from_utf8_lossy(tag).into_owned();
            return Err(self.malformed(format!("expected {want:?} section tag")));
        }
        Ok(())
    }

    fn read_name(&mut self) -> Result<String> {
        let len = self.stream.read_u16::<BigEndian>()? as usize;
        let mut bytes = vec![0u8; len];
        self.stream.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| self.malformed("name is not valid utf-8"))
    }

    fn read_header(&mut self) -> Result<()> {
        let mut magic = [0u8; 4];
        self.stream.read_exact(&mut magic)?;
        if &magic != b"FGF1" {
            return Err(self.malformed("bad magic, expected FGF version 1"));
        }
        self.initial_vertex_id = self.stream.read_u64::<BigEndian>()?;
        self.initial_edge_id = self.stream.read_u64::<BigEndian>()?;

        self.expect_tag(b"CNTS")?;
        let node_type_count = self.stream.read_u16::<BigEndian>()?;
        for _ in 0..node_type_count {
            let name = self.read_name()?;
            let count = self.stream.read_u64::<BigEndian>()?;
            self.node_types.push(TypeEntry { name, count });
        }
        let edge_type_count = self.stream.read_u16::<BigEndian>()?;
        for _ in 0..edge_type_count {
            let name = self.read_name()?;
            let count = self.stream.read_u64::<BigEndian>()?;
            self.edge_types.push(TypeEntry { name, count });
        }

        self.expect_tag(b"ATTR")?;
        let attr_count = self.stream.read_u16::<BigEndian>()?;
        for _ in 0..attr_count {
            let name = self.read_name()?;
            let type_code = self.stream.read_u16::<BigEndian>()?;
            if type_code != TYPE_STRING && type_code != TYPE_I32 {
                return Err(self.malformed(format!("unknown attribute type 0x{type_code:02x}")));
            }
            self.attrs.push(AttrDef { name, type_code });
        }
        Ok(())
    }

    /// Consume one property bag; returns the i32 `weight` attribute when
    /// present and wanted.
    fn read_bag(&mut self) -> Result<Option<f32>> {
        let entries = self.stream.read_u16::<BigEndian>()?;
        let mut weight = None;
        for _ in 0..entries {
            let attr_index = self.stream.read_u16::<BigEndian>()? as usize;
            let def = self
                .attrs
                .get(attr_index)
                .cloned()
                .ok_or_else(|| self.malformed(format!("attribute index {attr_index} out of range")))?;
            match def.type_code {
                TYPE_STRING => {
                    let len = self.stream.read_u16::<BigEndian>()? as usize;
                    let mut skip = vec![0u8; len];
                    self.stream.read_exact(&mut skip)?;
                }
                TYPE_I32 => {
                    let value = self.stream.read_i32::<BigEndian>()?;
                    if !self.cfg.no_properties && def.name == "weight" {
                        weight = Some(value as f32);
                    }
                }
                _ => unreachable!("validated at header"),
            }
        }
        Ok(weight)
    }

    fn rebase(&self, vertex: u64) -> Result<NodeId> {
        let dense = vertex
            .checked_sub(self.initial_vertex_id)
            .ok_or_else(|| self.malformed(format!("vertex id {vertex} below initial id")))?;
        u32::try_from(dense).map_err(|_| self.malformed("vertex id exceeds dense id space"))
    }

    /// Advance to the next section; `Ok(false)` once ENDG was consumed.
    fn open_section(&mut self) -> Result<bool> {
        let mut tag = [0u8; 4];
        self.stream.read_exact(&mut tag)?;
        match &tag {
            b"NODE" => {
                let type_index = self.stream.read_u16::<BigEndian>()? as usize;
                if type_index != self.next_node_type || type_index >= self.node_types.len() {
                    return Err(self.malformed(format!("unexpected node type {type_index}")));
                }
                self.next_node_type += 1;
                self.section = Section::Nodes(self.node_types[type_index].count);
                Ok(true)
            }
            b"EDGE" => {
                let type_index = self.stream.read_u16::<BigEndian>()? as usize;
                if type_index != self.next_edge_type || type_index >= self.edge_types.len() {
                    return Err(self.malformed(format!("unexpected edge type {type_index}")));
                }
                self.next_edge_type += 1;
                self.section = Section::Edges(self.edge_types[type_index].count);
                Ok(true)
            }
            b"ENDG" => {
                self.section = Section::Finished;
                Ok(false)
            }
            other => Err(self.malformed(format!(
                "unknown section tag {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

impl DataSource for FgfReader {
    fn pull(&mut self, max_edges: usize) -> Result<bool> {
        let budget = match self.cfg.max_edges {
            Some(cap) => max_edges.min(cap),
            None => max_edges,
        };

        let mut staged = 0;
        loop {
            if staged >= budget {
                return Ok(true);
            }
            match self.section {
                Section::Finished => return Ok(false),
                Section::Idle => {
                    if !self.open_section()? {
                        return Ok(false);
                    }
                }
                Section::Nodes(0) | Section::Edges(0) => {
                    self.section = Section::Idle;
                }
                Section::Nodes(remaining) => {
                    self.read_bag()?;
                    self.nodes_seen += 1;
                    self.section = Section::Nodes(remaining - 1);
                }
                Section::Edges(remaining) => {
                    let head = self.stream.read_u64::<BigEndian>()?;
                    let tail = self.stream.read_u64::<BigEndian>()?;
                    let weight = self.read_bag()?;
                    let rec = EdgeRec {
                        tail: self.rebase(tail)?,
                        head: self.rebase(head)?,
                        weight,
                    };
                    self.edges_seen += 1;
                    staged += self.shaper.stage(rec, &mut self.staged);
                    self.section = Section::Edges(remaining - 1);
                }
            }
        }
    }

    fn next_edge(&mut self) -> Option<EdgeRec> {
        self.staged.pop_front()
    }

    fn stat(&self) -> SourceStat {
        let declared_nodes: u64 = self.node_types.iter().map(|t| t.count).sum();
        let declared_edges: u64 = self.edge_types.iter().map(|t| t.count).sum();
        SourceStat {
            nodes: Some(declared_nodes),
            edges: Some(declared_edges),
            origin: self.path.display().to_string(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        *self = Self::open(&self.path, self.cfg.clone())?;
        Ok(())
    }
}
