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

//! Optional on-disk persistence of level arrays.
//!
//! Each level is one file named `{prefix}_{store}.{o|i}{index}` (out or
//! reverse direction) framed as magic + version + header + arrays + CRC32
//! of the array bytes; a `{prefix}_{store}.json` manifest records the
//! level count and direction. Files are read back through a memory map
//! and validated before any array is trusted.
//!
//! Persistence covers the frozen topology only. It is orthogonal to the
//! engine contract: the visibility overlay, property columns, and the
//! writable delta are in-memory state and are not written here.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use strata_core::{NodeId, Result, StoreConfig, StrataError};

use crate::level::CsrLevel;
use crate::store::MultiVersionGraph;

const LEVEL_MAGIC: &[u8; 4] = b"SLVL";
const LEVEL_VERSION: u32 = 1;
/// magic + version + max_nodes + edge_count + sorted flag
const HEADER_BYTES: usize = 4 + 4 + 8 + 8 + 1;

/// Where and under what prefix a store persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    pub dir: PathBuf,
    pub prefix: String,
}

impl PersistConfig {
    fn level_path(&self, store: &str, direction: char, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}{}", self.prefix, store, direction, index))
    }

    fn manifest_path(&self, store: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.json", self.prefix, store))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreManifest {
    store: String,
    num_levels: usize,
    max_nodes: NodeId,
    reverse: bool,
}

fn corrupt(path: &Path, reason: impl Into<String>) -> StrataError {
    StrataError::CorruptLevelFile {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Write one level; see the module docs for the frame layout.
pub fn save_level(level: &CsrLevel, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(LEVEL_MAGIC)?;
    writer.write_u32::<LittleEndian>(LEVEL_VERSION)?;
    writer.write_u64::<LittleEndian>(level.max_nodes() as u64)?;
    writer.write_u64::<LittleEndian>(level.edge_count() as u64)?;
    writer.write_u8(level.is_sorted() as u8)?;

    let mut hasher = crc32fast::Hasher::new();
    let mut buf8 = [0u8; 8];
    for &offset in level.vertex_table() {
        LittleEndian::write_u64(&mut buf8, offset);
        hasher.update(&buf8);
        writer.write_all(&buf8)?;
    }
    let mut buf4 = [0u8; 4];
    for &head in level.edge_table() {
        LittleEndian::write_u32(&mut buf4, head);
        hasher.update(&buf4);
        writer.write_all(&buf4)?;
    }
    writer.write_u32::<LittleEndian>(hasher.finalize())?;
    writer.flush()?;
    Ok(())
}

/// Map one level file back into memory and validate it.
pub fn load_level(path: &Path) -> Result<CsrLevel> {
    let file = File::open(path)?;
    // Safety note: the map is read-only and consumed within this call.
    let map = unsafe { Mmap::map(&file)? };
    let bytes: &[u8] = &map;

    if bytes.len() < HEADER_BYTES + 4 {
        return Err(corrupt(path, "truncated header"));
    }
    if &bytes[0..4] != LEVEL_MAGIC {
        return Err(corrupt(path, "bad magic"));
    }
    let version = LittleEndian::read_u32(&bytes[4..8]);
    if version != LEVEL_VERSION {
        return Err(corrupt(path, format!("unsupported version {version}")));
    }
    let max_nodes = LittleEndian::read_u64(&bytes[8..16]) as usize;
    let edge_count = LittleEndian::read_u64(&bytes[16..24]) as usize;
    let sorted = bytes[24] != 0;

    let vertex_bytes = (max_nodes + 1) * 8;
    let edge_bytes = edge_count * 4;
    let expected = HEADER_BYTES + vertex_bytes + edge_bytes + 4;
    if bytes.len() != expected {
        return Err(corrupt(
            path,
            format!("size mismatch: {} != {expected}", bytes.len()),
        ));
    }

    let payload = &bytes[HEADER_BYTES..HEADER_BYTES + vertex_bytes + edge_bytes];
    let stored_crc = LittleEndian::read_u32(&bytes[expected - 4..]);
    if crc32fast::hash(payload) != stored_crc {
        return Err(corrupt(path, "checksum mismatch"));
    }

    let mut vertex_table = vec![0u64; max_nodes + 1];
    LittleEndian::read_u64_into(&payload[..vertex_bytes], &mut vertex_table);
    let mut edge_table = vec![0u32; edge_count];
    LittleEndian::read_u32_into(&payload[vertex_bytes..], &mut edge_table);

    CsrLevel::from_raw_parts(vertex_table, edge_table, sorted)
        .map_err(|reason| corrupt(path, reason))
}

/// Persist every live level of `graph` under `store` in `cfg.dir`.
pub fn save_store(graph: &MultiVersionGraph, store: &str, cfg: &PersistConfig) -> Result<()> {
    std::fs::create_dir_all(&cfg.dir)?;
    let snap = graph.snapshot();
    let num_levels = snap.num_levels();

    for index in 0..num_levels {
        if let Some(level) = snap.level(index as u16) {
            save_level(level, &cfg.level_path(store, 'o', index))?;
        }
        if let Some(level) = snap.rev_level(index as u16) {
            save_level(level, &cfg.level_path(store, 'i', index))?;
        }
    }

    let manifest = StoreManifest {
        store: store.to_string(),
        num_levels,
        max_nodes: snap.max_nodes(),
        reverse: snap.has_reverse(),
    };
    let file = File::create(cfg.manifest_path(store))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &manifest)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tracing::info!(store, levels = num_levels, "persisted store");
    Ok(())
}

/// Rebuild a store from its persisted levels. Levels retired before the
/// save come back empty (their files were never written).
pub fn load_store(store: &str, cfg: &PersistConfig, store_cfg: StoreConfig) -> Result<MultiVersionGraph> {
    let manifest_path = cfg.manifest_path(store);
    let file = File::open(&manifest_path)?;
    let manifest: StoreManifest = serde_json::from_reader(file)
        .map_err(|e| corrupt(&manifest_path, e.to_string()))?;

    let graph = MultiVersionGraph::new(StoreConfig {
        reverse_edges: manifest.reverse,
        ..store_cfg
    })?;

    for index in 0..manifest.num_levels {
        let out_path = cfg.level_path(store, 'o', index);
        let out_level = if out_path.exists() {
            load_level(&out_path)?
        } else {
            CsrLevel::empty(manifest.max_nodes)
        };
        let rev_level = if manifest.reverse {
            let in_path = cfg.level_path(store, 'i', index);
            Some(if in_path.exists() {
                load_level(&in_path)?
            } else {
                CsrLevel::empty(manifest.max_nodes)
            })
        } else {
            None
        };
        graph.publish(out_level, rev_level, Vec::new());
    }
    Ok(graph)
}
