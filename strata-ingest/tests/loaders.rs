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

//! File-format readers against real files on disk.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use strata_core::{
    DataSource, Direction, DuplicateMode, EdgeRec, IngestContext, LoaderConfig, NodeId,
    PartialLoad, StoreConfig, StrataError,
};
use strata_ingest::{FgfReader, SnapEdgeList, XsBinary};
use strata_storage::{CheckpointEngine, MultiVersionGraph, WritableGraph};

fn drain_all(source: &mut dyn DataSource) -> Vec<EdgeRec> {
    let mut out = Vec::new();
    loop {
        let more = source.pull(64).unwrap();
        while let Some(rec) = source.next_edge() {
            out.push(rec);
        }
        if !more {
            return out;
        }
    }
}

fn temp_file(contents: &[u8], ext: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("graph.{ext}"));
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

// ---- SNAP text edge lists ----------------------------------------------

#[test]
fn test_snap_skips_comments_and_blank_lines() {
    let text = "# a SNAP-style file\n0 1\n\n1\t2\n# trailing comment\n2 0\n";
    let (_dir, path) = temp_file(text.as_bytes(), "net");

    let mut src = SnapEdgeList::open(&path, LoaderConfig::default()).unwrap();
    let edges = drain_all(&mut src);
    let pairs: Vec<(NodeId, NodeId)> = edges.iter().map(|e| (e.tail, e.head)).collect();
    assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 0)]);
    assert_eq!(src.stat().edges, Some(3));
}

#[test]
fn test_snap_malformed_lines_counted_then_abandoned() {
    let text = "0 1\nnot numbers\nalso bad\n1 2\n";
    let (_dir, path) = temp_file(text.as_bytes(), "net");

    // A generous budget skips the bad lines.
    let mut src = SnapEdgeList::open(&path, LoaderConfig::default()).unwrap();
    assert_eq!(drain_all(&mut src).len(), 2);

    // A budget of one aborts on the second bad line.
    let mut src = SnapEdgeList::open(
        &path,
        LoaderConfig {
            error_limit: 1,
            ..LoaderConfig::default()
        },
    )
    .unwrap();
    let mut err = None;
    loop {
        match src.pull(16) {
            Ok(true) => {
                while src.next_edge().is_some() {}
            }
            Ok(false) => break,
            Err(e) => {
                err = Some(e);
                break;
            }
        }
    }
    match err {
        Some(StrataError::InputAbandoned { errors, .. }) => assert_eq!(errors, 2),
        other => panic!("expected abandonment, got {other:?}"),
    }
}

#[test]
fn test_snap_partial_parts_tile_the_file() {
    let mut text = String::new();
    let expected: Vec<(NodeId, NodeId)> = (0..200u32).map(|i| (i, (i + 1) % 200)).collect();
    for &(t, h) in &expected {
        text.push_str(&format!("{t} {h}\n"));
    }
    let (_dir, path) = temp_file(text.as_bytes(), "net");

    let mut seen = Vec::new();
    for part in 1..=3 {
        let mut src = SnapEdgeList::open(
            &path,
            LoaderConfig {
                partial_load: Some(PartialLoad { part, num_parts: 3 }),
                ..LoaderConfig::default()
            },
        )
        .unwrap();
        seen.extend(drain_all(&mut src).iter().map(|e| (e.tail, e.head)));
    }
    assert_eq!(seen, expected, "parts must cover each line exactly once");
}

#[test]
fn test_undirected_double_through_checkpoint() {
    let text = "0 1\n1 2\n";
    let (_dir, path) = temp_file(text.as_bytes(), "net");
    let mut src = SnapEdgeList::open(
        &path,
        LoaderConfig {
            direction: Direction::UndirectedDouble,
            ..LoaderConfig::default()
        },
    )
    .unwrap();

    let graph = Arc::new(MultiVersionGraph::new(StoreConfig::default()).unwrap());
    let delta = Arc::new(WritableGraph::new(graph, Arc::new(IngestContext::new(0))));
    let eng = CheckpointEngine::new(delta);
    for rec in drain_all(&mut src) {
        eng.delta().ingest(rec, DuplicateMode::Keep);
    }
    eng.checkpoint().unwrap();

    let snap = eng.store().snapshot();
    assert_eq!(snap.level(0).unwrap().edge_count(), 4);
    assert_eq!(snap.out_neighbors(0), vec![1]);
    let mut mid = snap.out_neighbors(1);
    mid.sort_unstable();
    assert_eq!(mid, vec![0, 2]);
    assert_eq!(snap.out_neighbors(2), vec![1]);
}

// ---- packed binary edge lists ------------------------------------------

fn write_xs1(records: &[(u32, u32, f32)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &(t, h, w) in records {
        bytes.write_u32::<LittleEndian>(t).unwrap();
        bytes.write_u32::<LittleEndian>(h).unwrap();
        bytes.write_f32::<LittleEndian>(w).unwrap();
    }
    bytes
}

#[test]
fn test_xs1_records_and_sidecar() {
    let bytes = write_xs1(&[(0, 1, 0.5), (1, 2, 1.5)]);
    let (dir, path) = temp_file(&bytes, "xs1");
    std::fs::write(dir.path().join("graph.ini"), "vertices=3\nedges=2\n").unwrap();

    let mut src = XsBinary::open(&path, LoaderConfig::default()).unwrap();
    assert_eq!(src.stat().nodes, Some(3));
    assert_eq!(src.stat().edges, Some(2));

    let edges = drain_all(&mut src);
    assert_eq!(edges[0], EdgeRec::weighted(0, 1, 0.5));
    assert_eq!(edges[1], EdgeRec::weighted(1, 2, 1.5));
}

#[test]
fn test_xs1_truncated_record_is_fatal() {
    let mut bytes = write_xs1(&[(0, 1, 0.5)]);
    bytes.truncate(bytes.len() - 3);
    let (_dir, path) = temp_file(&bytes, "dat");

    let mut src = XsBinary::open(&path, LoaderConfig::default()).unwrap();
    match src.pull(4) {
        Err(StrataError::MalformedRecord { format, .. }) => assert_eq!(format, "xs1"),
        other => panic!("expected fatal malformed record, got {other:?}"),
    }
}

#[test]
fn test_xs1_partial_resyncs_to_record_boundary() {
    let records: Vec<(u32, u32, f32)> = (0..101u32).map(|i| (i, i + 1, i as f32)).collect();
    let bytes = write_xs1(&records);
    let (_dir, path) = temp_file(&bytes, "xs1");

    let mut seen = HashSet::new();
    for part in 1..=4 {
        let mut src = XsBinary::open(
            &path,
            LoaderConfig {
                partial_load: Some(PartialLoad { part, num_parts: 4 }),
                ..LoaderConfig::default()
            },
        )
        .unwrap();
        for rec in drain_all(&mut src) {
            assert!(seen.insert((rec.tail, rec.head)), "duplicate {rec:?}");
        }
    }
    assert_eq!(seen.len(), records.len());
}

// ---- binary property graph ---------------------------------------------

/// Frame a logical payload into alternating short and long blocks.
fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, chunk) in payload.chunks(40).enumerate() {
        if i % 2 == 0 {
            out.push(0x77u8);
            out.push(chunk.len() as u8);
        } else {
            out.push(0x7au8);
            out.write_u32::<BigEndian>(chunk.len() as u32).unwrap();
        }
        out.extend_from_slice(chunk);
    }
    out
}

fn name(bytes: &mut Vec<u8>, text: &str) {
    bytes.write_u16::<BigEndian>(text.len() as u16).unwrap();
    bytes.write_all(text.as_bytes()).unwrap();
}

/// Two node types (3 + 1 nodes), one edge type with 2 weighted edges.
fn build_fgf(initial_vertex: u64) -> Vec<u8> {
    let mut p = Vec::new();
    p.write_all(b"FGF1").unwrap();
    p.write_u64::<BigEndian>(initial_vertex).unwrap();
    p.write_u64::<BigEndian>(100).unwrap(); // initial edge id

    p.write_all(b"CNTS").unwrap();
    p.write_u16::<BigEndian>(2).unwrap();
    name(&mut p, "person");
    p.write_u64::<BigEndian>(3).unwrap();
    name(&mut p, "place");
    p.write_u64::<BigEndian>(1).unwrap();
    p.write_u16::<BigEndian>(1).unwrap();
    name(&mut p, "knows");
    p.write_u64::<BigEndian>(2).unwrap();

    p.write_all(b"ATTR").unwrap();
    p.write_u16::<BigEndian>(2).unwrap();
    name(&mut p, "label");
    p.write_u16::<BigEndian>(0x01).unwrap();
    name(&mut p, "weight");
    p.write_u16::<BigEndian>(0x12).unwrap();

    // person nodes: one with a label, two with empty bags
    p.write_all(b"NODE").unwrap();
    p.write_u16::<BigEndian>(0).unwrap();
    p.write_u16::<BigEndian>(1).unwrap(); // bag with one entry
    p.write_u16::<BigEndian>(0).unwrap(); // attr 0 = label
    name(&mut p, "ada");
    p.write_u16::<BigEndian>(0).unwrap();
    p.write_u16::<BigEndian>(0).unwrap();

    // place nodes
    p.write_all(b"NODE").unwrap();
    p.write_u16::<BigEndian>(1).unwrap();
    p.write_u16::<BigEndian>(0).unwrap();

    // edges: (head, tail, bag)
    p.write_all(b"EDGE").unwrap();
    p.write_u16::<BigEndian>(0).unwrap();
    // initial+1 -> initial+0 with weight 7
    p.write_u64::<BigEndian>(initial_vertex + 1).unwrap();
    p.write_u64::<BigEndian>(initial_vertex).unwrap();
    p.write_u16::<BigEndian>(1).unwrap();
    p.write_u16::<BigEndian>(1).unwrap(); // attr 1 = weight
    p.write_i32::<BigEndian>(7).unwrap();
    // initial+2 -> initial+3, empty bag
    p.write_u64::<BigEndian>(initial_vertex + 2).unwrap();
    p.write_u64::<BigEndian>(initial_vertex + 3).unwrap();
    p.write_u16::<BigEndian>(0).unwrap();

    p.write_all(b"ENDG").unwrap();
    p
}

#[test]
fn test_fgf_reads_edges_and_weights() {
    let bytes = frame(&build_fgf(1000));
    let (_dir, path) = temp_file(&bytes, "fgf");

    let mut src = FgfReader::open(&path, LoaderConfig::default()).unwrap();
    assert_eq!(src.stat().nodes, Some(4));
    assert_eq!(src.stat().edges, Some(2));

    let edges = drain_all(&mut src);
    assert_eq!(edges.len(), 2);
    // head/tail prefix order: tail=initial, head=initial+1, rebased.
    assert_eq!(edges[0], EdgeRec::weighted(0, 1, 7.0));
    assert_eq!(edges[1], EdgeRec::new(3, 2));
}

#[test]
fn test_fgf_no_properties_drops_weights() {
    let bytes = frame(&build_fgf(0));
    let (_dir, path) = temp_file(&bytes, "fgf");

    let mut src = FgfReader::open(
        &path,
        LoaderConfig {
            no_properties: true,
            ..LoaderConfig::default()
        },
    )
    .unwrap();
    let edges = drain_all(&mut src);
    assert!(edges.iter().all(|e| e.weight.is_none()));
}

#[test]
fn test_fgf_bad_magic_is_fatal() {
    let mut payload = build_fgf(0);
    payload[0..4].copy_from_slice(b"GGF1");
    let bytes = frame(&payload);
    let (_dir, path) = temp_file(&bytes, "fgf");

    match FgfReader::open(&path, LoaderConfig::default()) {
        Err(StrataError::MalformedRecord { format, .. }) => assert_eq!(format, "fgf"),
        other => panic!("expected malformed fgf, got {other:?}"),
    }
}

#[test]
fn test_fgf_rejects_partial_load() {
    let bytes = frame(&build_fgf(0));
    let (_dir, path) = temp_file(&bytes, "fgf");
    let result = FgfReader::open(
        &path,
        LoaderConfig {
            partial_load: Some(PartialLoad { part: 1, num_parts: 2 }),
            ..LoaderConfig::default()
        },
    );
    assert!(matches!(result, Err(StrataError::InvalidConfig(_))));
}

#[test]
fn test_rewind_replays_the_stream() {
    let bytes = frame(&build_fgf(10));
    let (_dir, path) = temp_file(&bytes, "fgf");

    let mut src = FgfReader::open(&path, LoaderConfig::default()).unwrap();
    let first = drain_all(&mut src);
    src.rewind().unwrap();
    let second = drain_all(&mut src);
    assert_eq!(first, second);
}
