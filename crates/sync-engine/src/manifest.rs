//! The manifest: a line-delimited, deterministically sorted snapshot of
//! the semantic graph, bound to the commit it was exported for.
//!
//! Plain JSONL is the default so the file diffs well under version
//! control; gzip is opt-in and sniffed by magic bytes on read. Node
//! `content` is excluded by design, only semantic/structural fields
//! travel.

use crate::error::SyncError;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use graph_store::{CodeNode, CodeRelation};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const MANIFEST_FILE_NAME: &str = "manifest.jsonl";

/// Bumped together with the store schema; hydration refuses other
/// versions and the caller falls back to regeneration.
pub const MANIFEST_SCHEMA_VERSION: u32 = graph_store::schema::SCHEMA_VERSION;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const CONFLICT_MARKERS: [&str; 3] = ["<<<<<<<", "=======", ">>>>>>>"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestHeader {
    pub schema_version: u32,
    /// The commit this manifest was exported for; a consumer can assert
    /// "this manifest matches this code".
    pub commit: String,
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ManifestRecord {
    Header(ManifestHeader),
    Node(CodeNode),
    Edge(CodeRelation),
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub header: ManifestHeader,
    pub nodes: Vec<CodeNode>,
    pub edges: Vec<CodeRelation>,
}

/// Serialize the given graph state. Records are sorted by id (nodes) then
/// (from, to, type, step) (edges), so identical graphs encode to identical
/// bytes.
pub fn encode_manifest(
    nodes: &[CodeNode],
    edges: &[CodeRelation],
    commit: &str,
    compress: bool,
) -> Result<Vec<u8>, SyncError> {
    let mut nodes: Vec<CodeNode> = nodes
        .iter()
        .map(|n| {
            let mut node = n.clone();
            node.content = String::new();
            node
        })
        .collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    let mut edges: Vec<CodeRelation> = edges.to_vec();
    edges.sort_by(|a, b| {
        a.from
            .cmp(&b.from)
            .then_with(|| a.to.cmp(&b.to))
            .then_with(|| a.rel_type.cmp(&b.rel_type))
            .then_with(|| a.step.cmp(&b.step))
    });

    let header = ManifestHeader {
        schema_version: MANIFEST_SCHEMA_VERSION,
        commit: commit.to_string(),
        node_count: nodes.len(),
        edge_count: edges.len(),
    };

    let mut text = String::new();
    append_record(&mut text, &ManifestRecord::Header(header))?;
    for node in nodes {
        append_record(&mut text, &ManifestRecord::Node(node))?;
    }
    for edge in edges {
        append_record(&mut text, &ManifestRecord::Edge(edge))?;
    }

    if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes())?;
        Ok(encoder.finish()?)
    } else {
        Ok(text.into_bytes())
    }
}

fn append_record(text: &mut String, record: &ManifestRecord) -> Result<(), SyncError> {
    let line = serde_json::to_string(record)
        .map_err(|e| SyncError::ManifestCorrupt(format!("encoding failed: {e}")))?;
    text.push_str(&line);
    text.push('\n');
    Ok(())
}

/// Parse manifest bytes, sniffing gzip and refusing conflict-marked or
/// structurally invalid input.
pub fn decode_manifest(bytes: &[u8]) -> Result<Manifest, SyncError> {
    let text = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut decompressed = String::new();
        decoder
            .read_to_string(&mut decompressed)
            .map_err(|e| SyncError::ManifestCorrupt(format!("gzip decode failed: {e}")))?;
        decompressed
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SyncError::ManifestCorrupt(format!("not valid UTF-8: {e}")))?
    };

    // Conflict markers are checked on the raw text before any JSON
    // parsing; a half-merged manifest must never be partially read.
    for line in text.lines() {
        if CONFLICT_MARKERS.iter().any(|m| line.starts_with(m)) {
            return Err(SyncError::ManifestConflict);
        }
    }

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header_line = lines
        .next()
        .ok_or_else(|| SyncError::ManifestCorrupt("empty manifest".to_string()))?;
    let header = match parse_record(header_line)? {
        ManifestRecord::Header(header) => header,
        _ => {
            return Err(SyncError::ManifestCorrupt(
                "first record is not a header".to_string(),
            ));
        }
    };
    if header.schema_version != MANIFEST_SCHEMA_VERSION {
        return Err(SyncError::ManifestCorrupt(format!(
            "schema version {} is not supported (expected {})",
            header.schema_version, MANIFEST_SCHEMA_VERSION
        )));
    }

    let mut nodes = Vec::with_capacity(header.node_count);
    let mut edges = Vec::with_capacity(header.edge_count);
    for line in lines {
        match parse_record(line)? {
            ManifestRecord::Header(_) => {
                return Err(SyncError::ManifestCorrupt(
                    "duplicate header record".to_string(),
                ));
            }
            ManifestRecord::Node(node) => nodes.push(node),
            ManifestRecord::Edge(edge) => edges.push(edge),
        }
    }
    if nodes.len() != header.node_count || edges.len() != header.edge_count {
        return Err(SyncError::ManifestCorrupt(format!(
            "record counts do not match header: {} nodes / {} edges, header says {} / {}",
            nodes.len(),
            edges.len(),
            header.node_count,
            header.edge_count
        )));
    }
    Ok(Manifest {
        header,
        nodes,
        edges,
    })
}

fn parse_record(line: &str) -> Result<ManifestRecord, SyncError> {
    serde_json::from_str(line)
        .map_err(|e| SyncError::ManifestCorrupt(format!("unparsable record: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_store::{NodeLabel, RelationType};

    fn sample_graph() -> (Vec<CodeNode>, Vec<CodeRelation>) {
        let a = CodeNode::parsed(NodeLabel::Function, "a", "src/a.ts", 1, 3, "body of a");
        let b = CodeNode::parsed(NodeLabel::Function, "b", "src/b.ts", 1, 3, "body of b");
        let edge = CodeRelation::new(&a.id, &b.id, RelationType::Calls);
        (vec![a, b], vec![edge])
    }

    #[test]
    fn encoding_is_deterministic() {
        let (nodes, edges) = sample_graph();
        let first = encode_manifest(&nodes, &edges, "abc123", false).unwrap();
        let mut reversed = nodes.clone();
        reversed.reverse();
        let second = encode_manifest(&reversed, &edges, "abc123", false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_excludes_content() {
        let (nodes, edges) = sample_graph();
        let bytes = encode_manifest(&nodes, &edges, "abc123", false).unwrap();
        let manifest = decode_manifest(&bytes).unwrap();

        assert_eq!(manifest.header.commit, "abc123");
        assert_eq!(manifest.nodes.len(), 2);
        assert_eq!(manifest.edges, edges);
        for node in &manifest.nodes {
            assert!(node.content.is_empty());
            // Structural fields and the fingerprint survive.
            assert!(!node.fingerprint.is_empty());
        }
    }

    #[test]
    fn gzip_is_sniffed_by_magic_bytes() {
        let (nodes, edges) = sample_graph();
        let bytes = encode_manifest(&nodes, &edges, "abc123", true).unwrap();
        assert_eq!(&bytes[..2], &GZIP_MAGIC);
        let manifest = decode_manifest(&bytes).unwrap();
        assert_eq!(manifest.nodes.len(), 2);
    }

    #[test]
    fn conflict_markers_are_detected_before_parsing() {
        let (nodes, edges) = sample_graph();
        let bytes = encode_manifest(&nodes, &edges, "abc123", false).unwrap();
        let mut text = String::from_utf8(bytes).unwrap();
        text.push_str("<<<<<<< HEAD\n{\"kind\":\"node\"}\n>>>>>>> theirs\n");
        let err = decode_manifest(text.as_bytes()).unwrap_err();
        assert!(matches!(err, SyncError::ManifestConflict));
    }

    #[test]
    fn truncated_manifest_is_corrupt() {
        let (nodes, edges) = sample_graph();
        let bytes = encode_manifest(&nodes, &edges, "abc123", false).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let truncated: String = text.lines().take(2).map(|l| format!("{l}\n")).collect();
        let err = decode_manifest(truncated.as_bytes()).unwrap_err();
        assert!(matches!(err, SyncError::ManifestCorrupt(_)));
    }

    #[test]
    fn unsupported_schema_version_is_corrupt() {
        let line = serde_json::json!({
            "kind": "header",
            "schema_version": 999,
            "commit": "abc",
            "node_count": 0,
            "edge_count": 0,
        })
        .to_string();
        let err = decode_manifest(format!("{line}\n").as_bytes()).unwrap_err();
        assert!(matches!(err, SyncError::ManifestCorrupt(_)));
    }
}
