use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Node label discriminating the `CodeNode` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    File,
    Folder,
    Function,
    Class,
    Interface,
    Method,
    Cluster,
    Process,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::File => "File",
            NodeLabel::Folder => "Folder",
            NodeLabel::Function => "Function",
            NodeLabel::Class => "Class",
            NodeLabel::Interface => "Interface",
            NodeLabel::Method => "Method",
            NodeLabel::Cluster => "Cluster",
            NodeLabel::Process => "Process",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "File" => Some(NodeLabel::File),
            "Folder" => Some(NodeLabel::Folder),
            "Function" => Some(NodeLabel::Function),
            "Class" => Some(NodeLabel::Class),
            "Interface" => Some(NodeLabel::Interface),
            "Method" => Some(NodeLabel::Method),
            "Cluster" => Some(NodeLabel::Cluster),
            "Process" => Some(NodeLabel::Process),
            _ => None,
        }
    }

    /// Labels produced by derivation passes rather than ingestion.
    pub fn is_derived(&self) -> bool {
        matches!(self, NodeLabel::Cluster | NodeLabel::Process)
    }

    /// Labels that participate in call-graph algorithms.
    pub fn is_symbol(&self) -> bool {
        matches!(
            self,
            NodeLabel::Function | NodeLabel::Class | NodeLabel::Interface | NodeLabel::Method
        )
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge type of the single `CodeRelation` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationType {
    Contains,
    Defines,
    Imports,
    Calls,
    Extends,
    Implements,
    MemberOf,
    StepInProcess,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Contains => "CONTAINS",
            RelationType::Defines => "DEFINES",
            RelationType::Imports => "IMPORTS",
            RelationType::Calls => "CALLS",
            RelationType::Extends => "EXTENDS",
            RelationType::Implements => "IMPLEMENTS",
            RelationType::MemberOf => "MEMBER_OF",
            RelationType::StepInProcess => "STEP_IN_PROCESS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONTAINS" => Some(RelationType::Contains),
            "DEFINES" => Some(RelationType::Defines),
            "IMPORTS" => Some(RelationType::Imports),
            "CALLS" => Some(RelationType::Calls),
            "EXTENDS" => Some(RelationType::Extends),
            "IMPLEMENTS" => Some(RelationType::Implements),
            "MEMBER_OF" => Some(RelationType::MemberOf),
            "STEP_IN_PROCESS" => Some(RelationType::StepInProcess),
            _ => None,
        }
    }

    pub fn all() -> [RelationType; 8] {
        [
            RelationType::Contains,
            RelationType::Defines,
            RelationType::Imports,
            RelationType::Calls,
            RelationType::Extends,
            RelationType::Implements,
            RelationType::MemberOf,
            RelationType::StepInProcess,
        ]
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification tag on a `Process` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessKind {
    IntraCluster,
    CrossCluster,
}

impl ProcessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessKind::IntraCluster => "intra-cluster",
            ProcessKind::CrossCluster => "cross-cluster",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "intra-cluster" => Some(ProcessKind::IntraCluster),
            "cross-cluster" => Some(ProcessKind::CrossCluster),
            _ => None,
        }
    }
}

/// How a CALLS/IMPORTS target was resolved. Heuristic matches carry the
/// confidence under 1.0; a plain "found" boolean loses that information.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    Resolved,
    Heuristic(f64),
}

impl Resolution {
    pub fn confidence(&self) -> f64 {
        match self {
            Resolution::Resolved => 1.0,
            Resolution::Heuristic(c) => *c,
        }
    }
}

/// A node in the code graph. Derived attributes (`cohesion`, `step_count`,
/// `process_kind`, `description`) are only populated on Cluster/Process
/// nodes; `fingerprint` is a content hash used for cheap change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeNode {
    pub id: String,
    pub label: NodeLabel,
    pub name: String,
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohesion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_kind: Option<ProcessKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
}

impl CodeNode {
    /// A parsed (non-derived) node with a stable id.
    pub fn parsed(
        label: NodeLabel,
        name: &str,
        file_path: &str,
        start_line: i64,
        end_line: i64,
        content: &str,
    ) -> Self {
        Self {
            id: stable_node_id(file_path, name, start_line),
            label,
            name: name.to_string(),
            file_path: file_path.to_string(),
            start_line,
            end_line,
            content: content.to_string(),
            cohesion: None,
            step_count: None,
            process_kind: None,
            description: None,
            fingerprint: content_fingerprint(content),
        }
    }

    /// Structural identity used for delta computation: everything except
    /// the raw content body, which the fingerprint already covers.
    pub fn same_shape(&self, other: &CodeNode) -> bool {
        self.id == other.id
            && self.label == other.label
            && self.name == other.name
            && self.file_path == other.file_path
            && self.start_line == other.start_line
            && self.end_line == other.end_line
            && self.fingerprint == other.fingerprint
    }
}

/// A typed edge. `step` is only meaningful for STEP_IN_PROCESS and
/// `confidence` defaults to 1.0 for structural edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRelation {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub rel_type: RelationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    pub confidence: f64,
}

impl CodeRelation {
    pub fn new(from: &str, to: &str, rel_type: RelationType) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            rel_type,
            step: None,
            confidence: 1.0,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.confidence = resolution.confidence();
        self
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Identity key for delta computation (one edge per from/to/type).
    pub fn key(&self) -> (String, String, RelationType) {
        (self.from.clone(), self.to.clone(), self.rel_type)
    }
}

/// A reference whose target did not exist in the graph at ingestion time.
/// Kept in a side table so a later pass can turn it into a real edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReference {
    pub id: String,
    pub from_id: String,
    pub to_name: String,
    pub kind: RelationType,
}

impl PendingReference {
    pub fn new(from_id: &str, to_name: &str, kind: RelationType) -> Self {
        Self {
            id: short_hash(&format!("{from_id}:{to_name}:{}", kind.as_str())),
            from_id: from_id.to_string(),
            to_name: to_name.to_string(),
            kind,
        }
    }
}

/// Stable node id derived from `(file_path, name, start_line)` so that
/// re-ingesting unchanged code reproduces the same id.
pub fn stable_node_id(file_path: &str, name: &str, start_line: i64) -> String {
    short_hash(&format!("{file_path}:{name}:{start_line}"))
}

/// Content hash stored alongside a node to detect unchanged bodies.
pub fn content_fingerprint(content: &str) -> String {
    short_hash(content)
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_reproducible() {
        let a = stable_node_id("src/billing.ts", "calculateTotal", 10);
        let b = stable_node_id("src/billing.ts", "calculateTotal", 10);
        assert_eq!(a, b);
        assert_ne!(a, stable_node_id("src/billing.ts", "calculateTotal", 11));
        assert_ne!(a, stable_node_id("src/other.ts", "calculateTotal", 10));
    }

    #[test]
    fn resolution_confidence() {
        assert_eq!(Resolution::Resolved.confidence(), 1.0);
        assert_eq!(Resolution::Heuristic(0.8).confidence(), 0.8);
    }

    #[test]
    fn label_and_type_round_trip() {
        for label in [
            NodeLabel::File,
            NodeLabel::Folder,
            NodeLabel::Function,
            NodeLabel::Class,
            NodeLabel::Interface,
            NodeLabel::Method,
            NodeLabel::Cluster,
            NodeLabel::Process,
        ] {
            assert_eq!(NodeLabel::parse(label.as_str()), Some(label));
        }
        for rel in RelationType::all() {
            assert_eq!(RelationType::parse(rel.as_str()), Some(rel));
        }
    }

    #[test]
    fn same_shape_ignores_content_body_but_not_fingerprint() {
        let a = CodeNode::parsed(NodeLabel::Function, "f", "a.ts", 1, 3, "body");
        let mut b = a.clone();
        assert!(a.same_shape(&b));
        b.fingerprint = content_fingerprint("other body");
        assert!(!a.same_shape(&b));
    }
}
