use crate::embedding;
use crate::kuzu::config::StoreConfig;
use crate::kuzu::connection::StoreConnection;
use crate::kuzu::database::{force_new_database, open_database};
use crate::kuzu::types::{StoreError, StoreStats};
use crate::model::{CodeNode, CodeRelation, NodeLabel, PendingReference, ProcessKind, RelationType};
use crate::schema::SchemaManager;
use kuzu::{Database, LogicalType, Value};
use serde_json::Map;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// All writes that must land atomically: one ingestion delta for one file,
/// or one derivation pass's delete-then-recreate.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    /// Derived labels to wipe before any other write (full-replace semantics).
    pub delete_labels: Vec<NodeLabel>,
    pub delete_node_ids: Vec<String>,
    pub upsert_nodes: Vec<CodeNode>,
    pub delete_relations: Vec<(String, String, RelationType)>,
    pub upsert_relations: Vec<CodeRelation>,
    pub delete_pending_ids: Vec<String>,
    pub upsert_pending: Vec<PendingReference>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.delete_labels.is_empty()
            && self.delete_node_ids.is_empty()
            && self.upsert_nodes.is_empty()
            && self.delete_relations.is_empty()
            && self.upsert_relations.is_empty()
            && self.delete_pending_ids.is_empty()
            && self.upsert_pending.is_empty()
    }
}

/// Result of the raw pattern-query passthrough, already JSON-shaped.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryOutput {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Counts by label and relation type, for the `overview()` surface.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GraphOverview {
    pub nodes_by_label: BTreeMap<String, u64>,
    pub relations_by_type: BTreeMap<String, u64>,
}

/// Owner of all persistent graph state. Concurrent readers are fine; each
/// operation opens its own connection against the shared database.
pub struct GraphStore {
    database: Database,
}

impl GraphStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        let database = open_database(path, config)?;
        SchemaManager::new(&database).initialize_schema()?;
        Ok(Self { database })
    }

    /// Discard any database at `path` and start empty. Hydration and
    /// regeneration always go through here.
    pub fn create_fresh(path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        let database = force_new_database(path, config)?;
        SchemaManager::new(&database).initialize_schema()?;
        Ok(Self { database })
    }

    fn conn(&self) -> Result<StoreConnection<'_>, StoreError> {
        StoreConnection::new(&self.database)
    }

    // WRITES

    /// Apply a batch atomically. Readers never observe a partial batch.
    pub fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(
            upserts = batch.upsert_nodes.len(),
            deletes = batch.delete_node_ids.len(),
            edges = batch.upsert_relations.len(),
            "Applying write batch"
        );
        let conn = self.conn()?;
        conn.transaction(|conn| {
            for label in &batch.delete_labels {
                delete_nodes_by_label(conn, *label)?;
            }
            if !batch.delete_node_ids.is_empty() {
                delete_nodes(conn, &batch.delete_node_ids)?;
            }
            for node in &batch.upsert_nodes {
                upsert_node(conn, node)?;
            }
            for (from, to, rel_type) in &batch.delete_relations {
                delete_relation(conn, from, to, *rel_type)?;
            }
            for relation in &batch.upsert_relations {
                upsert_relation(conn, relation)?;
            }
            if !batch.delete_pending_ids.is_empty() {
                delete_pending(conn, &batch.delete_pending_ids)?;
            }
            for pending in &batch.upsert_pending {
                upsert_pending(conn, pending)?;
            }
            Ok(())
        })
    }

    // READS

    /// Non-derived nodes previously ingested from `file_path`.
    pub fn nodes_for_file(&self, file_path: &str) -> Result<Vec<CodeNode>, StoreError> {
        let rows = self.conn()?.execute_rows(
            "MATCH (n:CodeNode) \
             WHERE n.file_path = $file_path AND n.label <> 'Cluster' AND n.label <> 'Process' \
             RETURN n",
            vec![("file_path", Value::from(file_path))],
        )?;
        rows.iter().map(|row| node_from_row(row)).collect()
    }

    pub fn node_by_id(&self, id: &str) -> Result<Option<CodeNode>, StoreError> {
        let rows = self.conn()?.execute_rows(
            "MATCH (n:CodeNode) WHERE n.id = $id RETURN n",
            vec![("id", Value::from(id))],
        )?;
        rows.first().map(|row| node_from_row(row)).transpose()
    }

    /// Exact-name lookup used by reference resolution and the impact query.
    pub fn nodes_by_name(&self, name: &str) -> Result<Vec<CodeNode>, StoreError> {
        let rows = self.conn()?.execute_rows(
            "MATCH (n:CodeNode) WHERE n.name = $name RETURN n",
            vec![("name", Value::from(name))],
        )?;
        rows.iter().map(|row| node_from_row(row)).collect()
    }

    pub fn nodes_by_label(&self, label: NodeLabel) -> Result<Vec<CodeNode>, StoreError> {
        let rows = self.conn()?.execute_rows(
            "MATCH (n:CodeNode) WHERE n.label = $label RETURN n",
            vec![("label", Value::from(label.as_str()))],
        )?;
        rows.iter().map(|row| node_from_row(row)).collect()
    }

    pub fn all_nodes(&self) -> Result<Vec<CodeNode>, StoreError> {
        let rows = self
            .conn()?
            .execute_rows("MATCH (n:CodeNode) RETURN n", vec![])?;
        rows.iter().map(|row| node_from_row(row)).collect()
    }

    pub fn all_relations(&self) -> Result<Vec<CodeRelation>, StoreError> {
        let rows = self.conn()?.execute_rows(
            "MATCH (a:CodeNode)-[r:CodeRelation]->(b:CodeNode) \
             RETURN a.id, b.id, r.type, r.step, r.confidence",
            vec![],
        )?;
        rows.iter().map(|row| relation_from_row(row)).collect()
    }

    pub fn relations_by_types(
        &self,
        types: &[RelationType],
    ) -> Result<Vec<CodeRelation>, StoreError> {
        let type_list = Value::List(
            LogicalType::String,
            types.iter().map(|t| Value::from(t.as_str())).collect(),
        );
        let rows = self.conn()?.execute_rows(
            "MATCH (a:CodeNode)-[r:CodeRelation]->(b:CodeNode) \
             WHERE r.type IN $types \
             RETURN a.id, b.id, r.type, r.step, r.confidence",
            vec![("types", type_list)],
        )?;
        rows.iter().map(|row| relation_from_row(row)).collect()
    }

    /// Outgoing relations of the given nodes, used for per-file edge deltas.
    pub fn relations_from(&self, from_ids: &[String]) -> Result<Vec<CodeRelation>, StoreError> {
        if from_ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = Value::List(
            LogicalType::String,
            from_ids.iter().map(|id| Value::from(id.as_str())).collect(),
        );
        let rows = self.conn()?.execute_rows(
            "MATCH (a:CodeNode)-[r:CodeRelation]->(b:CodeNode) \
             WHERE a.id IN $ids \
             RETURN a.id, b.id, r.type, r.step, r.confidence",
            vec![("ids", id_list)],
        )?;
        rows.iter().map(|row| relation_from_row(row)).collect()
    }

    pub fn pending_references(&self) -> Result<Vec<PendingReference>, StoreError> {
        let rows = self.conn()?.execute_rows(
            "MATCH (p:PendingReference) RETURN p.id, p.from_id, p.to_name, p.kind",
            vec![],
        )?;
        rows.iter()
            .map(|row| {
                Ok(PendingReference {
                    id: require_string(row, 0)?,
                    from_id: require_string(row, 1)?,
                    to_name: require_string(row, 2)?,
                    kind: RelationType::parse(&require_string(row, 3)?)
                        .ok_or_else(|| StoreError::UnexpectedRow("pending kind".to_string()))?,
                })
            })
            .collect()
    }

    pub fn overview(&self) -> Result<GraphOverview, StoreError> {
        let conn = self.conn()?;
        let mut overview = GraphOverview::default();
        let label_rows =
            conn.execute_rows("MATCH (n:CodeNode) RETURN n.label, count(n)", vec![])?;
        for row in &label_rows {
            overview
                .nodes_by_label
                .insert(require_string(row, 0)?, require_u64(row, 1)?);
        }
        let type_rows = conn.execute_rows(
            "MATCH ()-[r:CodeRelation]->() RETURN r.type, count(r)",
            vec![],
        )?;
        for row in &type_rows {
            overview
                .relations_by_type
                .insert(require_string(row, 0)?, require_u64(row, 1)?);
        }
        Ok(overview)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;
        let count = |query: &str| -> Result<usize, StoreError> {
            let rows = conn.execute_rows(query, vec![])?;
            rows.first()
                .map(|row| require_u64(row, 0).map(|v| v as usize))
                .unwrap_or(Ok(0))
        };
        Ok(StoreStats {
            total_nodes: count("MATCH (n:CodeNode) RETURN count(n)")?,
            total_relationships: count("MATCH ()-[r:CodeRelation]->() RETURN count(r)")?,
            total_embeddings: count("MATCH (e:CodeEmbedding) RETURN count(e)")?,
            total_pending_references: count("MATCH (p:PendingReference) RETURN count(p)")?,
        })
    }

    // EMBEDDINGS

    /// Upsert an embedding vector. Never called from the ingestion path;
    /// embeddings are rebuilt lazily.
    pub fn upsert_embedding(&self, node_id: &str, vector: &[f64]) -> Result<(), StoreError> {
        let values = Value::List(
            LogicalType::Double,
            vector.iter().map(|v| Value::from(*v)).collect(),
        );
        self.conn()?.execute(
            "MERGE (e:CodeEmbedding {node_id: $node_id}) \
             ON CREATE SET e.vector = $vector \
             ON MATCH SET e.vector = $vector",
            vec![("node_id", Value::from(node_id)), ("vector", values)],
        )
    }

    pub fn delete_embedding(&self, node_id: &str) -> Result<(), StoreError> {
        self.conn()?.execute(
            "MATCH (e:CodeEmbedding) WHERE e.node_id = $node_id DETACH DELETE e",
            vec![("node_id", Value::from(node_id))],
        )
    }

    pub fn embeddings(&self) -> Result<Vec<(String, Vec<f64>)>, StoreError> {
        let rows = self
            .conn()?
            .execute_rows("MATCH (e:CodeEmbedding) RETURN e.node_id, e.vector", vec![])?;
        rows.iter()
            .map(|row| {
                let node_id = require_string(row, 0)?;
                let vector = match row.get(1) {
                    Some(Value::List(_, items)) => items
                        .iter()
                        .map(|v| {
                            value_as_f64(v).ok_or_else(|| {
                                StoreError::UnexpectedRow("embedding component".to_string())
                            })
                        })
                        .collect::<Result<Vec<f64>, StoreError>>()?,
                    _ => Vec::new(),
                };
                Ok((node_id, vector))
            })
            .collect()
    }

    /// Brute-force nearest-neighbour lookup by cosine similarity.
    pub fn nearest_embeddings(
        &self,
        query: &[f64],
        k: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        Ok(embedding::nearest(&self.embeddings()?, query, k))
    }

    // PASSTHROUGH

    /// Uncontrolled pattern query, for callers such as an agent tool layer.
    pub fn generic_query(
        &self,
        query: &str,
        params: Map<String, serde_json::Value>,
    ) -> Result<QueryOutput, StoreError> {
        let raw = self.conn()?.generic_query(query, params)?;
        Ok(QueryOutput {
            column_names: raw.column_names,
            rows: raw
                .rows
                .iter()
                .map(|row| row.iter().map(value_to_json).collect())
                .collect(),
        })
    }
}

// Per-statement helpers, all running on the caller's (possibly
// transactional) connection.

fn upsert_node(conn: &StoreConnection, node: &CodeNode) -> Result<(), StoreError> {
    const SET_CLAUSE: &str = "n.label = $label, n.name = $name, n.file_path = $file_path, \
         n.start_line = $start_line, n.end_line = $end_line, n.content = $content, \
         n.cohesion = $cohesion, n.step_count = $step_count, n.process_kind = $process_kind, \
         n.description = $description, n.fingerprint = $fingerprint";
    let query = format!(
        "MERGE (n:CodeNode {{id: $id}}) ON CREATE SET {SET_CLAUSE} ON MATCH SET {SET_CLAUSE}"
    );
    conn.execute(
        &query,
        vec![
            ("id", Value::from(node.id.as_str())),
            ("label", Value::from(node.label.as_str())),
            ("name", Value::from(node.name.as_str())),
            ("file_path", Value::from(node.file_path.as_str())),
            ("start_line", Value::from(node.start_line)),
            ("end_line", Value::from(node.end_line)),
            ("content", Value::from(node.content.as_str())),
            ("cohesion", opt_f64_value(node.cohesion)),
            ("step_count", opt_i64_value(node.step_count)),
            (
                "process_kind",
                opt_str_value(node.process_kind.map(|k| k.as_str().to_string())),
            ),
            ("description", opt_str_value(node.description.clone())),
            ("fingerprint", Value::from(node.fingerprint.as_str())),
        ],
    )
}

fn delete_nodes(conn: &StoreConnection, ids: &[String]) -> Result<(), StoreError> {
    let id_list = Value::List(
        LogicalType::String,
        ids.iter().map(|id| Value::from(id.as_str())).collect(),
    );
    conn.execute(
        "MATCH (n:CodeNode) WHERE n.id IN $ids DETACH DELETE n",
        vec![("ids", id_list)],
    )
}

fn delete_nodes_by_label(conn: &StoreConnection, label: NodeLabel) -> Result<(), StoreError> {
    conn.execute(
        "MATCH (n:CodeNode) WHERE n.label = $label DETACH DELETE n",
        vec![("label", Value::from(label.as_str()))],
    )
}

fn upsert_relation(conn: &StoreConnection, relation: &CodeRelation) -> Result<(), StoreError> {
    conn.execute(
        "MATCH (a:CodeNode), (b:CodeNode) \
         WHERE a.id = $from AND b.id = $to \
         MERGE (a)-[r:CodeRelation {type: $type}]->(b) \
         ON CREATE SET r.step = $step, r.confidence = $confidence \
         ON MATCH SET r.step = $step, r.confidence = $confidence",
        vec![
            ("from", Value::from(relation.from.as_str())),
            ("to", Value::from(relation.to.as_str())),
            ("type", Value::from(relation.rel_type.as_str())),
            ("step", opt_i64_value(relation.step)),
            ("confidence", Value::from(relation.confidence)),
        ],
    )
}

fn delete_relation(
    conn: &StoreConnection,
    from: &str,
    to: &str,
    rel_type: RelationType,
) -> Result<(), StoreError> {
    conn.execute(
        "MATCH (a:CodeNode)-[r:CodeRelation]->(b:CodeNode) \
         WHERE a.id = $from AND b.id = $to AND r.type = $type \
         DELETE r",
        vec![
            ("from", Value::from(from)),
            ("to", Value::from(to)),
            ("type", Value::from(rel_type.as_str())),
        ],
    )
}

fn upsert_pending(conn: &StoreConnection, pending: &PendingReference) -> Result<(), StoreError> {
    conn.execute(
        "MERGE (p:PendingReference {id: $id}) \
         ON CREATE SET p.from_id = $from_id, p.to_name = $to_name, p.kind = $kind \
         ON MATCH SET p.from_id = $from_id, p.to_name = $to_name, p.kind = $kind",
        vec![
            ("id", Value::from(pending.id.as_str())),
            ("from_id", Value::from(pending.from_id.as_str())),
            ("to_name", Value::from(pending.to_name.as_str())),
            ("kind", Value::from(pending.kind.as_str())),
        ],
    )
}

fn delete_pending(conn: &StoreConnection, ids: &[String]) -> Result<(), StoreError> {
    let id_list = Value::List(
        LogicalType::String,
        ids.iter().map(|id| Value::from(id.as_str())).collect(),
    );
    conn.execute(
        "MATCH (p:PendingReference) WHERE p.id IN $ids DETACH DELETE p",
        vec![("ids", id_list)],
    )
}

// Row mapping

fn node_from_row(row: &[Value]) -> Result<CodeNode, StoreError> {
    let value = row
        .first()
        .ok_or_else(|| StoreError::UnexpectedRow("empty node row".to_string()))?;
    node_from_value(value)
}

fn node_from_value(value: &Value) -> Result<CodeNode, StoreError> {
    let Value::Node(node_val) = value else {
        return Err(StoreError::UnexpectedRow(format!(
            "expected node value, got {value:?}"
        )));
    };
    let mut node = CodeNode {
        id: String::new(),
        label: NodeLabel::File,
        name: String::new(),
        file_path: String::new(),
        start_line: 0,
        end_line: 0,
        content: String::new(),
        cohesion: None,
        step_count: None,
        process_kind: None,
        description: None,
        fingerprint: String::new(),
    };
    for (prop_name, prop_value) in node_val.get_properties().iter() {
        match prop_name.as_str() {
            "id" => node.id = string_or_default(prop_value),
            "label" => {
                node.label = NodeLabel::parse(&string_or_default(prop_value)).ok_or_else(|| {
                    StoreError::UnexpectedRow(format!("unknown label {prop_value:?}"))
                })?;
            }
            "name" => node.name = string_or_default(prop_value),
            "file_path" => node.file_path = string_or_default(prop_value),
            "start_line" => node.start_line = value_as_i64(prop_value).unwrap_or(0),
            "end_line" => node.end_line = value_as_i64(prop_value).unwrap_or(0),
            "content" => node.content = string_or_default(prop_value),
            "cohesion" => node.cohesion = value_as_f64(prop_value),
            "step_count" => node.step_count = value_as_i64(prop_value),
            "process_kind" => {
                node.process_kind = match prop_value {
                    Value::String(s) => ProcessKind::parse(s),
                    _ => None,
                }
            }
            "description" => {
                node.description = match prop_value {
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                }
            }
            "fingerprint" => node.fingerprint = string_or_default(prop_value),
            _ => {}
        }
    }
    Ok(node)
}

fn relation_from_row(row: &[Value]) -> Result<CodeRelation, StoreError> {
    Ok(CodeRelation {
        from: require_string(row, 0)?,
        to: require_string(row, 1)?,
        rel_type: RelationType::parse(&require_string(row, 2)?)
            .ok_or_else(|| StoreError::UnexpectedRow("relation type".to_string()))?,
        step: row.get(3).and_then(value_as_i64),
        confidence: row.get(4).and_then(value_as_f64).unwrap_or(1.0),
    })
}

fn require_string(row: &[Value], index: usize) -> Result<String, StoreError> {
    match row.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(StoreError::UnexpectedRow(format!(
            "expected string at column {index}, got {other:?}"
        ))),
    }
}

fn require_u64(row: &[Value], index: usize) -> Result<u64, StoreError> {
    row.get(index)
        .and_then(value_as_i64)
        .map(|v| v as u64)
        .ok_or_else(|| StoreError::UnexpectedRow(format!("expected count at column {index}")))
}

fn string_or_default(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int64(v) => Some(*v),
        Value::Int32(v) => Some(*v as i64),
        Value::UInt32(v) => Some(*v as i64),
        Value::UInt64(v) => Some(*v as i64),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Double(v) => Some(*v),
        Value::Float(v) => Some(*v as f64),
        Value::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int64(v) => serde_json::json!(*v),
        Value::Int32(v) => serde_json::json!(*v),
        Value::UInt32(v) => serde_json::json!(*v),
        Value::UInt64(v) => serde_json::json!(*v),
        Value::Double(v) => serde_json::json!(*v),
        Value::Float(v) => serde_json::json!(*v),
        Value::Null(_) => serde_json::Value::Null,
        Value::List(_, items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        other => serde_json::Value::String(other.to_string()),
    }
}

fn opt_str_value(value: Option<String>) -> Value {
    match value {
        Some(s) => Value::from(s.as_str()),
        None => Value::Null(LogicalType::String),
    }
}

fn opt_i64_value(value: Option<i64>) -> Value {
    match value {
        Some(v) => Value::from(v),
        None => Value::Null(LogicalType::Int64),
    }
}

fn opt_f64_value(value: Option<f64>) -> Value {
    match value {
        Some(v) => Value::from(v),
        None => Value::Null(LogicalType::Double),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stable_node_id;
    use crate::testing::temp_store;

    fn function_node(name: &str, file: &str, line: i64) -> CodeNode {
        CodeNode::parsed(NodeLabel::Function, name, file, line, line + 5, "body")
    }

    #[test]
    fn upsert_and_fetch_round_trip() {
        let (_dir, store) = temp_store();
        let node = function_node("calculateTotal", "src/billing.ts", 10);
        store
            .apply(&WriteBatch {
                upsert_nodes: vec![node.clone()],
                ..Default::default()
            })
            .unwrap();

        let fetched = store.node_by_id(&node.id).unwrap().unwrap();
        assert_eq!(fetched.name, "calculateTotal");
        assert_eq!(fetched.label, NodeLabel::Function);
        assert_eq!(fetched.start_line, 10);
        assert!(fetched.cohesion.is_none());
        assert!(fetched.same_shape(&node));
    }

    #[test]
    fn upsert_is_idempotent() {
        let (_dir, store) = temp_store();
        let node = function_node("f", "a.ts", 1);
        let batch = WriteBatch {
            upsert_nodes: vec![node.clone()],
            ..Default::default()
        };
        store.apply(&batch).unwrap();
        store.apply(&batch).unwrap();
        assert_eq!(store.stats().unwrap().total_nodes, 1);
    }

    #[test]
    fn detach_delete_removes_touching_edges() {
        let (_dir, store) = temp_store();
        let a = function_node("a", "a.ts", 1);
        let b = function_node("b", "b.ts", 1);
        store
            .apply(&WriteBatch {
                upsert_nodes: vec![a.clone(), b.clone()],
                upsert_relations: vec![CodeRelation::new(&a.id, &b.id, RelationType::Calls)],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.stats().unwrap().total_relationships, 1);

        store
            .apply(&WriteBatch {
                delete_node_ids: vec![b.id.clone()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.stats().unwrap().total_relationships, 0);
        assert!(store.node_by_id(&b.id).unwrap().is_none());
        assert!(store.node_by_id(&a.id).unwrap().is_some());
    }

    #[test]
    fn relation_upsert_keeps_one_edge_per_type() {
        let (_dir, store) = temp_store();
        let a = function_node("a", "a.ts", 1);
        let b = function_node("b", "b.ts", 1);
        let mut rel = CodeRelation::new(&a.id, &b.id, RelationType::Calls);
        store
            .apply(&WriteBatch {
                upsert_nodes: vec![a.clone(), b.clone()],
                upsert_relations: vec![rel.clone()],
                ..Default::default()
            })
            .unwrap();

        rel.confidence = 0.8;
        store
            .apply(&WriteBatch {
                upsert_relations: vec![rel],
                ..Default::default()
            })
            .unwrap();

        let relations = store.all_relations().unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].confidence, 0.8);
    }

    #[test]
    fn delete_labels_wipes_derived_nodes_only() {
        let (_dir, store) = temp_store();
        let f = function_node("f", "a.ts", 1);
        let mut cluster = CodeNode::parsed(NodeLabel::Cluster, "cluster_0", "", 0, 0, "");
        cluster.cohesion = Some(0.75);
        store
            .apply(&WriteBatch {
                upsert_nodes: vec![f.clone(), cluster.clone()],
                upsert_relations: vec![CodeRelation::new(&f.id, &cluster.id, RelationType::MemberOf)],
                ..Default::default()
            })
            .unwrap();

        store
            .apply(&WriteBatch {
                delete_labels: vec![NodeLabel::Cluster],
                ..Default::default()
            })
            .unwrap();

        assert!(store.node_by_id(&cluster.id).unwrap().is_none());
        assert!(store.node_by_id(&f.id).unwrap().is_some());
        assert_eq!(store.stats().unwrap().total_relationships, 0);
    }

    #[test]
    fn derived_attributes_survive_round_trip() {
        let (_dir, store) = temp_store();
        let mut process = CodeNode::parsed(NodeLabel::Process, "process_main", "", 0, 0, "");
        process.step_count = Some(4);
        process.process_kind = Some(ProcessKind::CrossCluster);
        process.description = Some("main -> handler -> writer".to_string());
        store
            .apply(&WriteBatch {
                upsert_nodes: vec![process.clone()],
                ..Default::default()
            })
            .unwrap();

        let fetched = store.node_by_id(&process.id).unwrap().unwrap();
        assert_eq!(fetched.step_count, Some(4));
        assert_eq!(fetched.process_kind, Some(ProcessKind::CrossCluster));
        assert_eq!(
            fetched.description.as_deref(),
            Some("main -> handler -> writer")
        );
    }

    #[test]
    fn pending_references_round_trip() {
        let (_dir, store) = temp_store();
        let f = function_node("f", "a.ts", 1);
        let pending = PendingReference::new(&f.id, "missingTarget", RelationType::Calls);
        store
            .apply(&WriteBatch {
                upsert_nodes: vec![f],
                upsert_pending: vec![pending.clone()],
                ..Default::default()
            })
            .unwrap();

        let fetched = store.pending_references().unwrap();
        assert_eq!(fetched, vec![pending.clone()]);

        store
            .apply(&WriteBatch {
                delete_pending_ids: vec![pending.id],
                ..Default::default()
            })
            .unwrap();
        assert!(store.pending_references().unwrap().is_empty());
    }

    #[test]
    fn overview_counts_by_label_and_type() {
        let (_dir, store) = temp_store();
        let a = function_node("a", "a.ts", 1);
        let b = function_node("b", "b.ts", 1);
        let file = CodeNode::parsed(NodeLabel::File, "a.ts", "a.ts", 0, 10, "");
        store
            .apply(&WriteBatch {
                upsert_nodes: vec![a.clone(), b.clone(), file.clone()],
                upsert_relations: vec![
                    CodeRelation::new(&file.id, &a.id, RelationType::Contains),
                    CodeRelation::new(&a.id, &b.id, RelationType::Calls),
                ],
                ..Default::default()
            })
            .unwrap();

        let overview = store.overview().unwrap();
        assert_eq!(overview.nodes_by_label.get("Function"), Some(&2));
        assert_eq!(overview.nodes_by_label.get("File"), Some(&1));
        assert_eq!(overview.relations_by_type.get("CALLS"), Some(&1));
        assert_eq!(overview.relations_by_type.get("CONTAINS"), Some(&1));
    }

    #[test]
    fn embeddings_nearest_neighbour() {
        let (_dir, store) = temp_store();
        store.upsert_embedding("n1", &[1.0, 0.0, 0.0]).unwrap();
        store.upsert_embedding("n2", &[0.0, 1.0, 0.0]).unwrap();
        store.upsert_embedding("n3", &[0.9, 0.1, 0.0]).unwrap();

        let nearest = store.nearest_embeddings(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(nearest.len(), 2);
        assert_eq!(nearest[0].0, "n1");
        assert_eq!(nearest[1].0, "n3");
    }

    #[test]
    fn generic_query_passthrough() {
        let (_dir, store) = temp_store();
        let node = function_node("visible", "a.ts", 3);
        store
            .apply(&WriteBatch {
                upsert_nodes: vec![node],
                ..Default::default()
            })
            .unwrap();

        let output = store
            .generic_query(
                "MATCH (n:CodeNode) WHERE n.name = $name RETURN n.name, n.start_line",
                serde_json::json!({ "name": "visible" })
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .unwrap();
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.rows[0][0], serde_json::json!("visible"));
        assert_eq!(output.rows[0][1], serde_json::json!(3));
    }

    #[test]
    fn stable_ids_reproduce_on_reopen() {
        let id = stable_node_id("src/a.ts", "f", 1);
        assert_eq!(id, stable_node_id("src/a.ts", "f", 1));
    }
}
