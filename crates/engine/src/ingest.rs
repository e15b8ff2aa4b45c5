//! Incremental ingestion: parser output for one file becomes the minimal
//! node/edge delta against what the store already holds for that file.

use crate::error::EngineError;
use crate::parser::{ParsedFile, SourceParser};
use crate::stats::IndexingStats;
use graph_store::{
    CodeNode, CodeRelation, GraphStore, NodeLabel, PendingReference, RelationType, Resolution,
    WriteBatch, content_fingerprint,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

/// The minimal set of writes needed to bring one file's subgraph in line
/// with its latest parse. Re-ingesting identical content yields an empty
/// delta.
#[derive(Debug, Default, Clone)]
pub struct Delta {
    pub file_path: String,
    pub upsert_nodes: Vec<CodeNode>,
    pub delete_node_ids: Vec<String>,
    pub upsert_relations: Vec<CodeRelation>,
    pub delete_relations: Vec<(String, String, RelationType)>,
    pub upsert_pending: Vec<PendingReference>,
    pub delete_pending_ids: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.upsert_nodes.is_empty()
            && self.delete_node_ids.is_empty()
            && self.upsert_relations.is_empty()
            && self.delete_relations.is_empty()
            && self.upsert_pending.is_empty()
            && self.delete_pending_ids.is_empty()
    }

    pub fn to_batch(&self) -> WriteBatch {
        WriteBatch {
            delete_labels: Vec::new(),
            delete_node_ids: self.delete_node_ids.clone(),
            upsert_nodes: self.upsert_nodes.clone(),
            delete_relations: self.delete_relations.clone(),
            upsert_relations: self.upsert_relations.clone(),
            delete_pending_ids: self.delete_pending_ids.clone(),
            upsert_pending: self.upsert_pending.clone(),
        }
    }

    pub fn record_stats(&self, stats: &mut IndexingStats) {
        stats.files_processed += 1;
        if self.is_empty() {
            stats.files_unchanged += 1;
        }
        stats.nodes_upserted += self.upsert_nodes.len();
        stats.nodes_deleted += self.delete_node_ids.len();
        stats.relations_upserted += self.upsert_relations.len();
        stats.relations_deleted += self.delete_relations.len();
        stats.pending_recorded += self.upsert_pending.len();
    }
}

/// Outcome of a pending-reference re-resolution pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingOutcome {
    pub resolved: usize,
    pub remaining: usize,
}

/// Parse `content` and diff the result against the store's current state
/// for `file_path`. Does not write; the caller applies the returned delta.
pub fn compute_delta(
    store: &GraphStore,
    parser: &dyn SourceParser,
    file_path: &str,
    content: &str,
) -> Result<Delta, EngineError> {
    let parsed = parser.parse(file_path, content);
    if let Some(message) = parsed.error {
        return Err(EngineError::ParseFailure {
            file_path: file_path.to_string(),
            message,
        });
    }

    let new_nodes = build_nodes(file_path, content, &parsed);
    let new_by_id: FxHashMap<&str, &CodeNode> =
        new_nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let new_by_name: FxHashMap<&str, &CodeNode> =
        new_nodes.iter().map(|n| (n.name.as_str(), n)).collect();

    let mut desired_relations = structural_relations(&new_nodes, &new_by_name);
    let mut desired_pending = Vec::new();
    resolve_references(
        store,
        file_path,
        &parsed,
        &new_by_name,
        &mut desired_relations,
        &mut desired_pending,
    )?;

    let old_nodes = store.nodes_for_file(file_path)?;
    let old_ids: Vec<String> = old_nodes.iter().map(|n| n.id.clone()).collect();
    let old_by_id: FxHashMap<&str, &CodeNode> =
        old_nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut delta = Delta {
        file_path: file_path.to_string(),
        ..Default::default()
    };

    for node in &new_nodes {
        match old_by_id.get(node.id.as_str()) {
            Some(old) if old.same_shape(node) => {}
            _ => delta.upsert_nodes.push(node.clone()),
        }
    }
    for old in &old_nodes {
        if !new_by_id.contains_key(old.id.as_str()) {
            delta.delete_node_ids.push(old.id.clone());
        }
    }

    // Old outgoing edges; edges touching deleted nodes go away with the
    // DETACH DELETE, so only surviving sources need explicit edge deletes.
    let old_relations = store.relations_from(&old_ids)?;
    let old_by_key: FxHashMap<(String, String, RelationType), &CodeRelation> = old_relations
        .iter()
        .map(|r| (r.key(), r))
        .collect();
    let desired_keys: FxHashSet<(String, String, RelationType)> =
        desired_relations.iter().map(|r| r.key()).collect();

    for relation in &desired_relations {
        match old_by_key.get(&relation.key()) {
            Some(old) if old.confidence == relation.confidence && old.step == relation.step => {}
            _ => delta.upsert_relations.push(relation.clone()),
        }
    }
    let deleted_ids: FxHashSet<&str> = delta.delete_node_ids.iter().map(|s| s.as_str()).collect();
    for old in &old_relations {
        if old.rel_type == RelationType::StepInProcess || old.rel_type == RelationType::MemberOf {
            // Derived edges are owned by the derivation pass, not by
            // per-file ingestion.
            continue;
        }
        if !desired_keys.contains(&old.key()) && !deleted_ids.contains(old.from.as_str()) {
            delta
                .delete_relations
                .push((old.from.clone(), old.to.clone(), old.rel_type));
        }
    }

    // Pending references previously recorded by this file's symbols.
    let old_id_set: FxHashSet<&str> = old_ids.iter().map(|s| s.as_str()).collect();
    let existing_pending: FxHashMap<String, PendingReference> = store
        .pending_references()?
        .into_iter()
        .filter(|p| old_id_set.contains(p.from_id.as_str()))
        .map(|p| (p.id.clone(), p))
        .collect();
    let desired_pending_ids: FxHashSet<&str> =
        desired_pending.iter().map(|p| p.id.as_str()).collect();
    for pending in &desired_pending {
        if !existing_pending.contains_key(&pending.id) {
            delta.upsert_pending.push(pending.clone());
        }
    }
    for id in existing_pending.keys() {
        if !desired_pending_ids.contains(id.as_str()) {
            delta.delete_pending_ids.push(id.clone());
        }
    }

    delta.delete_node_ids.sort();
    delta.delete_pending_ids.sort();
    Ok(delta)
}

/// Retry every recorded pending reference against the current graph.
/// Called once after a batch so late-arriving files resolve earlier files'
/// references.
pub fn resolve_pending(store: &GraphStore) -> Result<PendingOutcome, EngineError> {
    let pending = store.pending_references()?;
    if pending.is_empty() {
        return Ok(PendingOutcome::default());
    }

    let mut batch = WriteBatch::default();
    let mut outcome = PendingOutcome::default();
    for reference in &pending {
        let from = match store.node_by_id(&reference.from_id)? {
            Some(node) => node,
            None => {
                // Source symbol is gone; the intent died with it.
                batch.delete_pending_ids.push(reference.id.clone());
                continue;
            }
        };
        let candidates = lookup_candidates(store, &reference.to_name)?;
        match pick_candidate(&candidates, &from.file_path) {
            Some((target_id, resolution)) => {
                batch.upsert_relations.push(
                    CodeRelation::new(&reference.from_id, &target_id, reference.kind)
                        .with_resolution(resolution),
                );
                batch.delete_pending_ids.push(reference.id.clone());
                outcome.resolved += 1;
            }
            None => outcome.remaining += 1,
        }
    }
    store.apply(&batch)?;
    debug!(
        resolved = outcome.resolved,
        remaining = outcome.remaining,
        "Re-resolved pending references"
    );
    Ok(outcome)
}

fn build_nodes(file_path: &str, content: &str, parsed: &ParsedFile) -> Vec<CodeNode> {
    let file_name = file_path.rsplit('/').next().unwrap_or(file_path);
    let line_count = content.lines().count() as i64;
    let mut file_node = CodeNode::parsed(NodeLabel::File, file_name, file_path, 1, line_count, "");
    file_node.fingerprint = content_fingerprint(content);

    let mut nodes = vec![file_node];
    let mut seen: FxHashSet<String> = FxHashSet::default();
    seen.insert(nodes[0].id.clone());
    for symbol in &parsed.symbols {
        let node = CodeNode::parsed(
            symbol.kind.label(),
            &symbol.name,
            file_path,
            symbol.start_line,
            symbol.end_line,
            &symbol.body,
        );
        if seen.insert(node.id.clone()) {
            nodes.push(node);
        } else {
            warn!(
                file = file_path,
                name = %symbol.name,
                "Duplicate symbol id in parse output, keeping first occurrence"
            );
        }
    }
    nodes
}

/// CONTAINS from the File node to each top-level symbol; DEFINES from a
/// class to its qualified methods when the class is declared in the same
/// file.
fn structural_relations(
    nodes: &[CodeNode],
    by_name: &FxHashMap<&str, &CodeNode>,
) -> Vec<CodeRelation> {
    let file_id = &nodes[0].id;
    let mut relations = Vec::new();
    for node in &nodes[1..] {
        let parent = node
            .name
            .rsplit_once('.')
            .and_then(|(owner, _)| by_name.get(owner));
        match parent {
            Some(owner) if owner.label != NodeLabel::File => {
                relations.push(CodeRelation::new(&owner.id, &node.id, RelationType::Defines));
            }
            _ => {
                relations.push(CodeRelation::new(file_id, &node.id, RelationType::Contains));
            }
        }
    }
    relations
}

fn resolve_references(
    store: &GraphStore,
    file_path: &str,
    parsed: &ParsedFile,
    new_by_name: &FxHashMap<&str, &CodeNode>,
    relations: &mut Vec<CodeRelation>,
    pending: &mut Vec<PendingReference>,
) -> Result<(), EngineError> {
    for reference in &parsed.references {
        let Some(from) = new_by_name.get(reference.from_symbol.as_str()) else {
            debug!(
                file = file_path,
                from = %reference.from_symbol,
                "Reference source not among parsed symbols, skipping"
            );
            continue;
        };
        let rel_type = reference.kind.relation();

        // Same-file targets resolve with full confidence.
        if let Some(target) = new_by_name.get(reference.to_name.as_str()) {
            relations.push(
                CodeRelation::new(&from.id, &target.id, rel_type)
                    .with_resolution(Resolution::Resolved),
            );
            continue;
        }

        let candidates: Vec<CodeNode> = lookup_candidates(store, &reference.to_name)?
            .into_iter()
            .filter(|c| c.file_path != file_path)
            .collect();
        match pick_candidate(&candidates, file_path) {
            Some((target_id, resolution)) => {
                relations
                    .push(CodeRelation::new(&from.id, &target_id, rel_type).with_resolution(resolution));
            }
            None => {
                pending.push(PendingReference::new(&from.id, &reference.to_name, rel_type));
            }
        }
    }
    Ok(())
}

fn lookup_candidates(store: &GraphStore, to_name: &str) -> Result<Vec<CodeNode>, EngineError> {
    let mut candidates: Vec<CodeNode> = store
        .nodes_by_name(to_name)?
        .into_iter()
        .filter(|c| c.label.is_symbol())
        .collect();
    // A qualified reference like "InvoiceGenerator.generate" may also match
    // the bare method name when the qualifier was not indexed as such.
    if candidates.is_empty()
        && let Some((_, bare)) = to_name.rsplit_once('.')
    {
        candidates = store
            .nodes_by_name(bare)?
            .into_iter()
            .filter(|c| c.label.is_symbol())
            .collect();
    }
    Ok(candidates)
}

/// Resolution ladder for cross-file references: a unique candidate is
/// `Resolved`; among several, the one sharing the longest path prefix with
/// the referencing file wins at 0.8, remaining ties at 0.6.
fn pick_candidate(candidates: &[CodeNode], referencing_file: &str) -> Option<(String, Resolution)> {
    match candidates {
        [] => None,
        [only] => Some((only.id.clone(), Resolution::Resolved)),
        _ => {
            let scored: Vec<(usize, &CodeNode)> = candidates
                .iter()
                .map(|c| (common_path_components(&c.file_path, referencing_file), c))
                .collect();
            let best = scored.iter().map(|(score, _)| *score).max()?;
            let mut top: Vec<&CodeNode> = scored
                .iter()
                .filter(|(score, _)| *score == best)
                .map(|(_, c)| *c)
                .collect();
            top.sort_by(|a, b| a.id.cmp(&b.id));
            let confidence = if top.len() == 1 { 0.8 } else { 0.6 };
            Some((top[0].id.clone(), Resolution::Heuristic(confidence)))
        }
    }
}

fn common_path_components(a: &str, b: &str) -> usize {
    a.split('/')
        .zip(b.split('/'))
        .take_while(|(x, y)| x == y)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, path: &str) -> CodeNode {
        CodeNode::parsed(NodeLabel::Function, name, path, 1, 2, "body")
    }

    #[test]
    fn unique_candidate_resolves_fully() {
        let candidates = vec![node("f", "src/a.ts")];
        let (_, resolution) = pick_candidate(&candidates, "src/b.ts").unwrap();
        assert_eq!(resolution, Resolution::Resolved);
    }

    #[test]
    fn ambiguous_candidates_prefer_longest_shared_prefix() {
        let near = node("f", "src/billing/util.ts");
        let far = node("f", "src/auth/util.ts");
        let candidates = vec![far, near.clone()];
        let (id, resolution) = pick_candidate(&candidates, "src/billing/invoice.ts").unwrap();
        assert_eq!(id, near.id);
        assert_eq!(resolution, Resolution::Heuristic(0.8));
    }

    #[test]
    fn full_ties_fall_back_to_low_confidence() {
        let a = node("f", "src/x/a.ts");
        let b = node("f", "src/x/b.ts");
        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        let (id, resolution) = pick_candidate(&[a, b], "src/x/c.ts").unwrap();
        assert_eq!(id, expected[0]);
        assert_eq!(resolution, Resolution::Heuristic(0.6));
    }

    #[test]
    fn common_path_components_counts_directories() {
        assert_eq!(common_path_components("src/a/b.ts", "src/a/c.ts"), 2);
        assert_eq!(common_path_components("src/a/b.ts", "lib/a/b.ts"), 0);
    }
}
