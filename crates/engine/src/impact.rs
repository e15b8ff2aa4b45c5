//! Blast-radius queries: bounded breadth-first traversal from a changed
//! symbol, with confidence pruning and risk classification, enriched with
//! the clusters and processes the reached set touches.

use crate::config::ImpactConfig;
use crate::error::EngineError;
use graph_store::{CodeNode, GraphStore, NodeLabel, RelationType};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// What depends on the target (traverse edges backward).
    Upstream,
    /// What the target depends on (traverse edges forward).
    Downstream,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upstream" => Some(Direction::Upstream),
            "downstream" => Some(Direction::Downstream),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImpactOptions {
    pub direction: Direction,
    pub max_depth: usize,
    pub relation_types: Vec<RelationType>,
    pub min_confidence: f64,
}

impl ImpactOptions {
    pub fn from_config(direction: Direction, config: &ImpactConfig) -> Self {
        Self {
            direction,
            max_depth: config.max_depth,
            relation_types: vec![
                RelationType::Calls,
                RelationType::Imports,
                RelationType::Extends,
                RelationType::Implements,
            ],
            min_confidence: config.min_confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Risk::Critical => "critical",
            Risk::High => "high",
            Risk::Medium => "medium",
            Risk::Low => "low",
        })
    }
}

/// Fixed depth-to-risk wording.
pub fn risk_for_depth(depth: usize) -> &'static str {
    match depth {
        1 => "will break",
        2 => "likely affected",
        _ => "may need testing",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactedNode {
    pub id: String,
    pub name: String,
    pub label: NodeLabel,
    pub file_path: String,
    /// Shortest-path depth at which the node was first reached.
    pub depth: usize,
    /// Best accumulated confidence product among paths at that depth.
    pub confidence: f64,
    pub risk: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AffectedCluster {
    pub id: String,
    pub name: String,
    /// Direct means the cluster contains a depth-1 node.
    pub direct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AffectedProcess {
    pub id: String,
    pub name: String,
    /// Minimum step index touched ("BROKEN at step N").
    pub min_step: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactResult {
    /// False for a query about a symbol the graph does not know; an empty
    /// non-error result, since asking about unknown code is expected input.
    pub target_found: bool,
    pub target: Option<CodeNode>,
    pub nodes: Vec<ImpactedNode>,
    pub clusters: Vec<AffectedCluster>,
    pub processes: Vec<AffectedProcess>,
    pub overall_risk: Risk,
}

impl ImpactResult {
    fn not_found() -> Self {
        Self {
            target_found: false,
            target: None,
            nodes: Vec::new(),
            clusters: Vec::new(),
            processes: Vec::new(),
            overall_risk: Risk::Low,
        }
    }
}

/// Deterministic for a fixed graph snapshot and fixed options.
pub fn compute_impact(
    store: &GraphStore,
    target_name: &str,
    options: &ImpactOptions,
) -> Result<ImpactResult, EngineError> {
    let Some(target) = find_target(store, target_name)? else {
        return Ok(ImpactResult::not_found());
    };

    let edges = store.relations_by_types(&options.relation_types)?;
    let mut adjacency: FxHashMap<&str, Vec<(&str, f64)>> = FxHashMap::default();
    for edge in &edges {
        let (source, sink) = match options.direction {
            Direction::Downstream => (edge.from.as_str(), edge.to.as_str()),
            Direction::Upstream => (edge.to.as_str(), edge.from.as_str()),
        };
        adjacency.entry(source).or_default().push((sink, edge.confidence));
    }

    // Level-order BFS; a node keeps its minimum depth and, within that
    // depth, its best confidence product.
    let mut reached: FxHashMap<String, (usize, f64)> = FxHashMap::default();
    let mut frontier: Vec<String> = vec![target.id.clone()];
    reached.insert(target.id.clone(), (0, 1.0));
    for depth in 1..=options.max_depth {
        let mut next: Vec<String> = Vec::new();
        frontier.sort();
        for node in &frontier {
            let (_, node_confidence) = reached[node.as_str()];
            let Some(neighbors) = adjacency.get(node.as_str()) else {
                continue;
            };
            for &(neighbor, edge_confidence) in neighbors {
                let confidence = node_confidence * edge_confidence;
                if confidence < options.min_confidence {
                    continue;
                }
                match reached.get_mut(neighbor) {
                    None => {
                        reached.insert(neighbor.to_string(), (depth, confidence));
                        next.push(neighbor.to_string());
                    }
                    Some((seen_depth, seen_confidence)) => {
                        if *seen_depth == depth && confidence > *seen_confidence {
                            *seen_confidence = confidence;
                        }
                    }
                }
            }
        }
        frontier = next;
        if frontier.is_empty() {
            break;
        }
    }
    reached.remove(&target.id);

    let mut nodes = Vec::with_capacity(reached.len());
    for (id, (depth, confidence)) in &reached {
        let Some(node) = store.node_by_id(id)? else {
            continue;
        };
        nodes.push(ImpactedNode {
            id: id.clone(),
            name: node.name,
            label: node.label,
            file_path: node.file_path,
            depth: *depth,
            confidence: *confidence,
            risk: risk_for_depth(*depth),
        });
    }
    nodes.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.id.cmp(&b.id)));

    let (clusters, depth_one_clusters) = affected_clusters(store, &nodes)?;
    let processes = affected_processes(store, &nodes)?;

    let overall_risk = if depth_one_clusters >= 2 {
        Risk::Critical
    } else if nodes.iter().any(|n| n.depth == 1) {
        Risk::High
    } else if !nodes.is_empty() {
        Risk::Medium
    } else {
        Risk::Low
    };

    Ok(ImpactResult {
        target_found: true,
        target: Some(target),
        nodes,
        clusters,
        processes,
        overall_risk,
    })
}

fn find_target(store: &GraphStore, target_name: &str) -> Result<Option<CodeNode>, EngineError> {
    let mut candidates: Vec<CodeNode> = store
        .nodes_by_name(target_name)?
        .into_iter()
        .filter(|n| n.label.is_symbol())
        .collect();
    if candidates.is_empty()
        && let Some((_, bare)) = target_name.rsplit_once('.')
    {
        candidates = store
            .nodes_by_name(bare)?
            .into_iter()
            .filter(|n| n.label.is_symbol())
            .collect();
    }
    candidates.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(candidates.into_iter().next())
}

fn affected_clusters(
    store: &GraphStore,
    nodes: &[ImpactedNode],
) -> Result<(Vec<AffectedCluster>, usize), EngineError> {
    let member_of = store.relations_by_types(&[RelationType::MemberOf])?;
    let cluster_names: FxHashMap<String, String> = store
        .nodes_by_label(NodeLabel::Cluster)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let cluster_of: FxHashMap<&str, &str> = member_of
        .iter()
        .map(|r| (r.from.as_str(), r.to.as_str()))
        .collect();

    let mut direct: FxHashSet<&str> = FxHashSet::default();
    let mut touched: FxHashSet<&str> = FxHashSet::default();
    for node in nodes {
        if let Some(&cluster) = cluster_of.get(node.id.as_str()) {
            touched.insert(cluster);
            if node.depth == 1 {
                direct.insert(cluster);
            }
        }
    }

    let mut clusters: Vec<AffectedCluster> = touched
        .iter()
        .map(|&id| AffectedCluster {
            id: id.to_string(),
            name: cluster_names.get(id).cloned().unwrap_or_default(),
            direct: direct.contains(id),
        })
        .collect();
    clusters.sort_by(|a, b| b.direct.cmp(&a.direct).then_with(|| a.id.cmp(&b.id)));
    Ok((clusters, direct.len()))
}

fn affected_processes(
    store: &GraphStore,
    nodes: &[ImpactedNode],
) -> Result<Vec<AffectedProcess>, EngineError> {
    let steps = store.relations_by_types(&[RelationType::StepInProcess])?;
    let process_names: FxHashMap<String, String> = store
        .nodes_by_label(NodeLabel::Process)?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    let impacted: FxHashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let mut min_steps: FxHashMap<&str, i64> = FxHashMap::default();
    for step in &steps {
        if !impacted.contains(step.from.as_str()) {
            continue;
        }
        let index = step.step.unwrap_or(0);
        min_steps
            .entry(step.to.as_str())
            .and_modify(|current| *current = (*current).min(index))
            .or_insert(index);
    }

    let mut processes: Vec<AffectedProcess> = min_steps
        .into_iter()
        .map(|(id, min_step)| AffectedProcess {
            id: id.to_string(),
            name: process_names.get(id).cloned().unwrap_or_default(),
            min_step,
        })
        .collect();
    processes.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(processes)
}
