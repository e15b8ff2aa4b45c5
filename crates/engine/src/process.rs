//! Bounded depth-first tracing of execution chains from entry points.
//!
//! Runs after cluster detection within a derivation pass, because the
//! intra/cross-cluster classification needs fresh membership data.

use crate::config::ProcessConfig;
use graph_store::{
    CodeNode, CodeRelation, NodeLabel, ProcessKind, RelationType, content_fingerprint,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Per-entry scratch cap so a pathological fan-out cannot amass chains
/// without bound before ranking.
const MAX_CHAINS_PER_ENTRY: usize = 256;

#[derive(Debug, Default)]
pub struct ProcessComputation {
    pub nodes: Vec<CodeNode>,
    pub relations: Vec<CodeRelation>,
}

#[derive(Debug, Clone)]
struct Chain {
    steps: Vec<String>,
    confidence: f64,
    clusters_touched: usize,
}

/// Trace execution chains over `calls` (CALLS edges only). `membership`
/// maps symbol id to cluster id, as produced by the detector in the same
/// pass.
pub fn trace_processes(
    symbols: &[CodeNode],
    calls: &[CodeRelation],
    membership: &FxHashMap<String, String>,
    config: &ProcessConfig,
) -> ProcessComputation {
    let by_id: FxHashMap<&str, &CodeNode> = symbols
        .iter()
        .filter(|n| n.label.is_symbol())
        .map(|n| (n.id.as_str(), n))
        .collect();

    // Top `max_branching` outgoing edges per node, highest confidence
    // first, with the target id as the deterministic tie-break.
    let mut outgoing: FxHashMap<&str, Vec<(&str, f64)>> = FxHashMap::default();
    let mut has_incoming: FxHashSet<&str> = FxHashSet::default();
    for relation in calls {
        if relation.rel_type != RelationType::Calls {
            continue;
        }
        if !by_id.contains_key(relation.from.as_str()) || !by_id.contains_key(relation.to.as_str())
        {
            continue;
        }
        outgoing
            .entry(relation.from.as_str())
            .or_default()
            .push((relation.to.as_str(), relation.confidence));
        has_incoming.insert(relation.to.as_str());
    }
    for edges in outgoing.values_mut() {
        edges.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        edges.truncate(config.max_branching);
    }

    let mut entry_points: Vec<&str> = by_id
        .iter()
        .filter(|(id, node)| !has_incoming.contains(*id) || is_entry_name(&node.name))
        .map(|(id, _)| *id)
        .collect();
    entry_points.sort();

    let mut chains: Vec<Chain> = Vec::new();
    let mut seen_chain_ids: FxHashSet<String> = FxHashSet::default();
    for entry in entry_points {
        for mut chain in trace_from(entry, &outgoing, config) {
            if chain.steps.len() < config.min_steps {
                continue;
            }
            let clusters: FxHashSet<&String> = chain
                .steps
                .iter()
                .filter_map(|id| membership.get(id))
                .collect();
            chain.clusters_touched = clusters.len();
            if seen_chain_ids.insert(chain_id(&chain)) {
                chains.push(chain);
            }
        }
    }

    // When over the cap, prefer cross-cluster chains, then longer ones,
    // then higher confidence products.
    chains.sort_by(|a, b| {
        (b.clusters_touched > 1)
            .cmp(&(a.clusters_touched > 1))
            .then_with(|| b.steps.len().cmp(&a.steps.len()))
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.steps.cmp(&b.steps))
    });
    chains.truncate(config.max_processes);

    let mut computation = ProcessComputation::default();
    for chain in &chains {
        let process = build_process(chain, &by_id);
        for (index, step_id) in chain.steps.iter().enumerate() {
            computation.relations.push(
                CodeRelation::new(step_id, &process.id, RelationType::StepInProcess)
                    .with_step(index as i64),
            );
        }
        computation.nodes.push(process);
    }
    debug!(
        processes = computation.nodes.len(),
        "Process tracing pass complete"
    );
    computation
}

/// Entry-point naming heuristics: `main`, `handle*`, `on*`, `*_handler`,
/// `*_listener`. Qualified names are judged by their last segment.
fn is_entry_name(name: &str) -> bool {
    let bare = name.rsplit('.').next().unwrap_or(name);
    bare == "main"
        || bare.starts_with("handle")
        || bare.starts_with("on")
        || bare.ends_with("_handler")
        || bare.ends_with("_listener")
}

/// Iterative DFS with an explicit frame stack; call graphs are cyclic and
/// recursion depth must not track graph depth. A maximal path is emitted
/// when its tip cannot extend (depth cap, no edges, or all targets already
/// on the path).
fn trace_from(
    entry: &str,
    outgoing: &FxHashMap<&str, Vec<(&str, f64)>>,
    config: &ProcessConfig,
) -> Vec<Chain> {
    struct Frame<'a> {
        node: &'a str,
        next_edge: usize,
        pushed_child: bool,
        edge_confidence: f64,
    }

    let mut chains = Vec::new();
    let mut stack = vec![Frame {
        node: entry,
        next_edge: 0,
        pushed_child: false,
        edge_confidence: 1.0,
    }];
    let mut on_path: FxHashSet<&str> = FxHashSet::default();
    on_path.insert(entry);

    while let Some(frame_index) = stack.len().checked_sub(1) {
        if chains.len() >= MAX_CHAINS_PER_ENTRY {
            break;
        }
        let depth = stack.len();
        let node = stack[frame_index].node;
        let at_cap = depth >= config.max_trace_depth;

        let next_child = if at_cap {
            None
        } else {
            let edges = outgoing.get(node).map(Vec::as_slice).unwrap_or(&[]);
            let mut found = None;
            while stack[frame_index].next_edge < edges.len() {
                let (target, confidence) = edges[stack[frame_index].next_edge];
                stack[frame_index].next_edge += 1;
                if !on_path.contains(target) {
                    found = Some((target, confidence));
                    break;
                }
            }
            found
        };

        match next_child {
            Some((target, confidence)) => {
                stack[frame_index].pushed_child = true;
                on_path.insert(target);
                stack.push(Frame {
                    node: target,
                    next_edge: 0,
                    pushed_child: false,
                    edge_confidence: confidence,
                });
            }
            None => {
                let Some(frame) = stack.pop() else { break };
                if !frame.pushed_child {
                    let steps: Vec<String> =
                        stack.iter().map(|f| f.node.to_string()).chain(
                            std::iter::once(frame.node.to_string()),
                        )
                        .collect();
                    let confidence = stack
                        .iter()
                        .skip(1)
                        .map(|f| f.edge_confidence)
                        .product::<f64>()
                        * frame.edge_confidence;
                    chains.push(Chain {
                        steps,
                        confidence,
                        clusters_touched: 0,
                    });
                }
                on_path.remove(frame.node);
            }
        }
    }
    chains
}

fn chain_id(chain: &Chain) -> String {
    content_fingerprint(&chain.steps.join(","))
}

fn build_process(chain: &Chain, by_id: &FxHashMap<&str, &CodeNode>) -> CodeNode {
    let step_names: Vec<&str> = chain
        .steps
        .iter()
        .map(|id| by_id.get(id.as_str()).map(|n| n.name.as_str()).unwrap_or(id))
        .collect();
    let entry_name = step_names.first().copied().unwrap_or("unknown");
    let kind = if chain.clusters_touched > 1 {
        ProcessKind::CrossCluster
    } else {
        ProcessKind::IntraCluster
    };
    CodeNode {
        id: chain_id(chain),
        label: NodeLabel::Process,
        name: format!("process_{}", entry_name.replace('.', "_")),
        file_path: String::new(),
        start_line: 0,
        end_line: 0,
        content: String::new(),
        cohesion: None,
        step_count: Some(chain.steps.len() as i64),
        process_kind: Some(kind),
        description: Some(step_names.join(" -> ")),
        fingerprint: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str) -> CodeNode {
        CodeNode::parsed(NodeLabel::Function, name, "src/m.ts", 1, 2, name)
    }

    fn calls(from: &CodeNode, to: &CodeNode) -> CodeRelation {
        CodeRelation::new(&from.id, &to.id, RelationType::Calls)
    }

    fn id_of<'a>(symbols: &'a [CodeNode], name: &str) -> &'a str {
        &symbols.iter().find(|s| s.name == name).unwrap().id
    }

    #[test]
    fn traces_a_linear_chain() {
        let symbols: Vec<CodeNode> = ["main", "prepare", "write"].map(symbol).into();
        let relations = vec![
            calls(&symbols[0], &symbols[1]),
            calls(&symbols[1], &symbols[2]),
        ];
        let result = trace_processes(
            &symbols,
            &relations,
            &FxHashMap::default(),
            &ProcessConfig::default(),
        );
        assert_eq!(result.nodes.len(), 1);
        let process = &result.nodes[0];
        assert_eq!(process.step_count, Some(3));
        assert_eq!(process.process_kind, Some(ProcessKind::IntraCluster));
        assert_eq!(process.description.as_deref(), Some("main -> prepare -> write"));

        let steps: Vec<(String, i64)> = result
            .relations
            .iter()
            .map(|r| (r.from.clone(), r.step.unwrap()))
            .collect();
        assert_eq!(steps[0], (id_of(&symbols, "main").to_string(), 0));
        assert_eq!(steps[2], (id_of(&symbols, "write").to_string(), 2));
    }

    #[test]
    fn chains_below_min_steps_yield_zero_processes() {
        let symbols: Vec<CodeNode> = ["main", "helper"].map(symbol).into();
        let relations = vec![calls(&symbols[0], &symbols[1])];
        let result = trace_processes(
            &symbols,
            &relations,
            &FxHashMap::default(),
            &ProcessConfig::default(),
        );
        assert!(result.nodes.is_empty());
        assert!(result.relations.is_empty());
    }

    #[test]
    fn cycles_terminate_and_do_not_repeat_a_step() {
        let symbols: Vec<CodeNode> = ["main", "a", "b"].map(symbol).into();
        let relations = vec![
            calls(&symbols[0], &symbols[1]),
            calls(&symbols[1], &symbols[2]),
            calls(&symbols[2], &symbols[1]),
        ];
        let result = trace_processes(
            &symbols,
            &relations,
            &FxHashMap::default(),
            &ProcessConfig::default(),
        );
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].step_count, Some(3));
    }

    #[test]
    fn branching_is_bounded_and_prefers_confidence() {
        let symbols: Vec<CodeNode> = ["main", "a", "b", "c", "d", "e"].map(symbol).into();
        let mut relations = vec![
            calls(&symbols[0], &symbols[1]).with_resolution(graph_store::Resolution::Heuristic(0.9)),
            calls(&symbols[0], &symbols[2]).with_resolution(graph_store::Resolution::Heuristic(0.8)),
            calls(&symbols[0], &symbols[3]).with_resolution(graph_store::Resolution::Heuristic(0.7)),
            calls(&symbols[0], &symbols[4]).with_resolution(graph_store::Resolution::Heuristic(0.6)),
        ];
        for target in [1, 2, 3, 4] {
            relations.push(calls(&symbols[target], &symbols[5]));
        }
        let config = ProcessConfig {
            max_branching: 2,
            min_steps: 3,
            ..Default::default()
        };
        let result = trace_processes(&symbols, &relations, &FxHashMap::default(), &config);
        // Only the two highest-confidence branches from main survive.
        assert_eq!(result.nodes.len(), 2);
        let descriptions: Vec<&str> = result
            .nodes
            .iter()
            .map(|n| n.description.as_deref().unwrap())
            .collect();
        assert!(descriptions.contains(&"main -> a -> e"));
        assert!(descriptions.contains(&"main -> b -> e"));
    }

    #[test]
    fn cross_cluster_chains_are_classified_and_preferred() {
        let symbols: Vec<CodeNode> = ["main", "a", "b"].map(symbol).into();
        let relations = vec![
            calls(&symbols[0], &symbols[1]),
            calls(&symbols[1], &symbols[2]),
        ];
        let mut membership = FxHashMap::default();
        membership.insert(id_of(&symbols, "main").to_string(), "c1".to_string());
        membership.insert(id_of(&symbols, "b").to_string(), "c2".to_string());
        let result = trace_processes(
            &symbols,
            &relations,
            &membership,
            &ProcessConfig::default(),
        );
        assert_eq!(result.nodes[0].process_kind, Some(ProcessKind::CrossCluster));
    }

    #[test]
    fn handler_names_are_entry_points_despite_callers() {
        let symbols: Vec<CodeNode> = ["main", "onSave", "persist", "flush"].map(symbol).into();
        // onSave is called by main, but its name marks it as an entry point.
        let relations = vec![
            calls(&symbols[0], &symbols[1]),
            calls(&symbols[1], &symbols[2]),
            calls(&symbols[2], &symbols[3]),
        ];
        let result = trace_processes(
            &symbols,
            &relations,
            &FxHashMap::default(),
            &ProcessConfig::default(),
        );
        let descriptions: Vec<&str> = result
            .nodes
            .iter()
            .map(|n| n.description.as_deref().unwrap())
            .collect();
        assert!(descriptions.contains(&"onSave -> persist -> flush"));
        assert!(descriptions.contains(&"main -> onSave -> persist -> flush"));
    }
}
