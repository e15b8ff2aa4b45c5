//! Community detection over the call/import graph.
//!
//! Symbols become nodes of an undirected weighted graph (edge weight is the
//! count of CALLS/IMPORTS edges between the pair, both directions summed)
//! and a deterministic Louvain-style modularity maximization partitions
//! them. Clusters are always fully recreated, never patched: a handful of
//! edge changes can move a partition's optimum non-locally.

use crate::config::ClusterConfig;
use graph_store::{
    CodeNode, CodeRelation, NodeLabel, RelationType, content_fingerprint,
};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Full-replace output of one detection pass.
#[derive(Debug, Default)]
pub struct ClusterComputation {
    pub nodes: Vec<CodeNode>,
    pub relations: Vec<CodeRelation>,
    /// symbol id -> cluster id, consumed by the process tracer.
    pub membership: FxHashMap<String, String>,
}

/// Detect communities among `symbols` connected by `relations` (callers
/// pass CALLS and IMPORTS edges only). Identical input and seed reproduce
/// identical membership.
pub fn detect_clusters(
    symbols: &[CodeNode],
    relations: &[CodeRelation],
    config: &ClusterConfig,
) -> ClusterComputation {
    let mut symbols: Vec<&CodeNode> = symbols.iter().filter(|n| n.label.is_symbol()).collect();
    symbols.sort_by(|a, b| a.id.cmp(&b.id));
    if symbols.is_empty() {
        return ClusterComputation::default();
    }

    let mut graph: UnGraph<usize, f64> = UnGraph::default();
    let mut index_of: FxHashMap<&str, NodeIndex> = FxHashMap::default();
    for (position, symbol) in symbols.iter().enumerate() {
        index_of.insert(symbol.id.as_str(), graph.add_node(position));
    }

    // Sum both directions into one undirected weight per pair.
    let mut pair_weights: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for relation in relations {
        if relation.rel_type != RelationType::Calls && relation.rel_type != RelationType::Imports {
            continue;
        }
        let (Some(&a), Some(&b)) = (
            index_of.get(relation.from.as_str()),
            index_of.get(relation.to.as_str()),
        ) else {
            continue;
        };
        if a == b {
            continue;
        }
        let key = if a.index() <= b.index() {
            (a.index(), b.index())
        } else {
            (b.index(), a.index())
        };
        *pair_weights.entry(key).or_insert(0.0) += 1.0;
    }
    for (&(a, b), &weight) in &pair_weights {
        graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), weight);
    }

    let adjacency: Vec<Vec<(usize, f64)>> = (0..symbols.len())
        .map(|i| {
            let mut neighbors: Vec<(usize, f64)> = graph
                .edges(NodeIndex::new(i))
                .map(|e| {
                    let other = if e.source().index() == i {
                        e.target().index()
                    } else {
                        e.source().index()
                    };
                    (other, *e.weight())
                })
                .collect();
            neighbors.sort_by(|a, b| a.0.cmp(&b.0));
            neighbors
        })
        .collect();

    let assignment = louvain(&adjacency, config.seed);

    let mut communities: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (node, community) in assignment.iter().enumerate() {
        communities.entry(*community).or_default().push(node);
    }

    let mut computation = ClusterComputation::default();
    for members in communities.values() {
        if members.len() < config.min_cluster_size {
            continue;
        }
        let cluster = build_cluster(&symbols, members, &adjacency, &assignment);
        for &member in members {
            computation
                .membership
                .insert(symbols[member].id.clone(), cluster.id.clone());
            computation.relations.push(CodeRelation::new(
                &symbols[member].id,
                &cluster.id,
                RelationType::MemberOf,
            ));
        }
        computation.nodes.push(cluster);
    }
    debug!(
        clusters = computation.nodes.len(),
        symbols = symbols.len(),
        "Cluster detection pass complete"
    );
    computation
}

fn build_cluster(
    symbols: &[&CodeNode],
    members: &[usize],
    adjacency: &[Vec<(usize, f64)>],
    assignment: &[usize],
) -> CodeNode {
    let community = assignment[members[0]];
    let mut internal = 0.0;
    let mut boundary = 0.0;
    let mut degrees: Vec<(f64, &str)> = Vec::with_capacity(members.len());
    for &member in members {
        let mut member_degree = 0.0;
        for &(neighbor, weight) in &adjacency[member] {
            member_degree += weight;
            if assignment[neighbor] == community {
                // Both endpoints will visit this edge; halve to count once.
                internal += weight / 2.0;
            } else {
                boundary += weight;
            }
        }
        degrees.push((member_degree, symbols[member].name.as_str()));
    }
    let cohesion = if internal + boundary > 0.0 {
        internal / (internal + boundary)
    } else {
        1.0
    };

    degrees.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    let anchors: Vec<&str> = degrees.iter().take(2).map(|(_, name)| *name).collect();
    let name = format!("cluster_{}", anchors.join("_"));
    let description = format!(
        "{} symbols centered on {}",
        members.len(),
        anchors.join(" and ")
    );

    let mut member_ids: Vec<&str> = members.iter().map(|&m| symbols[m].id.as_str()).collect();
    member_ids.sort();
    let id = content_fingerprint(&member_ids.join(","));

    CodeNode {
        id,
        label: NodeLabel::Cluster,
        name,
        file_path: String::new(),
        start_line: 0,
        end_line: 0,
        content: String::new(),
        cohesion: Some(cohesion),
        step_count: None,
        process_kind: None,
        description: Some(description),
        fingerprint: String::new(),
    }
}

// Deterministic Louvain: seed-keyed visit order, ties broken toward the
// smallest community id, BTreeMap accumulators so iteration order never
// depends on hashing.

fn louvain(adjacency: &[Vec<(usize, f64)>], seed: u64) -> Vec<usize> {
    let n = adjacency.len();
    let mut final_assignment: Vec<usize> = (0..n).collect();
    let mut level_adjacency: Vec<Vec<(usize, f64)>> = adjacency.to_vec();
    let mut level_self_loops: Vec<f64> = vec![0.0; n];

    for level in 0u64.. {
        let (assignment, moved) =
            one_level(&level_adjacency, &level_self_loops, seed.wrapping_add(level));
        if !moved {
            break;
        }
        let renumbered = renumber(&assignment);
        for community in final_assignment.iter_mut() {
            *community = renumbered[*community];
        }
        let community_count = renumbered.iter().max().map(|m| m + 1).unwrap_or(0);
        if community_count == level_adjacency.len() {
            break;
        }
        let (aggregated, self_loops) =
            aggregate(&level_adjacency, &level_self_loops, &renumbered, community_count);
        level_adjacency = aggregated;
        level_self_loops = self_loops;
    }
    final_assignment
}

fn one_level(
    adjacency: &[Vec<(usize, f64)>],
    self_loops: &[f64],
    seed: u64,
) -> (Vec<usize>, bool) {
    let n = adjacency.len();
    let degree: Vec<f64> = (0..n)
        .map(|i| adjacency[i].iter().map(|(_, w)| w).sum::<f64>() + 2.0 * self_loops[i])
        .collect();
    let total_weight: f64 = degree.iter().sum();
    if total_weight == 0.0 {
        return ((0..n).collect(), false);
    }

    let mut community: Vec<usize> = (0..n).collect();
    let mut community_degree = degree.clone();
    let order = shuffled_order(n, seed);

    let mut any_move = false;
    loop {
        let mut moves = 0usize;
        for &node in &order {
            let current = community[node];
            community_degree[current] -= degree[node];

            // Weight from `node` into each neighboring community.
            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            links.insert(current, 0.0);
            for &(neighbor, weight) in &adjacency[node] {
                *links.entry(community[neighbor]).or_insert(0.0) += weight;
            }

            let mut best_community = current;
            let mut best_gain = links[&current] - community_degree[current] * degree[node] / total_weight;
            for (&candidate, &link_weight) in &links {
                let gain =
                    link_weight - community_degree[candidate] * degree[node] / total_weight;
                if gain > best_gain + 1e-12
                    || (gain > best_gain - 1e-12 && candidate < best_community)
                {
                    best_gain = gain;
                    best_community = candidate;
                }
            }

            community_degree[best_community] += degree[node];
            if best_community != current {
                community[node] = best_community;
                moves += 1;
            }
        }
        if moves == 0 {
            break;
        }
        any_move = true;
    }
    (community, any_move)
}

fn renumber(assignment: &[usize]) -> Vec<usize> {
    let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
    let mut renumbered = vec![0; assignment.len()];
    for (node, &community) in assignment.iter().enumerate() {
        let next = mapping.len();
        let id = *mapping.entry(community).or_insert(next);
        renumbered[node] = id;
    }
    renumbered
}

fn aggregate(
    adjacency: &[Vec<(usize, f64)>],
    self_loops: &[f64],
    assignment: &[usize],
    community_count: usize,
) -> (Vec<Vec<(usize, f64)>>, Vec<f64>) {
    let mut new_self_loops = vec![0.0; community_count];
    let mut pair_weights: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (node, neighbors) in adjacency.iter().enumerate() {
        let a = assignment[node];
        new_self_loops[a] += self_loops[node];
        for &(neighbor, weight) in neighbors {
            if neighbor < node {
                continue;
            }
            let b = assignment[neighbor];
            if a == b {
                new_self_loops[a] += weight;
            } else {
                let key = if a < b { (a, b) } else { (b, a) };
                *pair_weights.entry(key).or_insert(0.0) += weight;
            }
        }
    }
    let mut new_adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); community_count];
    for (&(a, b), &weight) in &pair_weights {
        new_adjacency[a].push((b, weight));
        new_adjacency[b].push((a, weight));
    }
    (new_adjacency, new_self_loops)
}

/// Fisher-Yates over splitmix64 so visit order is reproducible without a
/// rand dependency.
fn shuffled_order(n: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut state = seed ^ 0x9e37_79b9_7f4a_7c15;
    for i in (1..n).rev() {
        state = splitmix64(&mut state);
        let j = (state % (i as u64 + 1)) as usize;
        order.swap(i, j);
    }
    order
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, file: &str) -> CodeNode {
        CodeNode::parsed(NodeLabel::Function, name, file, 1, 2, name)
    }

    fn calls(from: &CodeNode, to: &CodeNode) -> CodeRelation {
        CodeRelation::new(&from.id, &to.id, RelationType::Calls)
    }

    /// Two triangles joined by a single bridge edge.
    fn two_triangles() -> (Vec<CodeNode>, Vec<CodeRelation>) {
        let names = ["a1", "a2", "a3", "b1", "b2", "b3"];
        let symbols: Vec<CodeNode> = names.iter().map(|n| symbol(n, "src/m.ts")).collect();
        let mut relations = vec![
            calls(&symbols[0], &symbols[1]),
            calls(&symbols[1], &symbols[2]),
            calls(&symbols[2], &symbols[0]),
            calls(&symbols[3], &symbols[4]),
            calls(&symbols[4], &symbols[5]),
            calls(&symbols[5], &symbols[3]),
        ];
        relations.push(calls(&symbols[0], &symbols[3]));
        (symbols, relations)
    }

    #[test]
    fn separates_weakly_joined_triangles() {
        let (symbols, relations) = two_triangles();
        let config = ClusterConfig::default();
        let result = detect_clusters(&symbols, &relations, &config);
        assert_eq!(result.nodes.len(), 2);
        let cluster_of = |name: &str| {
            let id = &symbols.iter().find(|s| s.name == name).unwrap().id;
            result.membership.get(id).unwrap().clone()
        };
        assert_eq!(cluster_of("a1"), cluster_of("a2"));
        assert_eq!(cluster_of("a2"), cluster_of("a3"));
        assert_eq!(cluster_of("b1"), cluster_of("b2"));
        assert_ne!(cluster_of("a1"), cluster_of("b1"));
    }

    #[test]
    fn identical_input_and_seed_reproduce_identical_membership() {
        let (symbols, relations) = two_triangles();
        let config = ClusterConfig::default();
        let first = detect_clusters(&symbols, &relations, &config);
        let second = detect_clusters(&symbols, &relations, &config);
        assert_eq!(first.membership, second.membership);
        let first_ids: Vec<&String> = first.nodes.iter().map(|n| &n.id).collect();
        let second_ids: Vec<&String> = second.nodes.iter().map(|n| &n.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn communities_below_min_size_are_discarded() {
        let a = symbol("a", "src/m.ts");
        let b = symbol("b", "src/m.ts");
        let relations = vec![calls(&a, &b)];
        let config = ClusterConfig::default();
        let result = detect_clusters(&[a, b], &relations, &config);
        assert!(result.nodes.is_empty());
        assert!(result.membership.is_empty());
    }

    #[test]
    fn cohesion_reflects_boundary_traffic() {
        let (symbols, relations) = two_triangles();
        let config = ClusterConfig::default();
        let result = detect_clusters(&symbols, &relations, &config);
        for cluster in &result.nodes {
            let cohesion = cluster.cohesion.unwrap();
            // 3 internal edges, 1 bridge edge: 3 / (3 + 1).
            assert!((cohesion - 0.75).abs() < 1e-9);
            assert_eq!(cluster.label, NodeLabel::Cluster);
        }
    }

    #[test]
    fn derived_edges_are_ignored_when_building_the_graph() {
        let a = symbol("a", "src/m.ts");
        let b = symbol("b", "src/m.ts");
        let c = symbol("c", "src/m.ts");
        let relations = vec![
            calls(&a, &b),
            calls(&b, &c),
            calls(&c, &a),
            CodeRelation::new(&a.id, &b.id, RelationType::Contains),
        ];
        let config = ClusterConfig::default();
        let result = detect_clusters(&[a, b, c], &relations, &config);
        assert_eq!(result.nodes.len(), 1);
    }
}
