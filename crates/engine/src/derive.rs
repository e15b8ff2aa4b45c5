//! One derivation pass: cluster detection, then process tracing over the
//! fresh membership, then a single delete-then-recreate transaction.
//!
//! Everything is computed into memory first; the write only happens if the
//! pass stayed within budget, so a timeout always leaves the previous
//! generation of derived data intact.

use crate::cluster::detect_clusters;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::process::trace_processes;
use graph_store::{CodeNode, GraphStore, NodeLabel, RelationType, WriteBatch};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DerivationOutcome {
    pub clusters: usize,
    pub processes: usize,
    pub duration_ms: u64,
}

pub fn run_derivation(
    store: &GraphStore,
    config: &EngineConfig,
) -> Result<DerivationOutcome, EngineError> {
    let started = Instant::now();
    let budget = Duration::from_millis(config.derivation.budget_ms);

    // Consistent snapshot of the raw graph for the whole pass.
    let symbols: Vec<CodeNode> = store
        .all_nodes()?
        .into_iter()
        .filter(|n| n.label.is_symbol())
        .collect();
    let edges = store.relations_by_types(&[RelationType::Calls, RelationType::Imports])?;

    let clusters = detect_clusters(&symbols, &edges, &config.cluster);
    check_budget(started, budget)?;

    let processes = trace_processes(&symbols, &edges, &clusters.membership, &config.process);
    check_budget(started, budget)?;

    let outcome = DerivationOutcome {
        clusters: clusters.nodes.len(),
        processes: processes.nodes.len(),
        duration_ms: started.elapsed().as_millis() as u64,
    };

    let mut batch = WriteBatch {
        delete_labels: vec![NodeLabel::Cluster, NodeLabel::Process],
        ..Default::default()
    };
    batch.upsert_nodes.extend(clusters.nodes);
    batch.upsert_nodes.extend(processes.nodes);
    batch.upsert_relations.extend(clusters.relations);
    batch.upsert_relations.extend(processes.relations);
    store.apply(&batch)?;

    info!(
        clusters = outcome.clusters,
        processes = outcome.processes,
        duration_ms = outcome.duration_ms,
        "Derivation pass complete"
    );
    Ok(outcome)
}

fn check_budget(started: Instant, budget: Duration) -> Result<(), EngineError> {
    let elapsed = started.elapsed();
    if elapsed > budget {
        return Err(EngineError::DerivationTimeout {
            budget_ms: budget.as_millis() as u64,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }
    Ok(())
}
