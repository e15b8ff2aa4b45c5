//! The engine facade owning concurrency control: parallel ingestion of
//! independent files, per-file serialization, and derivation passes that
//! are exclusive with respect to ingestion.

use crate::config::EngineConfig;
use crate::derive::{DerivationOutcome, run_derivation};
use crate::error::EngineError;
use crate::impact::{ImpactOptions, ImpactResult, compute_impact};
use crate::ingest::{self, Delta, PendingOutcome};
use crate::parser::SourceParser;
use crate::stats::IndexingStats;
use dashmap::DashMap;
use graph_store::{CodeNode, CodeRelation, GraphOverview, GraphStore, RelationType};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::warn;

pub struct CodeGraphEngine<P: SourceParser> {
    store: GraphStore,
    config: EngineConfig,
    parser: P,
    /// Ingestion holds this shared; a derivation pass holds it exclusive.
    pass_lock: RwLock<()>,
    /// Serializes concurrent ingestion of the same file (last write wins).
    file_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<P: SourceParser> CodeGraphEngine<P> {
    pub fn new(store: GraphStore, config: EngineConfig, parser: P) -> Self {
        Self {
            store,
            config,
            parser,
            pass_lock: RwLock::new(()),
            file_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn into_store(self) -> GraphStore {
        self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingest one file, applying its delta atomically. Idempotent: identical
    /// content yields an empty delta and no writes.
    pub fn ingest_file(&self, file_path: &str, content: &str) -> Result<Delta, EngineError> {
        let _pass = self
            .pass_lock
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let file_lock = self
            .file_locks
            .entry(file_path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _file = file_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let delta = ingest::compute_delta(&self.store, &self.parser, file_path, content)?;
        if !delta.is_empty() {
            self.store.apply(&delta.to_batch())?;
        }
        Ok(delta)
    }

    /// Ingest many files in parallel, then re-resolve pending references
    /// once so late-arriving files satisfy earlier files' lookups. A parse
    /// failure skips that file only.
    pub fn ingest_batch(&self, files: &[(String, String)]) -> Result<IndexingStats, EngineError> {
        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build()
            .map_err(|e| EngineError::Config(format!("thread pool: {e}")))?;

        let results: Vec<Result<Delta, EngineError>> = pool.install(|| {
            use rayon::prelude::*;
            files
                .par_iter()
                .map(|(file_path, content)| self.ingest_file(file_path, content))
                .collect()
        });

        let mut stats = IndexingStats::default();
        let mut fatal: Option<EngineError> = None;
        for result in results {
            match result {
                Ok(delta) => delta.record_stats(&mut stats),
                Err(error) if error.is_per_file() => {
                    warn!(%error, "Skipping file");
                    stats.files_errored += 1;
                }
                // A store-level failure aborts the batch; per-file
                // failures do not.
                Err(error) => fatal = Some(error),
            }
        }
        if let Some(error) = fatal {
            return Err(error);
        }

        let pending = self.resolve_pending()?;
        stats.pending_resolved = pending.resolved;
        stats.set_duration(started.elapsed());
        Ok(stats)
    }

    pub fn resolve_pending(&self) -> Result<PendingOutcome, EngineError> {
        let _pass = self
            .pass_lock
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ingest::resolve_pending(&self.store)
    }

    /// Run one cluster+process derivation pass, exclusive with ingestion.
    pub fn derive(&self) -> Result<DerivationOutcome, EngineError> {
        let _pass = self
            .pass_lock
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        run_derivation(&self.store, &self.config)
    }

    pub fn impact(&self, target: &str, options: &ImpactOptions) -> Result<ImpactResult, EngineError> {
        compute_impact(&self.store, target, options)
    }

    /// Name lookup for the outward `search` surface: exact matches first,
    /// then the bare segment of a qualified name.
    pub fn search(&self, name: &str) -> Result<Vec<CodeNode>, EngineError> {
        let mut matches = self.store.nodes_by_name(name)?;
        if matches.is_empty()
            && let Some((_, bare)) = name.rsplit_once('.')
        {
            matches = self.store.nodes_by_name(bare)?;
        }
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    /// Neighbors of a symbol along one relation type, both directions.
    pub fn explore(
        &self,
        target: &str,
        rel_type: RelationType,
    ) -> Result<Vec<(CodeRelation, CodeNode)>, EngineError> {
        let Some(node) = self.search(target)?.into_iter().next() else {
            return Ok(Vec::new());
        };
        let mut neighbors = Vec::new();
        for relation in self.store.relations_by_types(&[rel_type])? {
            let other_id = if relation.from == node.id {
                &relation.to
            } else if relation.to == node.id {
                &relation.from
            } else {
                continue;
            };
            if let Some(other) = self.store.node_by_id(other_id)? {
                neighbors.push((relation, other));
            }
        }
        neighbors.sort_by(|a, b| a.1.id.cmp(&b.1.id));
        Ok(neighbors)
    }

    pub fn overview(&self) -> Result<GraphOverview, EngineError> {
        Ok(self.store.overview()?)
    }
}
