//! The sync state machine: export before a commit, hydrate after a pull,
//! and regenerate from source whenever the manifest cannot be trusted.
//!
//! The graph is a pure function of the source tree and the algorithm
//! configuration, so two manifests are never merged field by field;
//! convergence comes from regeneration.

use crate::error::SyncError;
use crate::manifest::{self, ManifestHeader};
use engine::parser::SourceParser;
use engine::{CodeGraphEngine, EngineConfig};
use graph_store::{GraphStore, StoreConfig, WriteBatch};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Manifest matches the current graph.
    Clean,
    /// The graph changed since the last export.
    Dirty,
    Exporting,
    Hydrating,
    ConflictDetected,
    Regenerating,
}

pub struct SyncEngine {
    manifest_path: PathBuf,
    db_path: PathBuf,
    store_config: StoreConfig,
    state: SyncState,
}

impl SyncEngine {
    pub fn new(manifest_path: PathBuf, db_path: PathBuf, store_config: StoreConfig) -> Self {
        Self {
            manifest_path,
            db_path,
            store_config,
            state: SyncState::Clean,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Called on every successful ingestion delta.
    pub fn mark_dirty(&mut self) {
        self.state = SyncState::Dirty;
    }

    /// Serialize the full semantic state, bound to `commit`. Triggered
    /// before a commit is finalized (pre-commit hook).
    pub fn export(
        &mut self,
        store: &GraphStore,
        commit: &str,
        compress: bool,
    ) -> Result<ManifestHeader, SyncError> {
        self.state = SyncState::Exporting;
        let result = self.export_inner(store, commit, compress);
        self.state = match &result {
            Ok(_) => SyncState::Clean,
            // The graph still has unexported changes.
            Err(_) => SyncState::Dirty,
        };
        result
    }

    fn export_inner(
        &self,
        store: &GraphStore,
        commit: &str,
        compress: bool,
    ) -> Result<ManifestHeader, SyncError> {
        let nodes = store.all_nodes()?;
        let edges = store.all_relations()?;
        let bytes = manifest::encode_manifest(&nodes, &edges, commit, compress)?;
        std::fs::write(&self.manifest_path, bytes)?;
        info!(
            commit,
            nodes = nodes.len(),
            edges = edges.len(),
            path = %self.manifest_path.display(),
            "Exported manifest"
        );
        Ok(ManifestHeader {
            schema_version: manifest::MANIFEST_SCHEMA_VERSION,
            commit: commit.to_string(),
            node_count: nodes.len(),
            edge_count: edges.len(),
        })
    }

    /// Bulk-load the manifest into a fresh store, skipping the ingestion
    /// path entirely. Any caller-held store for `db_path` must be dropped
    /// first.
    pub fn hydrate(&mut self, expected_commit: Option<&str>) -> Result<GraphStore, SyncError> {
        self.state = SyncState::Hydrating;
        let result = self.hydrate_inner(expected_commit);
        match &result {
            Ok(_) => self.state = SyncState::Clean,
            Err(error) if error.triggers_regeneration() => {
                self.state = SyncState::ConflictDetected;
            }
            Err(_) => {}
        }
        result
    }

    fn hydrate_inner(&self, expected_commit: Option<&str>) -> Result<GraphStore, SyncError> {
        let bytes = match std::fs::read(&self.manifest_path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::ManifestMissing(
                    self.manifest_path.display().to_string(),
                ));
            }
            Err(error) => return Err(error.into()),
        };
        let parsed = manifest::decode_manifest(&bytes)?;
        if let Some(expected) = expected_commit
            && parsed.header.commit != expected
        {
            return Err(SyncError::CommitMismatch {
                expected: expected.to_string(),
                found: parsed.header.commit,
            });
        }

        let store = GraphStore::create_fresh(&self.db_path, &self.store_config)?;
        store.apply(&WriteBatch {
            upsert_nodes: parsed.nodes,
            upsert_relations: parsed.edges,
            ..Default::default()
        })?;
        info!(
            commit = %parsed.header.commit,
            nodes = parsed.header.node_count,
            edges = parsed.header.edge_count,
            "Hydrated graph from manifest"
        );
        Ok(store)
    }

    /// Discard everything and rebuild from the source tree, then export a
    /// superseding manifest. Walks with gitignore semantics, skips files
    /// the parser rejects, and polls `cancel` between files so a newer
    /// manifest can abort a stale regeneration.
    pub fn regenerate<P: SourceParser>(
        &mut self,
        source_root: &Path,
        parser: P,
        config: EngineConfig,
        commit: &str,
        cancel: &AtomicBool,
    ) -> Result<CodeGraphEngine<P>, SyncError> {
        self.state = SyncState::Regenerating;
        info!(root = %source_root.display(), "Regenerating graph from source");

        let store = GraphStore::create_fresh(&self.db_path, &self.store_config)?;
        let engine = CodeGraphEngine::new(store, config, parser);

        for entry in WalkBuilder::new(source_root).build() {
            if cancel.load(Ordering::Relaxed) {
                return Err(SyncError::Cancelled);
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(%error, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                debug!(path = %entry.path().display(), "Skipping non-text file");
                continue;
            };
            let file_path = relative_path(source_root, entry.path());
            match engine.ingest_file(&file_path, &content) {
                Ok(_) => {}
                Err(error) if error.is_per_file() => {
                    debug!(%error, "Skipping file during regeneration");
                }
                Err(error) => return Err(error.into()),
            }
        }

        engine.resolve_pending()?;
        engine.derive()?;
        self.export(engine.store(), commit, false)?;
        Ok(engine)
    }

    /// The post-merge/post-pull entry point: hydrate when the manifest is
    /// trustworthy, otherwise fall back to full regeneration.
    pub fn hydrate_or_regenerate<P: SourceParser>(
        &mut self,
        pulled_commit: &str,
        source_root: &Path,
        parser: P,
        config: EngineConfig,
        cancel: &AtomicBool,
    ) -> Result<GraphStore, SyncError> {
        match self.hydrate(Some(pulled_commit)) {
            Ok(store) => Ok(store),
            Err(error) if error.triggers_regeneration() => {
                info!(%error, "Manifest unusable, regenerating from source");
                let engine =
                    self.regenerate(source_root, parser, config, pulled_commit, cancel)?;
                Ok(engine.into_store())
            }
            Err(error) => Err(error),
        }
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
