//! End-to-end sync tests: export, hydrate, conflict fallback and
//! regeneration, over the fixture parser.

use crate::engine::{SyncEngine, SyncState};
use crate::error::SyncError;
use engine::testing::FixtureParser;
use engine::{CodeGraphEngine, EngineConfig};
use graph_store::{GraphStore, RelationType, StoreConfig};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

fn populated_engine(dir: &Path) -> CodeGraphEngine<FixtureParser> {
    let store = GraphStore::create_fresh(&dir.join("graph.kz"), &StoreConfig::default()).unwrap();
    let engine = CodeGraphEngine::new(store, EngineConfig::default(), FixtureParser);
    engine
        .ingest_file(
            "src/m.ckg",
            "fn a\nfn b\nfn c\ncall a -> b\ncall b -> c\ncall c -> a\n",
        )
        .unwrap();
    engine.derive().unwrap();
    engine
}

fn sorted_node_ids(store: &GraphStore) -> Vec<String> {
    let mut ids: Vec<String> = store.all_nodes().unwrap().into_iter().map(|n| n.id).collect();
    ids.sort();
    ids
}

fn sorted_edge_keys(store: &GraphStore) -> Vec<(String, String, RelationType)> {
    let mut keys: Vec<_> = store
        .all_relations()
        .unwrap()
        .into_iter()
        .map(|r| r.key())
        .collect();
    keys.sort();
    keys
}

#[test]
fn export_then_hydrate_reproduces_the_graph() {
    let dir = TempDir::new().unwrap();
    let source_engine = populated_engine(dir.path());
    let manifest_path = dir.path().join("manifest.jsonl");

    let mut sync = SyncEngine::new(
        manifest_path.clone(),
        dir.path().join("hydrated.kz"),
        StoreConfig::default(),
    );
    let header = sync.export(source_engine.store(), "commit-1", false).unwrap();
    assert_eq!(sync.state(), SyncState::Clean);
    assert!(header.node_count > 0);

    let hydrated = sync.hydrate(Some("commit-1")).unwrap();
    assert_eq!(sync.state(), SyncState::Clean);
    assert_eq!(sorted_node_ids(source_engine.store()), sorted_node_ids(&hydrated));
    assert_eq!(
        sorted_edge_keys(source_engine.store()),
        sorted_edge_keys(&hydrated)
    );
    // Derived data travels with the manifest, no local re-derivation.
    assert!(
        sorted_edge_keys(&hydrated)
            .iter()
            .any(|(_, _, t)| *t == RelationType::MemberOf)
    );
}

#[test]
fn dirty_transitions_on_ingest_and_clears_on_export() {
    let dir = TempDir::new().unwrap();
    let engine = populated_engine(dir.path());
    let mut sync = SyncEngine::new(
        dir.path().join("manifest.jsonl"),
        dir.path().join("other.kz"),
        StoreConfig::default(),
    );
    sync.mark_dirty();
    assert_eq!(sync.state(), SyncState::Dirty);
    sync.export(engine.store(), "commit-1", false).unwrap();
    assert_eq!(sync.state(), SyncState::Clean);
}

#[test]
fn commit_mismatch_refuses_hydration() {
    let dir = TempDir::new().unwrap();
    let engine = populated_engine(dir.path());
    let mut sync = SyncEngine::new(
        dir.path().join("manifest.jsonl"),
        dir.path().join("hydrated.kz"),
        StoreConfig::default(),
    );
    sync.export(engine.store(), "commit-1", false).unwrap();

    let err = sync.hydrate(Some("commit-2")).unwrap_err();
    assert!(matches!(err, SyncError::CommitMismatch { .. }));
    assert_eq!(sync.state(), SyncState::ConflictDetected);
}

#[test]
fn conflicted_manifest_regenerates_from_source() {
    let dir = TempDir::new().unwrap();
    let source_root = dir.path().join("repo");
    std::fs::create_dir_all(source_root.join("src")).unwrap();
    std::fs::write(
        source_root.join("src/m.ckg"),
        "fn a\nfn b\nfn c\ncall a -> b\ncall b -> c\ncall c -> a\n",
    )
    .unwrap();

    let manifest_path = dir.path().join("manifest.jsonl");
    std::fs::write(
        &manifest_path,
        "<<<<<<< HEAD\n{\"kind\":\"header\"}\n=======\n{\"kind\":\"header\"}\n>>>>>>> theirs\n",
    )
    .unwrap();

    let mut sync = SyncEngine::new(
        manifest_path.clone(),
        dir.path().join("regen.kz"),
        StoreConfig::default(),
    );
    let cancel = AtomicBool::new(false);
    let store = sync
        .hydrate_or_regenerate(
            "commit-9",
            &source_root,
            FixtureParser,
            EngineConfig::default(),
            &cancel,
        )
        .unwrap();
    assert_eq!(sync.state(), SyncState::Clean);

    // The regenerated graph equals a fresh ingestion of the same tree.
    let reference_dir = TempDir::new().unwrap();
    let reference = {
        let store =
            GraphStore::create_fresh(&reference_dir.path().join("ref.kz"), &StoreConfig::default())
                .unwrap();
        let engine = CodeGraphEngine::new(store, EngineConfig::default(), FixtureParser);
        engine
            .ingest_file(
                "src/m.ckg",
                "fn a\nfn b\nfn c\ncall a -> b\ncall b -> c\ncall c -> a\n",
            )
            .unwrap();
        engine.derive().unwrap();
        engine.into_store()
    };
    assert_eq!(sorted_node_ids(&store), sorted_node_ids(&reference));
    assert_eq!(sorted_edge_keys(&store), sorted_edge_keys(&reference));

    // A superseding manifest was exported and now hydrates cleanly.
    drop(store);
    let mut fresh_sync = SyncEngine::new(
        manifest_path,
        dir.path().join("second.kz"),
        StoreConfig::default(),
    );
    fresh_sync.hydrate(Some("commit-9")).unwrap();
}

#[test]
fn missing_manifest_falls_back_to_regeneration() {
    let dir = TempDir::new().unwrap();
    let source_root = dir.path().join("repo");
    std::fs::create_dir_all(&source_root).unwrap();
    std::fs::write(source_root.join("m.ckg"), "fn a\nfn b\ncall a -> b\n").unwrap();

    // No manifest was ever exported at this path.
    let mut sync = SyncEngine::new(
        dir.path().join("manifest.jsonl"),
        dir.path().join("regen.kz"),
        StoreConfig::default(),
    );
    let err = sync.hydrate(Some("commit-1")).unwrap_err();
    assert!(matches!(err, SyncError::ManifestMissing(_)));

    let cancel = AtomicBool::new(false);
    let store = sync
        .hydrate_or_regenerate(
            "commit-1",
            &source_root,
            FixtureParser,
            EngineConfig::default(),
            &cancel,
        )
        .unwrap();
    assert_eq!(sync.state(), SyncState::Clean);
    assert_eq!(store.nodes_for_file("m.ckg").unwrap().len(), 3);

    // Regeneration exported a manifest, so the next hydration succeeds.
    drop(store);
    sync.hydrate(Some("commit-1")).unwrap();
}

#[test]
fn failed_export_leaves_the_state_dirty() {
    let dir = TempDir::new().unwrap();
    let engine = populated_engine(dir.path());
    let mut sync = SyncEngine::new(
        dir.path().join("no-such-dir").join("manifest.jsonl"),
        dir.path().join("other.kz"),
        StoreConfig::default(),
    );
    sync.mark_dirty();
    assert!(sync.export(engine.store(), "commit-1", false).is_err());
    assert_eq!(sync.state(), SyncState::Dirty);
}

#[test]
fn commit_mismatch_falls_back_to_regeneration() {
    let dir = TempDir::new().unwrap();
    let source_root = dir.path().join("repo");
    std::fs::create_dir_all(&source_root).unwrap();
    std::fs::write(source_root.join("m.ckg"), "fn a\n").unwrap();

    let engine = populated_engine(dir.path());
    let mut sync = SyncEngine::new(
        dir.path().join("manifest.jsonl"),
        dir.path().join("regen.kz"),
        StoreConfig::default(),
    );
    sync.export(engine.store(), "old-commit", false).unwrap();

    let cancel = AtomicBool::new(false);
    let store = sync
        .hydrate_or_regenerate(
            "new-commit",
            &source_root,
            FixtureParser,
            EngineConfig::default(),
            &cancel,
        )
        .unwrap();
    assert_eq!(sync.state(), SyncState::Clean);
    // Rebuilt from the one-file tree, not from the stale manifest.
    assert_eq!(store.nodes_for_file("m.ckg").unwrap().len(), 2);
}

#[test]
fn regeneration_honors_the_cancellation_flag() {
    let dir = TempDir::new().unwrap();
    let source_root = dir.path().join("repo");
    std::fs::create_dir_all(&source_root).unwrap();
    std::fs::write(source_root.join("m.ckg"), "fn a\n").unwrap();

    let mut sync = SyncEngine::new(
        dir.path().join("manifest.jsonl"),
        dir.path().join("regen.kz"),
        StoreConfig::default(),
    );
    let cancel = AtomicBool::new(true);
    let err = sync
        .regenerate(
            &source_root,
            FixtureParser,
            EngineConfig::default(),
            "commit-1",
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
}
