//! Test helpers shared by this crate's unit tests and downstream crates
//! (behind the `test-utils` feature).

use crate::kuzu::config::StoreConfig;
use crate::store::GraphStore;
use tempfile::TempDir;

/// An empty store backed by a temporary directory. Keep the `TempDir`
/// alive for as long as the store is in use.
pub fn temp_store() -> (TempDir, GraphStore) {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("graph.kz");
    let store =
        GraphStore::create_fresh(&db_path, &StoreConfig::default()).expect("failed to open store");
    (temp_dir, store)
}
