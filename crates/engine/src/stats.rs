//! Counters accumulated across an indexing run, printed after `index` and
//! exportable as JSON.

use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexingStats {
    pub files_processed: usize,
    /// Files whose re-ingestion produced an empty delta.
    pub files_unchanged: usize,
    pub files_errored: usize,
    pub nodes_upserted: usize,
    pub nodes_deleted: usize,
    pub relations_upserted: usize,
    pub relations_deleted: usize,
    pub pending_recorded: usize,
    pub pending_resolved: usize,
    pub duration_ms: u64,
}

impl IndexingStats {
    pub fn merge(&mut self, other: &IndexingStats) {
        self.files_processed += other.files_processed;
        self.files_unchanged += other.files_unchanged;
        self.files_errored += other.files_errored;
        self.nodes_upserted += other.nodes_upserted;
        self.nodes_deleted += other.nodes_deleted;
        self.relations_upserted += other.relations_upserted;
        self.relations_deleted += other.relations_deleted;
        self.pending_recorded += other.pending_recorded;
        self.pending_resolved += other.pending_resolved;
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_ms = duration.as_millis() as u64;
    }
}

impl std::fmt::Display for IndexingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files processed ({} unchanged, {} errored), +{}/-{} nodes, +{}/-{} relations, {} pending resolved, {} ms",
            self.files_processed,
            self.files_unchanged,
            self.files_errored,
            self.nodes_upserted,
            self.nodes_deleted,
            self.relations_upserted,
            self.relations_deleted,
            self.pending_resolved,
            self.duration_ms
        )
    }
}
