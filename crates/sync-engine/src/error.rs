use graph_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The manifest text carries unresolved merge markers; field-level
    /// merging is never attempted, the caller regenerates from source.
    #[error("Manifest contains unresolved merge conflict markers")]
    ManifestConflict,

    /// Unreadable or structurally invalid manifest; regeneration applies,
    /// same as a conflict.
    #[error("Manifest is corrupt: {0}")]
    ManifestCorrupt(String),

    /// No manifest at the expected path, e.g. the first pull before any
    /// collaborator exported one. The post-merge path regenerates.
    #[error("Manifest not found at {0}")]
    ManifestMissing(String),

    #[error("Manifest is bound to commit {found}, expected {expected}")]
    CommitMismatch { expected: String, found: String },

    #[error("Regeneration cancelled, superseded by a newer manifest")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] engine::EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Errors that the post-merge path answers with regeneration rather
    /// than failure.
    pub fn triggers_regeneration(&self) -> bool {
        matches!(
            self,
            SyncError::ManifestConflict
                | SyncError::ManifestCorrupt(_)
                | SyncError::ManifestMissing(_)
                | SyncError::CommitMismatch { .. }
        )
    }
}
