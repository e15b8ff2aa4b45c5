use graph_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Per-file and non-fatal: the file's previous graph state is retained
    /// and other files in the same batch are unaffected.
    #[error("Failed to parse {file_path}: {message}")]
    ParseFailure { file_path: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A derivation pass ran over its budget and was aborted before the
    /// write transaction, leaving the previous generation intact.
    #[error("Derivation pass exceeded its {budget_ms} ms budget after {elapsed_ms} ms")]
    DerivationTimeout { budget_ms: u64, elapsed_ms: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Failures scoped to a single file never abort a batch.
    pub fn is_per_file(&self) -> bool {
        matches!(self, EngineError::ParseFailure { .. })
    }
}
