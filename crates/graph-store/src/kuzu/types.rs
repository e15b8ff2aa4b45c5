use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Kuzu error: {0}")]
    Kuzu(#[from] kuzu::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to execute query: {query}. Error: {error}")]
    QueryExecutionError { query: String, error: kuzu::Error },
    #[error("Database initialization failed: {0}")]
    InitializationFailed(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Unexpected row shape for query: {0}")]
    UnexpectedRow(String),
}

/// Row/column counts for the whole store, reported by `overview`.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub total_embeddings: usize,
    pub total_pending_references: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Store stats: {} nodes, {} relationships, {} embeddings, {} pending references",
            self.total_nodes,
            self.total_relationships,
            self.total_embeddings,
            self.total_pending_references
        )
    }
}
