//! Thin adapter over the embedded Kuzu graph database.
//!
//! The store owns all persistent graph state: `CodeNode` rows, the single
//! typed `CodeRelation` edge table, the separate `CodeEmbedding` vector
//! table and the `PendingReference` side table for not-yet-resolvable
//! references. Every other crate reads and writes through [`GraphStore`]
//! and holds no state of its own beyond transient working sets.

pub mod embedding;
pub mod kuzu;
pub mod model;
pub mod schema;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use crate::kuzu::config::StoreConfig;
pub use crate::kuzu::types::{StoreError, StoreStats};
pub use model::{
    CodeNode, CodeRelation, NodeLabel, PendingReference, ProcessKind, RelationType, Resolution,
    content_fingerprint, stable_node_id,
};
pub use store::{GraphOverview, GraphStore, QueryOutput, WriteBatch};
