use crate::kuzu::connection::StoreConnection;
use crate::kuzu::types::StoreError;
use kuzu::Database;
use tracing::info;

/// Current manifest/schema version. Bump when the table layout changes;
/// hydration refuses manifests from a different version.
pub const SCHEMA_VERSION: u32 = 1;

const NODE_TABLE_DDL: &str = "CREATE NODE TABLE CodeNode (\
    id STRING, \
    label STRING, \
    name STRING, \
    file_path STRING, \
    start_line INT64, \
    end_line INT64, \
    content STRING, \
    cohesion DOUBLE, \
    step_count INT64, \
    process_kind STRING, \
    description STRING, \
    fingerprint STRING, \
    PRIMARY KEY (id))";

const RELATION_TABLE_DDL: &str = "CREATE REL TABLE CodeRelation (\
    FROM CodeNode TO CodeNode, \
    type STRING, \
    step INT64, \
    confidence DOUBLE)";

// The embedding table is deliberately separate from CodeNode: content
// rewrites must never invalidate stored vectors, and the embedding
// lifecycle is lazy and independent of ingestion.
const EMBEDDING_TABLE_DDL: &str = "CREATE NODE TABLE CodeEmbedding (\
    node_id STRING, \
    vector DOUBLE[], \
    PRIMARY KEY (node_id))";

const PENDING_TABLE_DDL: &str = "CREATE NODE TABLE PendingReference (\
    id STRING, \
    from_id STRING, \
    to_name STRING, \
    kind STRING, \
    PRIMARY KEY (id))";

const ALL_TABLES: [(&str, &str); 4] = [
    ("CodeNode", NODE_TABLE_DDL),
    ("CodeRelation", RELATION_TABLE_DDL),
    ("CodeEmbedding", EMBEDDING_TABLE_DDL),
    ("PendingReference", PENDING_TABLE_DDL),
];

/// Creates the graph schema on first open and verifies it afterwards.
pub struct SchemaManager<'a> {
    database: &'a Database,
}

impl<'a> SchemaManager<'a> {
    pub fn new(database: &'a Database) -> Self {
        Self { database }
    }

    fn schema_exists(&self, connection: &StoreConnection) -> Result<bool, StoreError> {
        for (table_name, _) in ALL_TABLES.iter() {
            if !connection.table_exists(table_name)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn initialize_schema(&self) -> Result<(), StoreError> {
        let connection = StoreConnection::new(self.database)?;
        if self.schema_exists(&connection)? {
            return Ok(());
        }

        info!("Initializing code graph schema");
        connection.transaction(|conn| {
            for (table_name, ddl) in ALL_TABLES.iter() {
                if !conn.table_exists(table_name)? {
                    conn.execute_ddl(ddl)?;
                }
            }
            Ok(())
        })?;
        info!("Code graph schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kuzu::config::StoreConfig;
    use crate::kuzu::database::force_new_database;

    #[test]
    fn initialize_schema_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("schema.kz");
        let database = force_new_database(&db_path, &StoreConfig::default()).unwrap();

        let manager = SchemaManager::new(&database);
        manager.initialize_schema().unwrap();
        manager.initialize_schema().unwrap();

        let conn = StoreConnection::new(&database).unwrap();
        for (table_name, _) in ALL_TABLES.iter() {
            assert!(conn.table_exists(table_name).unwrap(), "{table_name} missing");
        }
    }
}
