use crate::kuzu::config::StoreConfig;
use crate::kuzu::types::StoreError;
use kuzu::Database;
use std::path::Path;
use tracing::info;

/// Open an existing database, or create one at `database_path`.
pub fn open_database(database_path: &Path, config: &StoreConfig) -> Result<Database, StoreError> {
    let database = Database::new(database_path, config.to_system_config()).map_err(|e| {
        StoreError::InitializationFailed(format!(
            "failed to open database at {}: {e}",
            database_path.display()
        ))
    })?;
    info!("Opened graph database at {}", database_path.display());
    Ok(database)
}

/// Remove any existing database at `database_path` and create a fresh one.
/// Used by hydration and regeneration, which always start from empty.
pub fn force_new_database(
    database_path: &Path,
    config: &StoreConfig,
) -> Result<Database, StoreError> {
    if database_path.exists() {
        info!(
            "Resetting existing graph database at {}",
            database_path.display()
        );
        if database_path.is_dir() {
            std::fs::remove_dir_all(database_path)?;
        } else {
            std::fs::remove_file(database_path)?;
        }
    }
    open_database(database_path, config)
}
