use crate::kuzu::types::StoreError;
use kuzu::{Connection, Database};
use serde_json::Map;
use tracing::debug;

/// Raw rows returned by an uncontrolled pattern query.
pub struct RawQueryResult {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<kuzu::Value>>,
}

/// One connection to the embedded database. Connections are cheap and
/// short-lived; each store operation opens its own.
pub struct StoreConnection<'a> {
    connection: Connection<'a>,
}

impl<'a> StoreConnection<'a> {
    pub fn new(database: &'a Database) -> Result<Self, StoreError> {
        let connection = Connection::new(database)?;
        Ok(Self { connection })
    }

    pub fn query(&self, query: &str) -> Result<kuzu::QueryResult<'_>, StoreError> {
        self.connection
            .query(query)
            .map_err(|e| StoreError::QueryExecutionError {
                query: query.to_string(),
                error: e,
            })
    }

    /// Execute a parameterized statement, discarding any returned rows.
    pub fn execute(&self, query: &str, params: Vec<(&str, kuzu::Value)>) -> Result<(), StoreError> {
        let mut prepared = self.connection.prepare(query)?;
        let mut result = self.connection.execute(&mut prepared, params).map_err(|e| {
            StoreError::QueryExecutionError {
                query: query.to_string(),
                error: e,
            }
        })?;
        while result.next().is_some() {}
        Ok(())
    }

    /// Execute a parameterized statement and collect the returned rows.
    pub fn execute_rows(
        &self,
        query: &str,
        params: Vec<(&str, kuzu::Value)>,
    ) -> Result<Vec<Vec<kuzu::Value>>, StoreError> {
        let mut prepared = self.connection.prepare(query)?;
        let result = self.connection.execute(&mut prepared, params).map_err(|e| {
            StoreError::QueryExecutionError {
                query: query.to_string(),
                error: e,
            }
        })?;
        Ok(result.into_iter().collect())
    }

    pub fn execute_ddl(&self, query: &str) -> Result<(), StoreError> {
        debug!("Executing DDL: {}", query);
        self.execute(query, vec![])
    }

    /// Uncontrolled query with JSON parameters, for the raw pattern-query
    /// passthrough surface.
    pub fn generic_query(
        &self,
        query: &str,
        params: Map<String, serde_json::Value>,
    ) -> Result<RawQueryResult, StoreError> {
        let kuzu_params = extract_kuzu_params(&params);
        let mut prepared = self.connection.prepare(query)?;
        let result = self
            .connection
            .execute(&mut prepared, kuzu_params)
            .map_err(|e| StoreError::QueryExecutionError {
                query: query.to_string(),
                error: e,
            })?;
        Ok(RawQueryResult {
            column_names: result.get_column_names().to_vec(),
            rows: result.into_iter().collect::<Vec<_>>(),
        })
    }

    fn start_transaction(&self) -> Result<(), StoreError> {
        self.execute("BEGIN TRANSACTION;", vec![])
    }

    fn commit_transaction(&self) -> Result<(), StoreError> {
        self.execute("COMMIT;", vec![])
    }

    fn rollback_transaction(&self) -> Result<(), StoreError> {
        self.execute("ROLLBACK;", vec![])
    }

    /// Run `f` inside a transaction, rolling back on error. Derivation
    /// passes rely on this so delete-then-recreate appears atomic to
    /// concurrent readers.
    pub fn transaction(
        &self,
        f: impl FnOnce(&StoreConnection<'a>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.start_transaction()?;
        match f(self) {
            Ok(()) => self.commit_transaction(),
            Err(e) => {
                let _ = self.rollback_transaction();
                Err(e)
            }
        }
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StoreError> {
        let result = self.query("CALL SHOW_TABLES() RETURN *")?;
        for row in result {
            if let Some(kuzu::Value::String(existing)) = row.get(1)
                && existing.eq_ignore_ascii_case(table_name)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn extract_kuzu_params(
    json_params: &Map<String, serde_json::Value>,
) -> Vec<(&str, kuzu::Value)> {
    json_params
        .iter()
        .map(|(key, value)| (key.as_str(), json_to_kuzu_value(value)))
        .collect()
}

fn json_to_kuzu_value(value: &serde_json::Value) -> kuzu::Value {
    match value {
        serde_json::Value::String(s) => kuzu::Value::from(s.as_str()),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                kuzu::Value::from(i)
            } else if let Some(f) = n.as_f64() {
                kuzu::Value::from(f)
            } else {
                kuzu::Value::from(0i64)
            }
        }
        serde_json::Value::Bool(b) => kuzu::Value::Bool(*b),
        serde_json::Value::Null => kuzu::Value::Null(kuzu::LogicalType::Any),
        serde_json::Value::Array(arr) => {
            let values: Vec<kuzu::Value> = arr.iter().map(json_to_kuzu_value).collect();
            let logical_type = match arr.first() {
                Some(serde_json::Value::String(_)) => kuzu::LogicalType::String,
                Some(serde_json::Value::Number(n)) if n.is_i64() => kuzu::LogicalType::Int64,
                Some(serde_json::Value::Number(_)) => kuzu::LogicalType::Double,
                Some(serde_json::Value::Bool(_)) => kuzu::LogicalType::Bool,
                _ => kuzu::LogicalType::Any,
            };
            kuzu::Value::List(logical_type, values)
        }
        serde_json::Value::Object(obj) => {
            let fields = obj
                .iter()
                .map(|(k, v)| (k.to_string(), json_to_kuzu_value(v)))
                .collect();
            kuzu::Value::Struct(fields)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kuzu::config::StoreConfig;
    use crate::kuzu::database::force_new_database;

    #[test]
    fn generic_query_with_params() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.kz");
        let database = force_new_database(&db_path, &StoreConfig::default()).unwrap();
        let conn = StoreConnection::new(&database).unwrap();

        conn.execute_ddl(
            "CREATE NODE TABLE Item (id INT64, name STRING, PRIMARY KEY (id))",
        )
        .unwrap();
        conn.execute_ddl("CREATE (i:Item {id: 1, name: 'alpha'});").unwrap();
        conn.execute_ddl("CREATE (i:Item {id: 2, name: 'beta'});").unwrap();

        let result = conn
            .generic_query(
                "MATCH (i:Item) WHERE i.name = $name RETURN i.id, i.name",
                serde_json::json!({ "name": "beta" })
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .unwrap();

        assert_eq!(result.column_names, vec!["i.id", "i.name"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0].to_string(), "2");
        assert_eq!(result.rows[0][1].to_string(), "beta");
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.kz");
        let database = force_new_database(&db_path, &StoreConfig::default()).unwrap();
        let conn = StoreConnection::new(&database).unwrap();

        conn.execute_ddl(
            "CREATE NODE TABLE Item (id INT64, name STRING, PRIMARY KEY (id))",
        )
        .unwrap();

        let outcome = conn.transaction(|c| {
            c.execute_ddl("CREATE (i:Item {id: 1, name: 'alpha'});")?;
            c.execute_ddl("THIS IS NOT CYPHER")
        });
        assert!(outcome.is_err());

        let mut result = conn.query("MATCH (i:Item) RETURN count(i)").unwrap();
        let row = result.next().unwrap();
        assert_eq!(row.first().unwrap().to_string(), "0");
    }
}
