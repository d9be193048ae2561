use crate::{
    errors::ProviderError,
    providers::db::storage::{QueryOutput, Storage},
    schema::{ColumnDescriptor, SchemaDescriptor, TableDescriptor},
    types::{Row, Scalar},
    validator::ValidatedSql,
};
use async_trait::async_trait;
use std::fmt::{self, Debug};
use tracing::{debug, info, warn};
use turso::{Connection, Database, Value as TursoValue};

pub mod sql;

/// A provider for a local SQLite database using Turso.
///
/// The `Database` handle is cloneable and thread-safe. Every query opens its own
/// connection, which is dropped (and so released) when the call returns, on the
/// error paths included. Clones share the same underlying database, so an
/// in-memory database can be shared by cloning the provider.
#[derive(Clone)]
pub struct SqliteProvider {
    pub db: Database,
}

impl SqliteProvider {
    /// Opens a database from a file path, or ":memory:" for an isolated in-memory one.
    pub async fn new(db_path: &str) -> Result<Self, ProviderError> {
        let db = turso::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| ProviderError::StorageConnection(e.to_string()))?;
        Ok(Self { db })
    }

    fn connect(&self) -> Result<Connection, ProviderError> {
        self.db
            .connect()
            .map_err(|e| ProviderError::StorageConnection(e.to_string()))
    }

    /// Executes a `;`-separated script. Used to load fixtures; never reachable
    /// from a question.
    pub async fn initialize_with_data(&self, init_sql: &str) -> Result<(), ProviderError> {
        let conn = self.connect()?;

        for statement in init_sql.split(';').filter(|s| !s.trim().is_empty()) {
            conn.execute(statement, ())
                .await
                .map_err(|e| ProviderError::StorageOperationFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn query_all(&self, conn: &Connection, sql: &str) -> Result<Vec<turso::Row>, ProviderError> {
        let mut rows = conn
            .query(sql, ())
            .await
            .map_err(|e| ProviderError::StorageOperationFailed(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ProviderError::StorageOperationFailed(e.to_string()))?
        {
            out.push(row);
        }
        Ok(out)
    }

    async fn describe_table(&self, conn: &Connection, name: &str) -> Result<TableDescriptor, ProviderError> {
        let mut table = TableDescriptor::new(name);

        for row in self.query_all(conn, &sql::table_info(name)).await? {
            // cid, name, type, notnull, dflt_value, pk
            let (Ok(TursoValue::Text(column)), Ok(TursoValue::Text(sql_type))) =
                (row.get_value(1), row.get_value(2))
            else {
                continue;
            };
            let mut descriptor = ColumnDescriptor::new(&column, &sql_type);
            if matches!(row.get_value(3), Ok(TursoValue::Integer(0))) {
                descriptor = descriptor.nullable();
            }
            if matches!(row.get_value(5), Ok(TursoValue::Integer(pk)) if pk > 0) {
                descriptor = descriptor.primary_key();
            }
            table = table.column(descriptor);
        }

        match self.query_all(conn, &sql::foreign_key_list(name)).await {
            Ok(rows) => {
                for row in rows {
                    // id, seq, table, from, to, ...
                    if let (
                        Ok(TursoValue::Text(referenced_table)),
                        Ok(TursoValue::Text(column)),
                        Ok(TursoValue::Text(referenced_column)),
                    ) = (row.get_value(2), row.get_value(3), row.get_value(4))
                    {
                        table = table.foreign_key(&column, &referenced_table, &referenced_column);
                    }
                }
            }
            Err(e) => warn!(table = %name, error = %e, "Could not read foreign keys; continuing without them."),
        }

        Ok(table)
    }
}

impl SqliteProvider {
    /// Runs `sql` inside a transaction that is rolled back on every path, the
    /// successful one included.
    async fn read_in_transaction(&self, sql: &str, max_rows: usize) -> Result<QueryOutput, ProviderError> {
        let conn = self.connect()?;
        conn.execute(sql::BEGIN_READ_SQL, ())
            .await
            .map_err(|e| ProviderError::StorageOperationFailed(e.to_string()))?;

        let result = read_rows(&conn, sql, max_rows).await;

        if let Err(e) = conn.execute(sql::ROLLBACK_SQL, ()).await {
            warn!(error = %e, "Failed to roll back the read transaction.");
            if result.is_ok() {
                return Err(ProviderError::StorageOperationFailed(e.to_string()));
            }
        }
        result
    }
}

/// Reads up to `max_rows` rows. The statement and its cursor are dropped before
/// this returns, so the caller can close the transaction.
async fn read_rows(conn: &Connection, sql: &str, max_rows: usize) -> Result<QueryOutput, ProviderError> {
    let mut stmt = conn
        .prepare(sql)
        .await
        .map_err(|e| ProviderError::StorageOperationFailed(e.to_string()))?;

    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut rows = stmt
        .query(())
        .await
        .map_err(|e| ProviderError::StorageOperationFailed(e.to_string()))?;

    let mut output = QueryOutput::default();

    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| ProviderError::StorageOperationFailed(e.to_string()))?
    {
        if output.rows.len() == max_rows {
            output.truncated = true;
            break;
        }
        let mut record = Row::default();
        for (i, name) in column_names.iter().enumerate() {
            let value = row
                .get_value(i)
                .map_err(|e| ProviderError::StorageOperationFailed(e.to_string()))?;
            record.push(name, turso_value_to_scalar(value));
        }
        output.rows.push(record);
    }
    Ok(output)
}

impl Debug for SqliteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteProvider").finish_non_exhaustive()
    }
}

impl AsRef<Database> for SqliteProvider {
    fn as_ref(&self) -> &Database {
        &self.db
    }
}

/// Converts a Turso value to the engine's scalar representation.
fn turso_value_to_scalar(v: TursoValue) -> Scalar {
    match v {
        TursoValue::Null => Scalar::Null,
        TursoValue::Integer(i) => Scalar::Integer(i),
        TursoValue::Real(f) if f.is_finite() => Scalar::Real(f),
        TursoValue::Real(_) => Scalar::Null,
        TursoValue::Text(s) => Scalar::Text(s),
        TursoValue::Blob(_) => Scalar::Text("<blob>".to_string()),
    }
}

#[async_trait]
impl Storage for SqliteProvider {
    fn name(&self) -> &str {
        "SQLite"
    }

    async fn execute_query(
        &self,
        sql: &ValidatedSql,
        max_rows: usize,
    ) -> Result<QueryOutput, ProviderError> {
        debug!(query = %sql, max_rows, "--> Executing SQLite query");
        let output = self.read_in_transaction(sql.as_str(), max_rows).await?;
        if output.truncated {
            warn!(max_rows, "Result truncated at the row cap.");
        }
        Ok(output)
    }

    async fn describe_schema(&self) -> Result<SchemaDescriptor, ProviderError> {
        let conn = self.connect()?;

        let mut tables = Vec::new();
        for row in self.query_all(&conn, sql::LIST_TABLES_SQL).await? {
            if let Ok(TursoValue::Text(name)) = row.get_value(0) {
                tables.push(self.describe_table(&conn, &name).await?);
            }
        }

        info!(tables = tables.len(), "Read schema from SQLite store.");
        Ok(SchemaDescriptor::new(tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger() -> SqliteProvider {
        let provider = SqliteProvider::new(":memory:").await.unwrap();
        provider
            .initialize_with_data(
                "CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL);
                 INSERT INTO ledger (id, amount) VALUES (1, 10);",
            )
            .await
            .unwrap();
        provider
    }

    async fn count(provider: &SqliteProvider) -> Scalar {
        let output = provider
            .read_in_transaction("SELECT COUNT(*) AS n FROM ledger", 10)
            .await
            .unwrap();
        output.rows[0].get("n").cloned().unwrap()
    }

    #[tokio::test]
    async fn test_writes_inside_the_read_transaction_are_rolled_back() {
        let provider = ledger().await;

        provider
            .read_in_transaction("INSERT INTO ledger (id, amount) VALUES (2, 20)", 10)
            .await
            .unwrap();
        provider
            .read_in_transaction("DELETE FROM ledger", 10)
            .await
            .unwrap();

        assert_eq!(count(&provider).await, Scalar::Integer(1));
    }

    #[tokio::test]
    async fn test_failed_statement_leaves_no_open_transaction() {
        let provider = ledger().await;

        assert!(provider
            .read_in_transaction("SELECT missing FROM ledger", 10)
            .await
            .is_err());

        // A later write on a fresh connection commits normally.
        provider
            .initialize_with_data("INSERT INTO ledger (id, amount) VALUES (3, 30);")
            .await
            .unwrap();
        assert_eq!(count(&provider).await, Scalar::Integer(2));
    }
}
