//! Table schemas read from the DuckDB information schema

use duckdb::Connection;
use pipeql_ir::{Catalog, ColumnInfo, SchemaProvider, TableSchema};
use tracing::debug;

use crate::{DuckExecutor, ExecutionError};

const COLUMNS_QUERY: &str = "SELECT column_name, data_type, is_nullable \
     FROM information_schema.columns \
     WHERE table_schema = 'main' AND table_name = ? \
     ORDER BY ordinal_position";

fn table_columns(conn: &Connection, table_name: &str) -> Result<Vec<ColumnInfo>, ExecutionError> {
    let mut stmt = conn.prepare(COLUMNS_QUERY)?;
    let columns = stmt
        .query_map([table_name], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                data_type: row.get(1)?,
                nullable: row.get::<_, String>(2)? == "YES",
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Snapshot every table and view of the `main` schema into a [`Catalog`]
pub fn discover_catalog(conn: &Connection) -> Result<Catalog, ExecutionError> {
    let mut stmt =
        conn.prepare("SELECT table_name FROM information_schema.tables WHERE table_schema = 'main' ORDER BY table_name")?;
    let table_names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut catalog = Catalog::new();
    for name in table_names {
        let columns = table_columns(conn, &name)?;
        debug!(table = %name, columns = columns.len(), "discovered table");
        catalog.add_table(TableSchema { name, columns });
    }
    Ok(catalog)
}

/// Live lookup, for connections whose tables change between translations
impl SchemaProvider for DuckExecutor {
    fn get_table_schema(&self, table_name: &str) -> Result<TableSchema, String> {
        let columns = table_columns(self.connection(), table_name).map_err(|e| e.to_string())?;
        if columns.is_empty() {
            return Err(format!("Table '{}' not found in database", table_name));
        }
        Ok(TableSchema {
            name: table_name.to_string(),
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_lists_main_tables() {
        let executor = DuckExecutor::open_in_memory().unwrap();
        executor
            .connection()
            .execute_batch(
                "CREATE TABLE sales (A INTEGER NOT NULL, code VARCHAR);
                 CREATE VIEW codes AS SELECT DISTINCT code FROM sales;",
            )
            .unwrap();

        let catalog = discover_catalog(executor.connection()).unwrap();
        assert_eq!(catalog.table_names(), vec!["codes", "sales"]);

        let sales = catalog.get_table_schema("sales").unwrap();
        assert_eq!(sales.columns[0], ColumnInfo {
            name: "A".to_string(),
            data_type: "INTEGER".to_string(),
            nullable: false,
        });
        assert_eq!(sales.columns[1].data_type, "VARCHAR");
    }

    #[test]
    fn test_live_lookup() {
        let executor = DuckExecutor::open_in_memory().unwrap();
        executor.connection().execute_batch("CREATE TABLE t (id BIGINT)").unwrap();
        assert_eq!(executor.get_table_schema("t").unwrap().columns[0].data_type, "BIGINT");
        assert!(executor.get_table_schema("missing").is_err());
    }
}
