//! SQLite connector

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cf_core::{ColumnMeta, ColumnType, Connector, Row, Value};
use parking_lot::Mutex;
use rusqlite::{types::ValueRef, Connection};

use crate::Result;

/// Connector backed by a single SQLite connection
pub struct SqliteConnector {
    path: Option<PathBuf>,
    name: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConnector {
    /// Open a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sqlite".to_string());
        tracing::info!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            path: Some(path),
            name,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            path: None,
            name: ":memory:".to_string(),
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run statements that return no rows, e.g. to seed a database
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    fn run(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = Row::with_capacity(names.len());
            for (idx, name) in names.iter().enumerate() {
                let value = match row.get_ref(idx)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(i) => Value::Int(i),
                    ValueRef::Real(f) => Value::Float(f),
                    ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
                    ValueRef::Blob(b) => Value::Text(format!("<{} bytes>", b.len())),
                };
                fields.insert(name.clone(), value);
            }
            out.push(fields);
        }
        Ok(out)
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn query(&self, sql: &str) -> anyhow::Result<Vec<Row>> {
        tracing::debug!(sql, "sqlite query");
        Ok(Self::run(&self.conn.lock(), sql)?)
    }

    async fn query_async(&self, sql: &str) -> anyhow::Result<Vec<Row>> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        tracing::debug!(sql = sql.as_str(), "sqlite query (async)");
        let rows = tokio::task::spawn_blocking(move || Self::run(&conn.lock(), &sql)).await??;
        Ok(rows)
    }

    fn columns(&self, table: &str) -> anyhow::Result<Vec<ColumnMeta>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let columns = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(columns
            .into_iter()
            .map(|(name, sql_type)| ColumnMeta::new(name, ColumnType::from_sql_type(&sql_type)))
            .collect())
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteConnector {
        let conn = SqliteConnector::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE flights (carrier TEXT, dep_delay REAL, dep_time TIMESTAMP);
             INSERT INTO flights VALUES ('AA', 5.0, '2008-01-01 10:00:00');
             INSERT INTO flights VALUES ('UA', NULL, '2008-01-01 11:00:00');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_columns_from_table_info() {
        let conn = seeded();
        let cols = conn.columns("flights").unwrap();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[1].column_type, ColumnType::Float);
        assert!(cols[2].column_type.is_temporal());
        assert!(conn.columns("missing").unwrap().is_empty());
    }

    #[test]
    fn test_rows_keep_projection_order() {
        let conn = seeded();
        let rows = conn
            .query("SELECT carrier AS key0, dep_delay AS val FROM flights ORDER BY key0")
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["key0", "val"]);
        assert_eq!(rows[1]["val"], Value::Null);
    }

    #[tokio::test]
    async fn test_async_query_runs_off_thread() {
        let conn = seeded();
        let rows = conn.query_async("SELECT COUNT(*) AS val FROM flights").await.unwrap();
        assert_eq!(rows[0]["val"], Value::Int(2));
    }

    #[test]
    fn test_bad_sql_is_an_error() {
        let conn = seeded();
        assert!(conn.query("SELEC nonsense").is_err());
    }
}
