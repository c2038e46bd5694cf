//! In-process connector with canned responses
//!
//! Answers queries from a list of `(fragment, rows)` rules, the first rule
//! whose fragment occurs in the SQL text wins. Every executed statement is
//! recorded so callers can assert on the exact SQL that reached the
//! database.

use async_trait::async_trait;
use cf_core::{ColumnMeta, Connector, Row};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

pub struct ScriptedConnector {
    name: String,
    tables: RwLock<IndexMap<String, Vec<ColumnMeta>>>,
    rules: RwLock<Vec<(String, Vec<Row>)>>,
    default_rows: RwLock<Vec<Row>>,
    failure: RwLock<Option<String>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(IndexMap::new()),
            rules: RwLock::new(Vec::new()),
            default_rows: RwLock::new(Vec::new()),
            failure: RwLock::new(None),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Declare a table and its columns
    pub fn with_table(self, table: impl Into<String>, columns: Vec<ColumnMeta>) -> Self {
        self.tables.write().insert(table.into(), columns);
        self
    }

    /// Answer any query containing `fragment` with `rows`
    pub fn respond(&self, fragment: impl Into<String>, rows: Vec<Row>) {
        self.rules.write().push((fragment.into(), rows));
    }

    /// Rows for queries no rule matches
    pub fn set_default_rows(&self, rows: Vec<Row>) {
        *self.default_rows.write() = rows;
    }

    /// Make every following query fail with `message`, or succeed again
    pub fn fail_with(&self, message: Option<&str>) {
        *self.failure.write() = message.map(str::to_string);
    }

    /// Every statement executed so far, oldest first
    pub fn queries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn last_query(&self) -> Option<String> {
        self.log.lock().last().cloned()
    }

    pub fn query_count(&self) -> usize {
        self.log.lock().len()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn query(&self, sql: &str) -> anyhow::Result<Vec<Row>> {
        self.log.lock().push(sql.to_string());
        if let Some(message) = self.failure.read().as_ref() {
            anyhow::bail!("{}", message);
        }
        let rows = self
            .rules
            .read()
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone());
        Ok(rows.unwrap_or_else(|| self.default_rows.read().clone()))
    }

    async fn query_async(&self, sql: &str) -> anyhow::Result<Vec<Row>> {
        // Suspend once, like a real round trip would
        tokio::task::yield_now().await;
        self.query(sql)
    }

    fn columns(&self, table: &str) -> anyhow::Result<Vec<ColumnMeta>> {
        Ok(self.tables.read().get(table).cloned().unwrap_or_default())
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::{row, ColumnType, Value};

    #[test]
    fn test_first_matching_rule_wins() {
        let conn = ScriptedConnector::new("s")
            .with_table("flights", vec![ColumnMeta::new("carrier", ColumnType::Text)]);
        conn.respond("GROUP BY", vec![row([("key0", "AA")])]);
        conn.respond("FROM flights", vec![row([("val", Value::Int(3))])]);

        let grouped = conn.query("SELECT carrier AS key0 FROM flights GROUP BY key0").unwrap();
        assert_eq!(grouped[0]["key0"], Value::from("AA"));
        let counted = conn.query("SELECT COUNT(*) AS val FROM flights").unwrap();
        assert_eq!(counted[0]["val"], Value::Int(3));
        assert_eq!(conn.query_count(), 2);
        assert_eq!(conn.columns("flights").unwrap().len(), 1);
        assert!(conn.columns("nope").unwrap().is_empty());
    }
}
