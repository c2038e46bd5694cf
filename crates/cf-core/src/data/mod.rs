//! Data connector capability and column metadata

mod value;

pub use value::{row, Row, Value};

use serde::{Deserialize, Serialize};

/// Logical type of a column as reported by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Text,
    Date,
    Timestamp,
    Other,
}

impl ColumnType {
    /// Map a declared SQL type name onto a logical column type
    pub fn from_sql_type(sql_type: &str) -> Self {
        let upper = sql_type.to_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "TINYINT" => ColumnType::Integer,
            "REAL" | "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMERIC" => ColumnType::Float,
            "TEXT" | "VARCHAR" | "CHAR" | "STR" => ColumnType::Text,
            "DATE" => ColumnType::Date,
            "DATETIME" | "TIMESTAMP" | "TIME" => ColumnType::Timestamp,
            _ => ColumnType::Other,
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Timestamp)
    }
}

/// Metadata of one column of a dataset table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
    /// The column holds an array per row
    pub is_array: bool,
    /// The column is dictionary encoded
    pub is_dict: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_array: false,
            is_dict: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn dict(mut self) -> Self {
        self.is_dict = true;
        self
    }
}

/// Trait for the external connector that executes query text
///
/// The query engine never runs queries itself; every statement it builds is
/// handed to one of these two methods.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Execute a query and block until its rows are available
    fn query(&self, sql: &str) -> anyhow::Result<Vec<Row>>;

    /// Execute a query without blocking the caller
    async fn query_async(&self, sql: &str) -> anyhow::Result<Vec<Row>>;

    /// Column metadata of a table
    fn columns(&self, table: &str) -> anyhow::Result<Vec<ColumnMeta>>;

    /// Get the source name/path
    fn source_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(ColumnType::from_sql_type("varchar(32)"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql_type("BIGINT"), ColumnType::Integer);
        assert_eq!(ColumnType::from_sql_type("timestamp(0)"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_sql_type("geometry"), ColumnType::Other);
        assert!(ColumnType::Date.is_temporal());
    }
}
