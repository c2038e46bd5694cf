//! SQL text rendering
//!
//! Query text doubles as the cache key, so rendering is deterministic: the
//! same logical request always yields byte-identical SQL.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL flavour of the remote database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// GPU analytical database dialect (timestamp literals, `ILIKE`, `ANY`)
    #[default]
    OmniSci,
    Sqlite,
}

impl SqlDialect {
    /// Zoned timestamp literal
    pub fn timestamp_literal(&self, t: &DateTime<Utc>) -> String {
        let text = t.format("%Y-%m-%d %H:%M:%S");
        match self {
            SqlDialect::OmniSci => format!("TIMESTAMP(0) '{}'", text),
            SqlDialect::Sqlite => format!("'{}'", text),
        }
    }

    pub fn boolean(&self, b: bool) -> &'static str {
        match (self, b) {
            (SqlDialect::OmniSci, true) => "true",
            (SqlDialect::OmniSci, false) => "false",
            (SqlDialect::Sqlite, true) => "1",
            (SqlDialect::Sqlite, false) => "0",
        }
    }

    /// Seconds since the Unix epoch of a temporal expression
    pub fn epoch(&self, expr: &str) -> String {
        match self {
            SqlDialect::OmniSci => format!("EXTRACT(EPOCH FROM {})", expr),
            SqlDialect::Sqlite => format!("CAST(strftime('%s', {}) AS INTEGER)", expr),
        }
    }

    pub fn floor(&self, expr: &str) -> String {
        match self {
            SqlDialect::OmniSci => format!("FLOOR({})", expr),
            // CAST truncates toward zero; step down for negative fractions
            SqlDialect::Sqlite => format!(
                "(CAST(({e}) AS INTEGER) - (({e}) < CAST(({e}) AS INTEGER)))",
                e = expr
            ),
        }
    }

    pub fn modulo(&self, lhs: &str, rhs: &str) -> String {
        match self {
            SqlDialect::OmniSci => format!("MOD({}, {})", lhs, rhs),
            SqlDialect::Sqlite => format!("(({}) % {})", lhs, rhs),
        }
    }

    /// Case-insensitive pattern match
    pub fn ilike(&self, expr: &str, pattern: &str) -> String {
        match self {
            SqlDialect::OmniSci => format!("{} ILIKE {}", expr, pattern),
            // LIKE is already case-insensitive for ASCII in SQLite
            SqlDialect::Sqlite => format!("{} LIKE {}", expr, pattern),
        }
    }

    /// Membership test against an array-typed column
    pub fn any_of(&self, literal: &str, expr: &str) -> String {
        format!("{} = ANY {}", literal, expr)
    }
}

/// Quote a string literal, doubling embedded single quotes
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Join predicates with `AND`, skipping empty ones
pub fn conjunction<I, S>(predicates: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    predicates
        .into_iter()
        .filter(|p| !p.as_ref().is_empty())
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// One `SELECT` statement, rendered on a single line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectStatement {
    pub projection: Vec<String>,
    pub from: Vec<String>,
    pub filters: Vec<String>,
    pub group_by: Vec<String>,
    pub having: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SelectStatement {
    pub fn new(projection: Vec<String>, from: Vec<String>) -> Self {
        Self {
            projection,
            from,
            ..Default::default()
        }
    }

    pub fn filter(mut self, predicates: impl IntoIterator<Item = String>) -> Self {
        self.filters
            .extend(predicates.into_iter().filter(|p| !p.is_empty()));
        self
    }

    pub fn group_by(mut self, keys: Vec<String>) -> Self {
        self.group_by = keys;
        self
    }

    pub fn having(mut self, predicates: impl IntoIterator<Item = String>) -> Self {
        self.having
            .extend(predicates.into_iter().filter(|p| !p.is_empty()));
        self
    }

    pub fn order_by(mut self, order: Vec<String>) -> Self {
        self.order_by = order;
        self
    }

    pub fn limit(mut self, limit: Option<usize>, offset: Option<usize>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {} FROM {}", self.projection.join(", "), self.from.join(", "))?;
        if !self.filters.is_empty() {
            write!(f, " WHERE {}", self.filters.join(" AND "))?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", self.group_by.join(", "))?;
        }
        if !self.having.is_empty() {
            write!(f, " HAVING {}", self.having.join(" AND "))?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", self.order_by.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}
