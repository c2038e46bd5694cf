//! Dashboard description: charts over one table plus a scripted session

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cf_data::{CrossfilterConfig, ReduceSpec, SqlDialect};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// SQLite file; created with sample data when missing
    pub database: PathBuf,
    pub table: String,
    #[serde(default = "sqlite_config")]
    pub crossfilter: CrossfilterConfig,
    pub charts: Vec<ChartConfig>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

fn sqlite_config() -> CrossfilterConfig {
    CrossfilterConfig::default().with_dialect(SqlDialect::Sqlite)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    pub name: String,
    pub dimension: Vec<String>,
    #[serde(flatten)]
    pub kind: ChartKind,
    /// Measures; a count when absent
    #[serde(default)]
    pub reduce: Vec<ReduceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartKind {
    /// Top groups by the first measure
    Bar { limit: usize },
    Histogram { lo: f64, hi: f64, bins: u32 },
    Timeline {
        lo: DateTime<Utc>,
        hi: DateTime<Utc>,
        bins: u32,
    },
    /// Raw rows
    Table { columns: Vec<String>, limit: usize },
    /// "n of m" counter over the whole dataset
    Count,
}

/// One step of the scripted session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Interaction {
    Select {
        chart: String,
        values: Vec<serde_json::Value>,
    },
    Brush {
        chart: String,
        lo: serde_json::Value,
        hi: serde_json::Value,
    },
    Clear { chart: String },
    ClearAll,
}

impl DashboardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading dashboard {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing dashboard {}", path.display()))
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        serde_json::from_str(DEFAULT_DASHBOARD).unwrap_or_else(|_| Self {
            database: PathBuf::from("data/flights.db"),
            table: "flights".to_string(),
            crossfilter: sqlite_config(),
            charts: Vec::new(),
            interactions: Vec::new(),
        })
    }
}

const DEFAULT_DASHBOARD: &str = r#"{
  "database": "data/flights.db",
  "table": "flights",
  "charts": [
    { "name": "count", "dimension": ["carrier"], "kind": "count" },
    { "name": "by state", "dimension": ["dest_state"], "kind": "bar", "limit": 5 },
    {
      "name": "carriers",
      "dimension": ["carrier"],
      "kind": "bar",
      "limit": 6,
      "reduce": [
        { "expression": "*", "agg": "count", "name": "flights" },
        { "expression": "dep_delay", "agg": "avg", "name": "avg_delay" }
      ]
    },
    { "name": "delays", "dimension": ["dep_delay"], "kind": "histogram", "lo": -10.0, "hi": 180.0, "bins": 19 },
    {
      "name": "departures",
      "dimension": ["dep_time"],
      "kind": "timeline",
      "lo": "2008-01-01T00:00:00Z",
      "hi": "2008-01-25T07:00:00Z",
      "bins": 30
    },
    { "name": "latest", "dimension": ["dep_time"], "kind": "table", "columns": ["dep_time", "carrier", "dest_state", "dep_delay"], "limit": 5 }
  ],
  "interactions": [
    { "action": "select", "chart": "by state", "values": ["CA"] },
    { "action": "brush", "chart": "delays", "lo": 30, "hi": 120 },
    { "action": "select", "chart": "carriers", "values": ["AA"] },
    { "action": "clear", "chart": "delays" },
    { "action": "clear_all" }
  ]
}"#;
