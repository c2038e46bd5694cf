//! Dataset configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sql::SqlDialect;
use crate::Result;

/// Default bound on entries of every query cache
pub const DEFAULT_MAX_CACHE_SIZE: usize = 10;

/// Settings shared by a dataset and everything created from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossfilterConfig {
    /// Entries kept by each query cache; 0 disables caching
    pub max_cache_size: usize,
    pub dialect: SqlDialect,
}

impl Default for CrossfilterConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            dialect: SqlDialect::default(),
        }
    }
}

impl CrossfilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_cache_size(mut self, max_cache_size: usize) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
