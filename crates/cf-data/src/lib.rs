//! Cross-filtered SQL query building over a remote connector
//!
//! A [`Crossfilter`] wraps a set of tables behind a [`cf_core::Connector`].
//! Dimensions own a filter slot each; groups aggregate over everything the
//! other dimensions filter, optionally binned, and every query goes through
//! a per-object [`QueryCache`].

pub mod binning;
pub mod cache;
pub mod config;
pub mod crossfilter;
pub mod dimension;
pub mod export;
pub mod filter;
pub mod group;
pub mod group_all;
pub mod reduce;
pub mod sources;
pub mod sql;

use arrow::error::ArrowError;
use thiserror::Error;

// Re-exports
pub use binning::{BinBounds, BinParams, ResolvedBin, TimeUnit};
pub use cache::{CacheStats, PostProcess, QueryCache};
pub use config::CrossfilterConfig;
pub use crossfilter::Crossfilter;
pub use dimension::{Dimension, DimensionOrder};
pub use filter::{
    AppliedFilter, FilterItem, FilterKey, FilterOptions, FilterStore, FilterValue, RangeKey,
    SlotId,
};
pub use group::{Group, GroupSnapshot};
pub use group_all::GroupAll;
pub use reduce::{AggMode, ReduceSpec};
pub use sources::{ScriptedConnector, SqliteConnector};
pub use sql::SqlDialect;

/// Errors that can occur while building or running cross-filter queries
#[derive(Error, Debug)]
pub enum CrossfilterError {
    #[error("connector error: {0:#}")]
    Connector(anyhow::Error),

    #[error("sampling ratio must be in (0, 1], got {0}")]
    InvalidSamplingRatio(f64),

    #[error("expected bin parameters for {expected} expressions, got {got}")]
    BinParamsMismatch { expected: usize, got: usize },

    #[error("expected {expected} values, one per dimension expression, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("object has been disposed")]
    Disposed,

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CrossfilterError>;

#[cfg(test)]
pub(crate) mod test_support;
