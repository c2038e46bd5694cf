//! Typed filter values and the shapes a dimension filter can take

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use cf_core::Value;

use crate::sql::{quote, SqlDialect};

/// A single value a widget filters on
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    /// Render as a SQL literal. Values that have no sensible literal form
    /// (non-finite floats) degrade to a quoted string instead of failing.
    pub fn to_sql(&self, dialect: SqlDialect) -> String {
        match self {
            FilterValue::Null => "NULL".to_string(),
            FilterValue::Bool(b) => dialect.boolean(*b).to_string(),
            FilterValue::Int(i) => i.to_string(),
            FilterValue::Float(f) if f.is_finite() => f.to_string(),
            FilterValue::Float(f) => quote(&f.to_string()),
            FilterValue::Text(s) => quote(s),
            FilterValue::Timestamp(t) => dialect.timestamp_literal(t),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Int(i) => Some(*i as f64),
            FilterValue::Float(f) if f.is_finite() => Some(*f),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FilterValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Order two values of compatible kinds
    pub fn compare(&self, other: &FilterValue) -> Option<Ordering> {
        match (self, other) {
            (FilterValue::Timestamp(a), FilterValue::Timestamp(b)) => Some(a.cmp(b)),
            (FilterValue::Text(a), FilterValue::Text(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(v as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        FilterValue::Timestamp(v)
    }
}

/// Values handed back by a widget, usually a key it received in a row
impl From<Value> for FilterValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => FilterValue::Null,
            Value::Bool(b) => FilterValue::Bool(b),
            Value::Int(i) => FilterValue::Int(i),
            Value::Float(f) => FilterValue::Float(f),
            Value::Text(s) => FilterValue::Text(s),
            Value::Timestamp(t) => FilterValue::Timestamp(t),
            other => FilterValue::Text(other.to_string()),
        }
    }
}

/// Loosely typed input, e.g. from a dashboard description. Arrays and
/// objects are coerced to their JSON text.
impl From<serde_json::Value> for FilterValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => FilterValue::Null,
            serde_json::Value::Bool(b) => FilterValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FilterValue::Int(i),
                None => n
                    .as_f64()
                    .map(FilterValue::Float)
                    .unwrap_or_else(|| FilterValue::Text(n.to_string())),
            },
            serde_json::Value::String(s) => FilterValue::Text(s),
            other => FilterValue::Text(other.to_string()),
        }
    }
}

/// One value per grouping expression of a dimension
#[derive(Debug, Clone, PartialEq)]
pub struct FilterKey(pub Vec<FilterValue>);

macro_rules! impl_key_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FilterKey {
                fn from(v: $t) -> Self {
                    FilterKey(vec![v.into()])
                }
            }
        )*
    }
}

impl_key_from!(i64, i32, f64, bool, &str, String, DateTime<Utc>, Value, FilterValue);

impl From<Vec<FilterValue>> for FilterKey {
    fn from(values: Vec<FilterValue>) -> Self {
        FilterKey(values)
    }
}

/// One `[lo, hi)` range per grouping expression of a dimension
#[derive(Debug, Clone, PartialEq)]
pub struct RangeKey(pub Vec<(FilterValue, FilterValue)>);

impl<A: Into<FilterValue>, B: Into<FilterValue>> From<(A, B)> for RangeKey {
    fn from((lo, hi): (A, B)) -> Self {
        RangeKey(vec![(lo.into(), hi.into())])
    }
}

impl From<Vec<(FilterValue, FilterValue)>> for RangeKey {
    fn from(ranges: Vec<(FilterValue, FilterValue)>) -> Self {
        RangeKey(ranges)
    }
}

/// One selection of a multi-valued filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterItem {
    Exact(FilterKey),
    Range(RangeKey),
}

impl FilterItem {
    pub fn exact(key: impl Into<FilterKey>) -> Self {
        FilterItem::Exact(key.into())
    }

    pub fn range(range: impl Into<RangeKey>) -> Self {
        FilterItem::Range(range.into())
    }
}

/// Modifiers for single-valued filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// AND the new test onto the current filter instead of replacing it
    pub append: bool,
    /// Negate the new test
    pub inverse: bool,
}

/// The structured filter a dimension currently applies
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedFilter {
    Exact(FilterKey),
    NotEquals(FilterKey),
    Range(RangeKey),
    Multi(Vec<FilterItem>),
    Like(String),
    ILike(String),
    IsNull,
    IsNotNull,
}
