//! Bin-parameter calculation
//!
//! Turns a domain and a bin count into a SQL bucket expression, plus the
//! inverse mapping from a bucket index back to a domain value.

use chrono::{DateTime, TimeZone, Utc};
use cf_core::Value;
use serde::{Deserialize, Serialize};

use crate::filter::FilterValue;
use crate::sql::SqlDialect;

/// Significant digits kept in the numeric bin scale factor
const SCALE_DIGITS: i32 = 9;

/// Calendar-ish bucket widths, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 7] = [
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
        TimeUnit::Week,
        TimeUnit::Month,
        TimeUnit::Year,
    ];

    /// Width in seconds. Months are 30 days and years 365.
    pub fn seconds(&self) -> i64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 3_600,
            TimeUnit::Day => 86_400,
            TimeUnit::Week => 604_800,
            TimeUnit::Month => 2_592_000,
            TimeUnit::Year => 31_536_000,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Domain of one binned expression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BinBounds {
    Numeric { lo: f64, hi: f64 },
    Time { lo: DateTime<Utc>, hi: DateTime<Utc> },
}

impl BinBounds {
    /// Bounds from a filter range, when both ends have a binnable kind
    pub fn from_range(lo: &FilterValue, hi: &FilterValue) -> Option<Self> {
        match (lo.as_timestamp(), hi.as_timestamp()) {
            (Some(lo), Some(hi)) => Some(BinBounds::Time { lo, hi }),
            _ => Some(BinBounds::Numeric {
                lo: lo.as_f64()?,
                hi: hi.as_f64()?,
            }),
        }
    }
}

/// Requested binning of one grouping expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinParams {
    pub bounds: BinBounds,
    pub num_bins: u32,
    /// Explicit unit for time bounds; picked from the range when absent
    #[serde(default)]
    pub time_bin: Option<TimeUnit>,
}

impl BinParams {
    pub fn numeric(lo: f64, hi: f64, num_bins: u32) -> Self {
        Self {
            bounds: BinBounds::Numeric { lo, hi },
            num_bins,
            time_bin: None,
        }
    }

    pub fn time(lo: DateTime<Utc>, hi: DateTime<Utc>, num_bins: u32) -> Self {
        Self {
            bounds: BinBounds::Time { lo, hi },
            num_bins,
            time_bin: None,
        }
    }

    pub fn with_time_bin(mut self, unit: TimeUnit) -> Self {
        self.time_bin = Some(unit);
        self
    }

    /// Resolve against the stored bounds, or against `bounds` when the
    /// group is bound by its dimension's filter range
    pub fn resolve(&self, bounds: Option<BinBounds>) -> ResolvedBin {
        match bounds.unwrap_or(self.bounds) {
            BinBounds::Numeric { lo, hi } => numeric_bins(lo, hi, self.num_bins),
            BinBounds::Time { lo, hi } => time_bins(lo, hi, self.num_bins, self.time_bin),
        }
    }
}

/// Concrete bucketing of one expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedBin {
    Numeric {
        lo: f64,
        hi: f64,
        num_bins: u32,
        bins_per_unit: f64,
    },
    Time {
        unit: TimeUnit,
        /// Epoch seconds of bucket 0
        offset: i64,
        lo: i64,
        hi: i64,
        num_bins: u32,
    },
}

/// Keep the first `digits` significant digits of `x`, truncating
fn truncate_significant(x: f64, digits: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let scale = 10f64.powi(digits - 1 - magnitude);
    (x * scale).trunc() / scale
}

pub fn numeric_bins(lo: f64, hi: f64, num_bins: u32) -> ResolvedBin {
    let width = hi - lo;
    if !(width > 0.0) || !width.is_finite() {
        return ResolvedBin::Numeric {
            lo,
            hi: lo,
            num_bins: 1,
            bins_per_unit: 0.0,
        };
    }
    let num_bins = num_bins.max(1);
    ResolvedBin::Numeric {
        lo,
        hi,
        num_bins,
        bins_per_unit: truncate_significant(num_bins as f64 / width, SCALE_DIGITS),
    }
}

/// Finest unit whose bucket count stays under `max_bins`. A unit that
/// would leave fewer than two buckets yields to the next finer one, which
/// may then exceed `max_bins` (36 hours at 24 bins gives 36 hourly buckets).
pub fn auto_time_unit(range_seconds: f64, max_bins: u32) -> TimeUnit {
    let max = max_bins.max(1) as f64;
    let mut finer = None;
    for unit in TimeUnit::ALL {
        let count = range_seconds / unit.seconds() as f64;
        if count < max {
            return match finer {
                Some(finer) if count < 2.0 => finer,
                _ => unit,
            };
        }
        finer = Some(unit);
    }
    TimeUnit::Year
}

pub fn time_bins(
    lo: DateTime<Utc>,
    hi: DateTime<Utc>,
    max_bins: u32,
    unit: Option<TimeUnit>,
) -> ResolvedBin {
    let lo_s = lo.timestamp();
    let hi_s = hi.timestamp().max(lo_s);
    let unit = unit.unwrap_or_else(|| auto_time_unit((hi_s - lo_s) as f64, max_bins));
    let width = unit.seconds();
    let offset = lo_s - lo_s.rem_euclid(width);
    let span = hi_s - offset;
    let num_bins = ((span + width - 1) / width).max(1);
    ResolvedBin::Time {
        unit,
        offset,
        lo: lo_s,
        hi: hi_s,
        num_bins: u32::try_from(num_bins).unwrap_or(u32::MAX),
    }
}

fn minus(expr: &str, v: f64) -> String {
    if v < 0.0 {
        format!("{} + {}", expr, -v)
    } else {
        format!("{} - {}", expr, v)
    }
}

impl ResolvedBin {
    pub fn num_bins(&self) -> u32 {
        match self {
            ResolvedBin::Numeric { num_bins, .. } | ResolvedBin::Time { num_bins, .. } => {
                *num_bins
            }
        }
    }

    pub fn time_unit(&self) -> Option<TimeUnit> {
        match self {
            ResolvedBin::Time { unit, .. } => Some(*unit),
            ResolvedBin::Numeric { .. } => None,
        }
    }

    /// SQL computing the integer bucket index of `expr`. The domain is
    /// closed, so `hi` itself lands in the last bucket.
    pub fn bucket_expression(&self, expr: &str, dialect: SqlDialect) -> String {
        let last = self.num_bins() - 1;
        match self {
            ResolvedBin::Numeric {
                lo,
                hi,
                bins_per_unit,
                ..
            } => format!(
                "CASE WHEN {} >= {} THEN {} ELSE {} END",
                expr,
                hi,
                last,
                dialect.floor(&format!("({}) * {}", minus(expr, *lo), bins_per_unit))
            ),
            ResolvedBin::Time {
                unit, offset, hi, ..
            } => {
                let epoch = dialect.epoch(expr);
                format!(
                    "CASE WHEN {} >= {} THEN {} ELSE {} END",
                    epoch,
                    hi,
                    last,
                    dialect.floor(&format!("({} - {}) / {}", epoch, offset, unit.seconds()))
                )
            }
        }
    }

    /// Restrict rows to the binned domain
    pub fn domain_filter(&self, expr: &str, dialect: SqlDialect) -> String {
        match self {
            ResolvedBin::Numeric { lo, hi, .. } => {
                format!("{} >= {} AND {} <= {}", expr, lo, expr, hi)
            }
            ResolvedBin::Time { lo, hi, .. } => {
                let ts = |s: i64| {
                    Utc.timestamp_opt(s, 0)
                        .single()
                        .map(|t| dialect.timestamp_literal(&t))
                        .unwrap_or_else(|| s.to_string())
                };
                format!("{} >= {} AND {} <= {}", expr, ts(*lo), expr, ts(*hi))
            }
        }
    }

    /// Bucket index of a numeric value, as the database would compute it
    pub fn bucket_of(&self, value: f64) -> i64 {
        let last = self.num_bins() as i64 - 1;
        match self {
            ResolvedBin::Numeric { hi, .. } if value >= *hi => last,
            ResolvedBin::Numeric {
                lo, bins_per_unit, ..
            } => ((value - lo) * bins_per_unit).floor() as i64,
            ResolvedBin::Time { hi, .. } if value >= *hi as f64 => last,
            ResolvedBin::Time { unit, offset, .. } => {
                ((value - *offset as f64) / unit.seconds() as f64).floor() as i64
            }
        }
    }

    /// Domain value of a bucket: the centre for numeric bins, the start
    /// for time bins
    pub fn unbin(&self, index: i64) -> Value {
        match self {
            ResolvedBin::Numeric {
                lo, hi, num_bins, ..
            } => {
                if hi <= lo {
                    return Value::Float(*lo);
                }
                let step = (hi - lo) / *num_bins as f64;
                Value::Float(lo + (index as f64 + 0.5) * step)
            }
            ResolvedBin::Time { unit, offset, .. } => index
                .checked_mul(unit.seconds())
                .and_then(|delta| offset.checked_add(delta))
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(Value::Timestamp)
                .unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_scale() {
        let bin = numeric_bins(0.0, 100.0, 10);
        match bin {
            ResolvedBin::Numeric { bins_per_unit, .. } => assert_eq!(bins_per_unit, 0.1),
            _ => panic!("expected numeric bins"),
        }
        assert_eq!(
            bin.bucket_expression("dep_delay", SqlDialect::OmniSci),
            "CASE WHEN dep_delay >= 100 THEN 9 ELSE FLOOR((dep_delay - 0) * 0.1) END"
        );
    }

    #[test]
    fn test_domain_maximum_lands_in_last_bucket() {
        let bin = numeric_bins(-10.0, 100.0, 11);
        assert_eq!(
            bin.domain_filter("dep_delay", SqlDialect::OmniSci),
            "dep_delay >= -10 AND dep_delay <= 100"
        );
        assert_eq!(bin.bucket_of(-10.0), 0);
        assert_eq!(bin.bucket_of(99.9), 10);
        assert_eq!(bin.bucket_of(100.0), 10);
        assert!(bin
            .bucket_expression("dep_delay", SqlDialect::Sqlite)
            .starts_with("CASE WHEN dep_delay >= 100 THEN 10 ELSE "));
    }

    #[test]
    fn test_scale_is_truncated_to_nine_digits() {
        assert_eq!(truncate_significant(1.0 / 3.0, 9), 0.333333333);
        assert_eq!(truncate_significant(2.0 / 3.0, 9), 0.666666666);
    }

    #[test]
    fn test_unbin_lands_in_bucket() {
        let bin = numeric_bins(0.0, 100.0, 10);
        let centre = bin.unbin(5).as_f64().unwrap();
        assert!((50.0..60.0).contains(&centre));
        assert_eq!(bin.bucket_of(centre), 5);
        for i in 0..10 {
            let v = bin.unbin(i).as_f64().unwrap();
            assert_eq!(bin.bucket_of(v), i);
        }
    }

    #[test]
    fn test_degenerate_domain() {
        let bin = numeric_bins(7.0, 7.0, 20);
        assert_eq!(bin.num_bins(), 1);
        assert_eq!(bin.unbin(0), Value::Float(7.0));
        assert_eq!(bin.bucket_of(7.0), 0);
    }

    #[test]
    fn test_auto_unit_for_a_day_and_change() {
        let lo = Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap();
        let hi = Utc.with_ymd_and_hms(2008, 1, 2, 1, 0, 0).unwrap();
        let bin = time_bins(lo, hi, 24, None);
        assert_eq!(bin.time_unit(), Some(TimeUnit::Hour));
        assert_eq!(bin.num_bins(), 25);
    }

    #[test]
    fn test_finer_unit_may_exceed_max_bins() {
        let lo = Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap();
        let hi = Utc.with_ymd_and_hms(2008, 1, 2, 12, 0, 0).unwrap();
        let bin = time_bins(lo, hi, 24, None);
        assert_eq!(bin.time_unit(), Some(TimeUnit::Hour));
        assert_eq!(bin.num_bins(), 36);
    }

    #[test]
    fn test_auto_unit_coarsens_long_ranges() {
        assert_eq!(auto_time_unit(10.0, 24), TimeUnit::Second);
        assert_eq!(auto_time_unit(3.0 * 86_400.0, 24), TimeUnit::Day);
        assert_eq!(auto_time_unit(2.0 * 31_536_000.0, 48), TimeUnit::Month);
        assert_eq!(auto_time_unit(1e12, 24), TimeUnit::Year);
    }

    #[test]
    fn test_time_bucket_expression() {
        let lo = Utc.with_ymd_and_hms(2016, 1, 1, 0, 30, 0).unwrap();
        let hi = Utc.with_ymd_and_hms(2016, 1, 1, 12, 0, 0).unwrap();
        let bin = time_bins(lo, hi, 100, Some(TimeUnit::Hour));
        assert_eq!(
            bin.bucket_expression("dep_time", SqlDialect::OmniSci),
            "CASE WHEN EXTRACT(EPOCH FROM dep_time) >= 1451649600 THEN 11 \
             ELSE FLOOR((EXTRACT(EPOCH FROM dep_time) - 1451606400) / 3600) END"
        );
        assert_eq!(
            bin.unbin(2),
            Value::Timestamp(Utc.with_ymd_and_hms(2016, 1, 1, 2, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_bounds_from_range() {
        let bounds = BinBounds::from_range(&FilterValue::Int(10), &FilterValue::Float(20.5));
        assert_eq!(bounds, Some(BinBounds::Numeric { lo: 10.0, hi: 20.5 }));
        assert_eq!(
            BinBounds::from_range(&FilterValue::from("a"), &FilterValue::from("b")),
            None
        );
    }
}
