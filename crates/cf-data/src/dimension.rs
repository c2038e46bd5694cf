//! Dimensions: grouping expressions that own a filter slot

use std::cmp::Ordering;
use std::sync::Arc;

use cf_core::Row;
use parking_lot::RwLock;

use crate::cache::QueryCache;
use crate::crossfilter::Crossfilter;
use crate::filter::{
    AppliedFilter, FilterItem, FilterKey, FilterOptions, FilterValue, RangeKey, SlotId,
};
use crate::group::Group;
use crate::group_all::GroupAll;
use crate::sql::{conjunction, quote, SelectStatement};
use crate::{CrossfilterError, Result};

/// Multiplier of the row sampling hash (Knuth's multiplicative constant)
const SAMPLING_MULTIPLIER: u64 = 2_654_435_761;
const SAMPLING_MODULUS: u64 = 4_294_967_296;

/// Ordering of dimension row queries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DimensionOrder {
    /// By the dimension's own expressions
    #[default]
    Natural,
    Custom(String),
    Unordered,
}

#[derive(Debug, Default)]
struct DimensionState {
    projection: Vec<String>,
    project_on_all: bool,
    sampling_ratio: Option<f64>,
    drill_down: bool,
    range_bounds: Option<Vec<(FilterValue, FilterValue)>>,
    order: DimensionOrder,
    applied: Option<AppliedFilter>,
    disposed: bool,
}

struct DimensionInner {
    crossfilter: Crossfilter,
    slot: SlotId,
    expressions: Vec<String>,
    state: RwLock<DimensionState>,
    cache: Arc<QueryCache>,
}

/// One or more grouping expressions with their own filter slot
#[derive(Clone)]
pub struct Dimension {
    inner: Arc<DimensionInner>,
}

impl std::fmt::Debug for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dimension")
            .field("slot", &self.inner.slot)
            .field("expressions", &self.inner.expressions)
            .finish()
    }
}

impl Dimension {
    pub(crate) fn new(crossfilter: Crossfilter, expressions: Vec<String>) -> Self {
        let slot = crossfilter.register_dimension(expressions.clone());
        let cache = crossfilter.new_cache();
        tracing::debug!(%slot, ?expressions, "created dimension");
        Self {
            inner: Arc::new(DimensionInner {
                crossfilter,
                slot,
                expressions,
                state: RwLock::new(DimensionState::default()),
                cache,
            }),
        }
    }

    pub fn expressions(&self) -> &[String] {
        &self.inner.expressions
    }

    pub fn slot(&self) -> SlotId {
        self.inner.slot
    }

    pub fn crossfilter(&self) -> &Crossfilter {
        &self.inner.crossfilter
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.inner.cache
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.read().disposed
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(CrossfilterError::Disposed)
        } else {
            Ok(())
        }
    }

    fn check_arity(&self, got: usize) -> Result<()> {
        let expected = self.inner.expressions.len();
        if got == expected {
            Ok(())
        } else {
            Err(CrossfilterError::ArityMismatch { expected, got })
        }
    }

    // ---- filter composition ----

    fn equality(&self, expr: &str, value: &FilterValue, negate: bool) -> String {
        let cf = &self.inner.crossfilter;
        if value.is_null() {
            return if negate {
                format!("{} IS NOT NULL", expr)
            } else {
                format!("{} IS NULL", expr)
            };
        }
        let literal = value.to_sql(cf.dialect());
        if cf.is_array_column(expr) {
            let test = cf.dialect().any_of(&literal, expr);
            if negate {
                format!("NOT ({})", test)
            } else {
                test
            }
        } else {
            format!("{} {} {}", expr, if negate { "<>" } else { "=" }, literal)
        }
    }

    fn compose_exact(&self, key: &FilterKey) -> Result<String> {
        self.check_arity(key.0.len())?;
        Ok(conjunction(
            self.inner
                .expressions
                .iter()
                .zip(&key.0)
                .map(|(expr, value)| self.equality(expr, value, false)),
        ))
    }

    fn compose_not_equals(&self, key: &FilterKey) -> Result<String> {
        self.check_arity(key.0.len())?;
        let tests: Vec<String> = self
            .inner
            .expressions
            .iter()
            .zip(&key.0)
            .map(|(expr, value)| self.equality(expr, value, true))
            .collect();
        Ok(match tests.len() {
            1 => tests.join(""),
            _ => format!("({})", tests.join(" OR ")),
        })
    }

    fn compose_range(&self, range: &RangeKey) -> Result<String> {
        self.check_arity(range.0.len())?;
        let dialect = self.inner.crossfilter.dialect();
        Ok(conjunction(self.inner.expressions.iter().zip(&range.0).map(
            |(expr, (lo, hi))| {
                format!(
                    "{} >= {} AND {} < {}",
                    expr,
                    lo.to_sql(dialect),
                    expr,
                    hi.to_sql(dialect)
                )
            },
        )))
    }

    fn compose_item(&self, item: &FilterItem) -> Result<String> {
        let test = match item {
            FilterItem::Exact(key) => self.compose_exact(key)?,
            FilterItem::Range(range) => self.compose_range(range)?,
        };
        Ok(if test.contains(" AND ") {
            format!("({})", test)
        } else {
            test
        })
    }

    fn apply(&self, test: String, options: FilterOptions, applied: AppliedFilter) {
        let cf = &self.inner.crossfilter;
        let test = if options.inverse {
            format!("NOT ({})", test)
        } else {
            test
        };
        let current = cf.filter_text(self.inner.slot);
        let text = if options.append && !current.is_empty() {
            format!("{} AND {}", current, test)
        } else {
            test
        };
        self.inner.state.write().applied = Some(applied);
        cf.write_filter(self.inner.slot, text);
    }

    // ---- filter operations ----

    /// Keep rows equal to `key`, one value per expression
    pub fn filter_exact(&self, key: impl Into<FilterKey>) -> Result<()> {
        self.filter_exact_with(key, FilterOptions::default())
    }

    pub fn filter_exact_with(&self, key: impl Into<FilterKey>, options: FilterOptions) -> Result<()> {
        self.ensure_live()?;
        let key = key.into();
        let test = self.compose_exact(&key)?;
        self.apply(test, options, AppliedFilter::Exact(key));
        Ok(())
    }

    /// Keep rows in `[lo, hi)` per expression. With `reset_range` the bounds
    /// become the range snapshot used by filter-bound groups.
    pub fn filter_range(&self, range: impl Into<RangeKey>, reset_range: bool) -> Result<()> {
        self.filter_range_with(range, reset_range, FilterOptions::default())
    }

    pub fn filter_range_with(
        &self,
        range: impl Into<RangeKey>,
        reset_range: bool,
        options: FilterOptions,
    ) -> Result<()> {
        self.ensure_live()?;
        let range = range.into();
        let test = self.compose_range(&range)?;
        if reset_range {
            self.inner.state.write().range_bounds = Some(range.0.clone());
        }
        self.apply(test, options, AppliedFilter::Range(range));
        Ok(())
    }

    /// Keep rows matching any item, or every item in drill-down mode. An
    /// empty list clears the filter.
    pub fn filter_multi(&self, items: Vec<FilterItem>, reset_range: bool) -> Result<()> {
        self.ensure_live()?;
        if items.is_empty() {
            return self.filter_all(!reset_range);
        }
        let tests = items
            .iter()
            .map(|item| self.compose_item(item))
            .collect::<Result<Vec<_>>>()?;
        let joiner = if self.is_drill_down() { " AND " } else { " OR " };
        let text = format!("({})", tests.join(joiner));

        if reset_range {
            self.inner.state.write().range_bounds =
                range_hull(&items, self.inner.expressions.len());
        }
        self.inner.state.write().applied = Some(AppliedFilter::Multi(items));
        self.inner.crossfilter.write_filter(self.inner.slot, text);
        Ok(())
    }

    /// Substring match on every expression
    pub fn filter_like(&self, substring: &str) -> Result<()> {
        self.ensure_live()?;
        let pattern = quote(&format!("%{}%", substring));
        let test = conjunction(
            self.inner
                .expressions
                .iter()
                .map(|expr| format!("{} LIKE {}", expr, pattern)),
        );
        self.apply(
            test,
            FilterOptions::default(),
            AppliedFilter::Like(substring.to_string()),
        );
        Ok(())
    }

    /// Case-insensitive substring match on every expression
    pub fn filter_ilike(&self, substring: &str) -> Result<()> {
        self.ensure_live()?;
        let dialect = self.inner.crossfilter.dialect();
        let pattern = quote(&format!("%{}%", substring));
        let test = conjunction(
            self.inner
                .expressions
                .iter()
                .map(|expr| dialect.ilike(expr, &pattern)),
        );
        self.apply(
            test,
            FilterOptions::default(),
            AppliedFilter::ILike(substring.to_string()),
        );
        Ok(())
    }

    pub fn filter_not_equals(&self, key: impl Into<FilterKey>) -> Result<()> {
        self.ensure_live()?;
        let key = key.into();
        let test = self.compose_not_equals(&key)?;
        self.apply(test, FilterOptions::default(), AppliedFilter::NotEquals(key));
        Ok(())
    }

    pub fn filter_is_null(&self) -> Result<()> {
        self.ensure_live()?;
        let test = conjunction(
            self.inner
                .expressions
                .iter()
                .map(|expr| format!("{} IS NULL", expr)),
        );
        self.apply(test, FilterOptions::default(), AppliedFilter::IsNull);
        Ok(())
    }

    pub fn filter_is_not_null(&self) -> Result<()> {
        self.ensure_live()?;
        let test = conjunction(
            self.inner
                .expressions
                .iter()
                .map(|expr| format!("{} IS NOT NULL", expr)),
        );
        self.apply(test, FilterOptions::default(), AppliedFilter::IsNotNull);
        Ok(())
    }

    /// Clear the filter. Unless `soft`, also forget the range snapshot.
    pub fn filter_all(&self, soft: bool) -> Result<()> {
        self.ensure_live()?;
        {
            let mut state = self.inner.state.write();
            state.applied = None;
            if !soft {
                state.range_bounds = None;
            }
        }
        self.inner
            .crossfilter
            .write_filter(self.inner.slot, String::new());
        Ok(())
    }

    /// Current filter text of this dimension's slot
    pub fn filter_string(&self) -> String {
        self.inner.crossfilter.filter_text(self.inner.slot)
    }

    /// Structured form of the current filter; `None` once the slot has been
    /// emptied, including by `Crossfilter::clear_all_filters`
    pub fn filter_value(&self) -> Option<AppliedFilter> {
        if self.filter_string().is_empty() {
            return None;
        }
        self.inner.state.read().applied.clone()
    }

    pub fn range_bounds(&self) -> Option<Vec<(FilterValue, FilterValue)>> {
        self.inner.state.read().range_bounds.clone()
    }

    // ---- configuration ----

    /// Columns returned by row queries
    pub fn project_on<I, S>(&self, columns: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.state.write().projection = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Project every dimension expression of the dataset instead
    pub fn project_on_all_dimensions(&self, enabled: bool) -> &Self {
        self.inner.state.write().project_on_all = enabled;
        self
    }

    /// Effective projection of row queries
    pub fn projection(&self) -> Vec<String> {
        let state = self.inner.state.read();
        if state.project_on_all {
            self.inner.crossfilter.dimension_expressions()
        } else {
            state.projection.clone()
        }
    }

    /// Sample a deterministic fraction of rows in row queries
    pub fn set_sampling_ratio(&self, ratio: Option<f64>) -> Result<()> {
        if let Some(r) = ratio {
            if !(r > 0.0 && r <= 1.0) {
                return Err(CrossfilterError::InvalidSamplingRatio(r));
            }
        }
        self.inner.state.write().sampling_ratio = ratio;
        Ok(())
    }

    pub fn sampling_ratio(&self) -> Option<f64> {
        self.inner.state.read().sampling_ratio
    }

    /// In drill-down mode self-selections combine with AND and the
    /// dimension's groups observe their own filter
    pub fn set_drill_down_filter(&self, enabled: bool) -> &Self {
        self.inner.state.write().drill_down = enabled;
        self
    }

    pub fn is_drill_down(&self) -> bool {
        self.inner.state.read().drill_down
    }

    pub fn order_by(&self, expression: impl Into<String>) -> &Self {
        self.inner.state.write().order = DimensionOrder::Custom(expression.into());
        self
    }

    pub fn order_natural(&self) -> &Self {
        self.inner.state.write().order = DimensionOrder::Natural;
        self
    }

    pub fn unordered(&self) -> &Self {
        self.inner.state.write().order = DimensionOrder::Unordered;
        self
    }

    pub fn order(&self) -> DimensionOrder {
        self.inner.state.read().order.clone()
    }

    // ---- row queries ----

    fn sampling_predicate(&self, ratio: f64) -> String {
        let cf = &self.inner.crossfilter;
        let rowid = match cf.from_clause().first() {
            Some(table) => format!("{}.rowid", table),
            None => "rowid".to_string(),
        };
        let threshold = (SAMPLING_MODULUS as f64 * ratio).floor() as u64;
        format!(
            "{} < {}",
            cf.dialect().modulo(
                &format!("{} * {}", rowid, SAMPLING_MULTIPLIER),
                &SAMPLING_MODULUS.to_string()
            ),
            threshold
        )
    }

    /// SQL of a row query, or `None` when nothing is projected
    pub fn row_query(&self, limit: usize, offset: usize, descending: bool) -> Option<String> {
        let projection = self.projection();
        if projection.is_empty() {
            return None;
        }
        let cf = &self.inner.crossfilter;
        let state = self.inner.state.read();

        let mut filters = cf.join_predicates();
        filters.extend(cf.active_filters(&[]));
        if let Some(ratio) = state.sampling_ratio.filter(|r| *r < 1.0) {
            filters.push(self.sampling_predicate(ratio));
        }

        let direction = if descending { " DESC" } else { "" };
        let order = match &state.order {
            DimensionOrder::Natural => self
                .inner
                .expressions
                .iter()
                .map(|e| format!("{}{}", e, direction))
                .collect(),
            DimensionOrder::Custom(expr) => vec![format!("{}{}", expr, direction)],
            DimensionOrder::Unordered => Vec::new(),
        };

        Some(
            SelectStatement::new(projection, cf.from_clause())
                .filter(filters)
                .order_by(order)
                .limit(Some(limit), Some(offset))
                .to_sql(),
        )
    }

    /// First `limit` rows in descending order, after `offset`
    pub fn top(&self, limit: usize, offset: usize) -> Result<Vec<Row>> {
        self.rows(limit, offset, true)
    }

    /// First `limit` rows in ascending order, after `offset`
    pub fn bottom(&self, limit: usize, offset: usize) -> Result<Vec<Row>> {
        self.rows(limit, offset, false)
    }

    pub async fn top_async(&self, limit: usize, offset: usize) -> Result<Vec<Row>> {
        self.rows_async(limit, offset, true).await
    }

    pub async fn bottom_async(&self, limit: usize, offset: usize) -> Result<Vec<Row>> {
        self.rows_async(limit, offset, false).await
    }

    fn rows(&self, limit: usize, offset: usize, descending: bool) -> Result<Vec<Row>> {
        self.ensure_live()?;
        match self.row_query(limit, offset, descending) {
            Some(sql) => self.inner.cache.query(&sql, &[]),
            None => Ok(Vec::new()),
        }
    }

    async fn rows_async(&self, limit: usize, offset: usize, descending: bool) -> Result<Vec<Row>> {
        self.ensure_live()?;
        match self.row_query(limit, offset, descending) {
            Some(sql) => self.inner.cache.query_async(&sql, &[]).await,
            None => Ok(Vec::new()),
        }
    }

    // ---- derived objects ----

    /// Aggregation keyed by this dimension's expressions
    pub fn group(&self) -> Group {
        Group::new(self.clone())
    }

    /// Ungrouped aggregate that ignores this dimension's own filter
    pub fn group_all(&self) -> GroupAll {
        GroupAll::new(self.inner.crossfilter.clone(), Some(self.clone()))
    }

    // ---- target slot ----

    /// Make this dimension the dataset's target, or stop being it.
    /// Returns whether it is the target afterwards.
    pub fn toggle_target(&self) -> bool {
        let cf = &self.inner.crossfilter;
        if self.is_targeting() {
            cf.set_target_filter(None);
            false
        } else {
            cf.set_target_filter(Some(self.inner.slot));
            true
        }
    }

    pub fn remove_target(&self) {
        if self.is_targeting() {
            self.inner.crossfilter.set_target_filter(None);
        }
    }

    pub fn is_targeting(&self) -> bool {
        self.inner.crossfilter.target_filter() == Some(self.inner.slot)
    }

    /// Clear and retire the filter slot and drop cached results. Further
    /// operations fail with [`CrossfilterError::Disposed`].
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.write();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.applied = None;
            state.range_bounds = None;
        }
        self.inner.crossfilter.retire_dimension(self.inner.slot);
        self.inner.cache.clear();
        tracing::debug!(slot = %self.inner.slot, "disposed dimension");
    }
}

/// Per-expression hull of the range items
fn range_hull(items: &[FilterItem], arity: usize) -> Option<Vec<(FilterValue, FilterValue)>> {
    let ranges: Vec<&RangeKey> = items
        .iter()
        .filter_map(|item| match item {
            FilterItem::Range(range) => Some(range),
            FilterItem::Exact(_) => None,
        })
        .collect();
    if ranges.is_empty() {
        return None;
    }
    (0..arity)
        .map(|i| {
            let mut bounds = ranges.iter().filter_map(|r| r.0.get(i));
            let (mut lo, mut hi) = bounds.next().cloned()?;
            for (l, h) in bounds {
                if l.compare(&lo) == Some(Ordering::Less) {
                    lo = l.clone();
                }
                if h.compare(&hi) == Some(Ordering::Greater) {
                    hi = h.clone();
                }
            }
            Some((lo, hi))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::flights_dataset;
    use cf_core::events::events::{FilterApplied, FilterCleared};
    use cf_core::{handler_from_fn, row, Value};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn counters(cf: &Crossfilter) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let applied = Arc::new(AtomicUsize::new(0));
        let cleared = Arc::new(AtomicUsize::new(0));
        let a = applied.clone();
        cf.events().subscribe::<FilterApplied>(handler_from_fn(move |_| {
            a.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        let c = cleared.clone();
        cf.events().subscribe::<FilterCleared>(handler_from_fn(move |_| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        (applied, cleared)
    }

    #[test]
    fn test_exact_filters() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["carrier"]);
        dim.filter_exact("AA").unwrap();
        assert_eq!(dim.filter_string(), "carrier = 'AA'");
        assert_eq!(dim.filter_value(), Some(AppliedFilter::Exact(FilterKey::from("AA"))));

        dim.filter_exact(FilterValue::Null).unwrap();
        assert_eq!(dim.filter_string(), "carrier IS NULL");

        let tags = cf.dimension(["tags"]);
        tags.filter_exact("late").unwrap();
        assert_eq!(tags.filter_string(), "'late' = ANY tags");
    }

    #[test]
    fn test_multi_expression_keys() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["carrier", "dest_state"]);
        dim.filter_exact(vec![FilterValue::from("AA"), FilterValue::from("CA")])
            .unwrap();
        assert_eq!(dim.filter_string(), "carrier = 'AA' AND dest_state = 'CA'");

        let err = dim.filter_exact("AA").unwrap_err();
        assert!(matches!(
            err,
            CrossfilterError::ArityMismatch { expected: 2, got: 1 }
        ));
        // a rejected filter leaves the slot alone
        assert_eq!(dim.filter_string(), "carrier = 'AA' AND dest_state = 'CA'");
    }

    #[test]
    fn test_range_filter_snapshots_bounds() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["dep_delay"]);
        dim.filter_range((0, 10), false).unwrap();
        assert_eq!(dim.filter_string(), "dep_delay >= 0 AND dep_delay < 10");
        assert_eq!(dim.range_bounds(), None);

        dim.filter_range((5, 15), true).unwrap();
        assert_eq!(
            dim.range_bounds(),
            Some(vec![(FilterValue::Int(5), FilterValue::Int(15))])
        );

        dim.filter_all(true).unwrap();
        assert!(dim.range_bounds().is_some());
        dim.filter_all(false).unwrap();
        assert!(dim.range_bounds().is_none());
    }

    #[test]
    fn test_multi_filter_joins_items() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["carrier"]);
        dim.filter_multi(vec![FilterItem::exact("AA"), FilterItem::exact("UA")], false)
            .unwrap();
        assert_eq!(dim.filter_string(), "(carrier = 'AA' OR carrier = 'UA')");

        dim.set_drill_down_filter(true);
        dim.filter_multi(vec![FilterItem::exact("AA"), FilterItem::exact("UA")], false)
            .unwrap();
        assert_eq!(dim.filter_string(), "(carrier = 'AA' AND carrier = 'UA')");
    }

    #[test]
    fn test_multi_ranges_hull() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["dep_delay"]);
        dim.filter_multi(
            vec![FilterItem::range((20, 30)), FilterItem::range((0, 10))],
            true,
        )
        .unwrap();
        assert_eq!(
            dim.filter_string(),
            "((dep_delay >= 20 AND dep_delay < 30) OR (dep_delay >= 0 AND dep_delay < 10))"
        );
        assert_eq!(
            dim.range_bounds(),
            Some(vec![(FilterValue::Int(0), FilterValue::Int(30))])
        );
    }

    #[test]
    fn test_filter_all_round_trip_restores_slot() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["carrier"]);
        let other = cf.dimension(["dest_state"]);
        other.filter_exact("CA").unwrap();

        dim.filter_all(false).unwrap();
        let before = (dim.filter_string(), cf.filter_string());
        dim.filter_exact("AA").unwrap();
        dim.filter_all(false).unwrap();
        assert_eq!((dim.filter_string(), cf.filter_string()), before);
        assert_eq!(dim.filter_value(), None);
    }

    #[test]
    fn test_multi_filter_notifications() {
        let (cf, _) = flights_dataset();
        let (applied, cleared) = counters(&cf);
        let dim = cf.dimension(["carrier"]);

        dim.filter_multi(vec![FilterItem::exact("AA")], false).unwrap();
        assert_eq!(applied.load(AtomicOrdering::SeqCst), 1);

        dim.filter_multi(vec![FilterItem::exact("UA")], false).unwrap();
        assert_eq!(applied.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cleared.load(AtomicOrdering::SeqCst), 0);

        dim.filter_multi(Vec::new(), false).unwrap();
        assert_eq!(cleared.load(AtomicOrdering::SeqCst), 1);

        dim.filter_multi(Vec::new(), false).unwrap();
        assert_eq!(applied.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cleared.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_append_and_inverse() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["dep_delay"]);
        dim.filter_range((0, 10), false).unwrap();
        dim.filter_exact_with(
            5,
            FilterOptions {
                append: true,
                inverse: true,
            },
        )
        .unwrap();
        assert_eq!(
            dim.filter_string(),
            "dep_delay >= 0 AND dep_delay < 10 AND NOT (dep_delay = 5)"
        );
    }

    #[test]
    fn test_pattern_and_null_filters() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["carrier"]);
        dim.filter_like("A'").unwrap();
        assert_eq!(dim.filter_string(), "carrier LIKE '%A''%'");
        dim.filter_ilike("aa").unwrap();
        assert_eq!(dim.filter_string(), "carrier ILIKE '%aa%'");
        dim.filter_not_equals("AA").unwrap();
        assert_eq!(dim.filter_string(), "carrier <> 'AA'");
        dim.filter_is_not_null().unwrap();
        assert_eq!(dim.filter_string(), "carrier IS NOT NULL");
    }

    #[test]
    fn test_row_query_observes_every_filter() {
        let (cf, conn) = flights_dataset();
        let carrier = cf.dimension(["carrier"]);
        let state = cf.dimension(["dest_state"]);
        state.filter_exact("CA").unwrap();
        carrier.filter_exact("AA").unwrap();
        carrier.project_on(["carrier", "dep_delay"]);
        conn.respond("LIMIT 5", vec![row([("carrier", "AA")])]);

        let rows = carrier.top(5, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            conn.last_query().unwrap(),
            "SELECT carrier, dep_delay FROM flights WHERE carrier = 'AA' AND dest_state = 'CA' ORDER BY carrier DESC LIMIT 5"
        );

        carrier.unordered();
        assert_eq!(
            carrier.row_query(5, 10, false).unwrap(),
            "SELECT carrier, dep_delay FROM flights WHERE carrier = 'AA' AND dest_state = 'CA' LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn test_row_query_without_projection_is_empty() {
        let (cf, conn) = flights_dataset();
        let dim = cf.dimension(["carrier"]);
        assert!(dim.top(10, 0).unwrap().is_empty());
        assert_eq!(conn.query_count(), 0);
    }

    #[test]
    fn test_project_on_all_dimensions() {
        let (cf, _) = flights_dataset();
        let a = cf.dimension(["carrier"]);
        let _b = cf.dimension(["dest_state", "carrier"]);
        a.project_on_all_dimensions(true);
        assert_eq!(a.projection(), vec!["carrier", "dest_state"]);
    }

    #[test]
    fn test_sampling() {
        let (cf, _) = flights_dataset();
        let dim = cf.dimension(["carrier"]);
        dim.project_on(["carrier"]).unordered();

        assert!(matches!(
            dim.set_sampling_ratio(Some(1.5)),
            Err(CrossfilterError::InvalidSamplingRatio(_))
        ));
        assert!(dim.set_sampling_ratio(Some(0.0)).is_err());

        dim.set_sampling_ratio(Some(1.0)).unwrap();
        assert_eq!(
            dim.row_query(10, 0, true).unwrap(),
            "SELECT carrier FROM flights LIMIT 10"
        );

        dim.set_sampling_ratio(Some(0.5)).unwrap();
        let sql = dim.row_query(10, 0, true).unwrap();
        assert_eq!(
            sql,
            "SELECT carrier FROM flights WHERE MOD(flights.rowid * 2654435761, 4294967296) < 2147483648 LIMIT 10"
        );
        assert_eq!(dim.row_query(10, 0, true).unwrap(), sql);
    }

    #[test]
    fn test_target_toggle() {
        let (cf, _) = flights_dataset();
        let a = cf.dimension(["carrier"]);
        let b = cf.dimension(["dest_state"]);
        assert!(a.toggle_target());
        assert!(a.is_targeting());
        assert!(b.toggle_target());
        assert!(!a.is_targeting());
        b.remove_target();
        assert_eq!(cf.target_filter(), None);
    }

    #[test]
    fn test_dispose_retires_slot() {
        let (cf, _) = flights_dataset();
        let (_, cleared) = counters(&cf);
        let dim = cf.dimension(["carrier"]);
        dim.filter_exact("AA").unwrap();
        dim.toggle_target();

        dim.dispose();
        dim.dispose();
        assert_eq!(cleared.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cf.filter_string(), "");
        assert_eq!(cf.target_filter(), None);
        assert!(matches!(dim.filter_exact("UA"), Err(CrossfilterError::Disposed)));
        assert!(matches!(dim.top(1, 0), Err(CrossfilterError::Disposed)));

        let next = cf.dimension(["carrier"]);
        assert_ne!(next.slot(), dim.slot());
    }

    #[tokio::test]
    async fn test_async_rows() {
        let (cf, conn) = flights_dataset();
        let dim = cf.dimension(["dep_delay"]);
        dim.project_on(["dep_delay"]);
        conn.set_default_rows(vec![row([("dep_delay", Value::Float(1.5))])]);

        let rows = dim.bottom_async(3, 0).await.unwrap();
        assert_eq!(rows[0]["dep_delay"], Value::Float(1.5));
        assert_eq!(
            conn.last_query().unwrap(),
            "SELECT dep_delay FROM flights ORDER BY dep_delay LIMIT 3"
        );
    }
}
