//! Groups: aggregations keyed by a dimension's expressions
//!
//! Every query starts from a [`GroupSnapshot`] taken when the call is made.
//! The async queries build the snapshot before returning their future, so
//! filter changes made while a request is in flight never leak into it.

use std::future::Future;
use std::sync::Arc;

use cf_core::{Row, Value};
use parking_lot::RwLock;

use crate::binning::{BinBounds, BinParams, ResolvedBin, TimeUnit};
use crate::cache::{PostProcess, QueryCache};
use crate::dimension::Dimension;
use crate::reduce::{self, AggMode, ReduceSpec};
use crate::sql::SelectStatement;
use crate::{CrossfilterError, Result};

#[derive(Debug, Clone)]
struct GroupState {
    reduction: Vec<ReduceSpec>,
    /// Set by `reduce`, enables target substitution
    multi: bool,
    bin_params: Option<Vec<Option<BinParams>>>,
    bound_by_filter: bool,
    having: Option<String>,
    order: Option<String>,
    target_slot: usize,
    eliminate_null: bool,
    actual_time_bins: Vec<Option<TimeUnit>>,
}

impl Default for GroupState {
    fn default() -> Self {
        Self {
            reduction: vec![ReduceSpec::count()],
            multi: false,
            bin_params: None,
            bound_by_filter: false,
            having: None,
            order: None,
            target_slot: 0,
            eliminate_null: false,
            actual_time_bins: Vec::new(),
        }
    }
}

/// Everything a group query depends on, captured at call time
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSnapshot {
    /// Key projections aliased `key0..keyN`
    pub keys: Vec<String>,
    pub bins: Vec<Option<ResolvedBin>>,
    pub measures: Vec<String>,
    /// Name of the first measure, the natural sort of top/bottom
    pub first_measure: String,
    pub from: Vec<String>,
    pub filters: Vec<String>,
    pub having: Vec<String>,
    pub order: Option<String>,
}

impl GroupSnapshot {
    fn key_aliases(&self) -> Vec<String> {
        (0..self.keys.len()).map(|i| format!("key{}", i)).collect()
    }

    fn statement(&self) -> SelectStatement {
        let projection = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, key)| format!("{} AS key{}", key, i))
            .chain(self.measures.iter().cloned())
            .collect();
        SelectStatement::new(projection, self.from.clone())
            .filter(self.filters.clone())
            .group_by(self.key_aliases())
            .having(self.having.clone())
    }

    /// Every group, ordered by key unless an order was set
    pub fn all_sql(&self) -> String {
        let order = match &self.order {
            Some(order) => vec![order.clone()],
            None => self.key_aliases(),
        };
        self.statement().order_by(order).to_sql()
    }

    /// `limit` groups after `offset`, by the order expression or the first
    /// measure
    pub fn top_sql(&self, limit: usize, offset: usize, descending: bool) -> String {
        let by = self.order.as_deref().unwrap_or(&self.first_measure);
        let direction = if descending { "DESC" } else { "ASC" };
        self.statement()
            .order_by(vec![format!("{} {}", by, direction)])
            .limit(Some(limit), Some(offset))
            .to_sql()
    }

    /// Number of groups
    pub fn size_sql(&self) -> String {
        format!("SELECT COUNT(*) AS val FROM ({}) AS groups", self.statement())
    }

    /// Replace bucket indices by domain values
    pub fn unbin(&self, rows: Vec<Row>) -> Vec<Row> {
        unbin_rows(&self.bins, rows)
    }

    fn post_processors(&self) -> Vec<PostProcess> {
        if self.bins.iter().all(Option::is_none) {
            return Vec::new();
        }
        let bins = self.bins.clone();
        let unbin: PostProcess = Arc::new(move |rows: Vec<Row>| unbin_rows(&bins, rows));
        vec![unbin]
    }
}

fn unbin_rows(bins: &[Option<ResolvedBin>], rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            for (i, bin) in bins.iter().enumerate() {
                let Some(bin) = bin else { continue };
                let key = format!("key{}", i);
                if let Some(index) = row.get(&key).and_then(Value::as_i64) {
                    row.insert(key, bin.unbin(index));
                }
            }
            row
        })
        .collect()
}

struct GroupInner {
    dimension: Dimension,
    state: RwLock<GroupState>,
    cache: Arc<QueryCache>,
}

/// Aggregation over a dimension, observing every other dimension's filter
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("dimension", &self.inner.dimension)
            .field("reduction", &self.inner.state.read().reduction)
            .finish()
    }
}

impl Group {
    pub(crate) fn new(dimension: Dimension) -> Self {
        let cache = dimension.crossfilter().new_cache();
        Self {
            inner: Arc::new(GroupInner {
                dimension,
                state: RwLock::new(GroupState::default()),
                cache,
            }),
        }
    }

    pub fn dimension(&self) -> &Dimension {
        &self.inner.dimension
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.inner.cache
    }

    // ---- reductions ----

    fn reduce_single(&self, expression: &str, agg: AggMode) -> &Self {
        let mut state = self.inner.state.write();
        state.reduction = vec![ReduceSpec::new(expression, agg, "val")];
        state.multi = false;
        drop(state);
        self
    }

    pub fn reduce_count(&self) -> &Self {
        self.reduce_single("*", AggMode::Count)
    }

    pub fn reduce_sum(&self, expression: &str) -> &Self {
        self.reduce_single(expression, AggMode::Sum)
    }

    pub fn reduce_avg(&self, expression: &str) -> &Self {
        self.reduce_single(expression, AggMode::Avg)
    }

    pub fn reduce_min(&self, expression: &str) -> &Self {
        self.reduce_single(expression, AggMode::Min)
    }

    pub fn reduce_max(&self, expression: &str) -> &Self {
        self.reduce_single(expression, AggMode::Max)
    }

    /// Several named measures at once. An empty list falls back to a count.
    pub fn reduce(&self, specs: Vec<ReduceSpec>) -> &Self {
        let mut state = self.inner.state.write();
        state.multi = !specs.is_empty();
        state.reduction = if specs.is_empty() {
            vec![ReduceSpec::count()]
        } else {
            specs
        };
        drop(state);
        self
    }

    pub fn reductions(&self) -> Vec<ReduceSpec> {
        self.inner.state.read().reduction.clone()
    }

    /// Measure projection without target substitution
    pub fn reduce_expression(&self) -> String {
        reduce::projection(&self.inner.state.read().reduction, None).join(", ")
    }

    // ---- binning ----

    /// One entry per dimension expression; `None` leaves that key unbinned
    pub fn set_bin_params(&self, params: Option<Vec<Option<BinParams>>>) -> Result<()> {
        if let Some(params) = &params {
            let expected = self.inner.dimension.expressions().len();
            if params.len() != expected {
                return Err(CrossfilterError::BinParamsMismatch {
                    expected,
                    got: params.len(),
                });
            }
        }
        self.inner.state.write().bin_params = params;
        Ok(())
    }

    pub fn bin_params(&self) -> Option<Vec<Option<BinParams>>> {
        self.inner.state.read().bin_params.clone()
    }

    /// Bin over the dimension's range snapshot instead of the static bounds
    pub fn set_bound_by_filter(&self, enabled: bool) -> &Self {
        self.inner.state.write().bound_by_filter = enabled;
        self
    }

    pub fn is_bound_by_filter(&self) -> bool {
        self.inner.state.read().bound_by_filter
    }

    /// Time unit the last query used for expression `index`
    pub fn actual_time_bin(&self, index: usize) -> Option<TimeUnit> {
        self.inner
            .state
            .read()
            .actual_time_bins
            .get(index)
            .copied()
            .flatten()
    }

    // ---- query shape ----

    pub fn having(&self, expression: impl Into<String>) -> &Self {
        self.inner.state.write().having = Some(expression.into());
        self
    }

    pub fn clear_having(&self) -> &Self {
        self.inner.state.write().having = None;
        self
    }

    pub fn order_by(&self, expression: impl Into<String>) -> &Self {
        self.inner.state.write().order = Some(expression.into());
        self
    }

    pub fn order_natural(&self) -> &Self {
        self.inner.state.write().order = None;
        self
    }

    /// Drop groups whose key is null
    pub fn set_eliminate_null(&self, enabled: bool) -> &Self {
        self.inner.state.write().eliminate_null = enabled;
        self
    }

    /// Index of the measure replaced by the target filter
    pub fn set_target_slot(&self, index: usize) -> &Self {
        self.inner.state.write().target_slot = index;
        self
    }

    pub fn target_slot(&self) -> usize {
        self.inner.state.read().target_slot
    }

    // ---- queries ----

    /// Capture everything the next query depends on
    pub fn snapshot(&self) -> Result<GroupSnapshot> {
        let dim = &self.inner.dimension;
        if dim.is_disposed() {
            return Err(CrossfilterError::Disposed);
        }
        let cf = dim.crossfilter();
        let dialect = cf.dialect();
        let expressions = dim.expressions();
        let mut state = self.inner.state.write();

        let range_bounds = if state.bound_by_filter {
            dim.range_bounds()
        } else {
            None
        };
        let bins: Vec<Option<ResolvedBin>> = match &state.bin_params {
            None => vec![None; expressions.len()],
            Some(params) => params
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let bounds = range_bounds
                        .as_ref()
                        .and_then(|b| b.get(i))
                        .and_then(|(lo, hi)| BinBounds::from_range(lo, hi));
                    p.as_ref().map(|p| p.resolve(bounds))
                })
                .collect(),
        };
        state.actual_time_bins = bins.iter().map(|b| b.and_then(|b| b.time_unit())).collect();

        let mut exclude = Vec::new();
        if !dim.is_drill_down() {
            exclude.push(dim.slot());
        }
        let target = cf.target();
        if let Some((slot, _)) = &target {
            exclude.push(*slot);
        }
        let substitution = target
            .as_ref()
            .filter(|(slot, _)| state.multi && *slot != dim.slot())
            .map(|(_, text)| (state.target_slot, text.as_str()));

        let mut keys = Vec::with_capacity(expressions.len());
        let mut filters = cf.join_predicates();
        filters.extend(cf.active_filters(&exclude));
        let mut having = Vec::new();
        for (i, (expr, bin)) in expressions.iter().zip(&bins).enumerate() {
            if state.eliminate_null {
                filters.push(format!("{} IS NOT NULL", expr));
            }
            match bin {
                Some(bin) => {
                    keys.push(bin.bucket_expression(expr, dialect));
                    filters.push(bin.domain_filter(expr, dialect));
                    having.push(format!("key{i} >= 0 AND key{i} < {}", bin.num_bins()));
                }
                None => keys.push(expr.clone()),
            }
        }
        if let Some(expr) = &state.having {
            having.push(expr.clone());
        }

        Ok(GroupSnapshot {
            keys,
            bins,
            measures: reduce::projection(&state.reduction, substitution),
            first_measure: state
                .reduction
                .first()
                .map(|r| r.name.clone())
                .unwrap_or_else(|| "val".to_string()),
            from: cf.from_clause(),
            filters,
            having,
            order: state.order.clone(),
        })
    }

    /// Every group
    pub fn all(&self) -> Result<Vec<Row>> {
        let snapshot = self.snapshot()?;
        self.inner
            .cache
            .query(&snapshot.all_sql(), &snapshot.post_processors())
    }

    pub fn all_async(&self) -> impl Future<Output = Result<Vec<Row>>> + Send + 'static {
        let snapshot = self.snapshot();
        let cache = self.inner.cache.clone();
        async move {
            let snapshot = snapshot?;
            cache
                .query_async(&snapshot.all_sql(), &snapshot.post_processors())
                .await
        }
    }

    /// Largest `limit` groups after `offset`
    pub fn top(&self, limit: usize, offset: usize) -> Result<Vec<Row>> {
        let snapshot = self.snapshot()?;
        self.inner.cache.query(
            &snapshot.top_sql(limit, offset, true),
            &snapshot.post_processors(),
        )
    }

    /// Smallest `limit` groups after `offset`
    pub fn bottom(&self, limit: usize, offset: usize) -> Result<Vec<Row>> {
        let snapshot = self.snapshot()?;
        self.inner.cache.query(
            &snapshot.top_sql(limit, offset, false),
            &snapshot.post_processors(),
        )
    }

    pub fn top_async(
        &self,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<Row>>> + Send + 'static {
        self.ranked_async(limit, offset, true)
    }

    pub fn bottom_async(
        &self,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<Row>>> + Send + 'static {
        self.ranked_async(limit, offset, false)
    }

    fn ranked_async(
        &self,
        limit: usize,
        offset: usize,
        descending: bool,
    ) -> impl Future<Output = Result<Vec<Row>>> + Send + 'static {
        let snapshot = self.snapshot();
        let cache = self.inner.cache.clone();
        async move {
            let snapshot = snapshot?;
            cache
                .query_async(
                    &snapshot.top_sql(limit, offset, descending),
                    &snapshot.post_processors(),
                )
                .await
        }
    }

    /// Number of groups
    pub fn size(&self) -> Result<i64> {
        let snapshot = self.snapshot()?;
        let rows = self.inner.cache.query(&snapshot.size_sql(), &[])?;
        Ok(count_of(&rows))
    }

    pub fn size_async(&self) -> impl Future<Output = Result<i64>> + Send + 'static {
        let snapshot = self.snapshot();
        let cache = self.inner.cache.clone();
        async move {
            let snapshot = snapshot?;
            let rows = cache.query_async(&snapshot.size_sql(), &[]).await?;
            Ok(count_of(&rows))
        }
    }

    /// Drop cached results
    pub fn dispose(&self) {
        self.inner.cache.clear();
    }
}

fn count_of(rows: &[Row]) -> i64 {
    rows.first()
        .and_then(|row| row.get("val"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
