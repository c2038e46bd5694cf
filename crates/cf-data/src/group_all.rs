//! Ungrouped aggregates, e.g. the "n of m selected" counter

use std::sync::Arc;

use cf_core::{Row, Value};
use parking_lot::RwLock;

use crate::cache::QueryCache;
use crate::crossfilter::Crossfilter;
use crate::dimension::Dimension;
use crate::reduce::{self, AggMode, ReduceSpec};
use crate::sql::SelectStatement;
use crate::{CrossfilterError, Result};

struct GroupAllInner {
    crossfilter: Crossfilter,
    /// Owning dimension, whose filter is ignored unless drilling down
    dimension: Option<Dimension>,
    reduction: RwLock<Vec<ReduceSpec>>,
    cache: Arc<QueryCache>,
}

/// Single-row aggregate over the filtered dataset
#[derive(Clone)]
pub struct GroupAll {
    inner: Arc<GroupAllInner>,
}

impl GroupAll {
    pub(crate) fn new(crossfilter: Crossfilter, dimension: Option<Dimension>) -> Self {
        let cache = crossfilter.new_cache();
        Self {
            inner: Arc::new(GroupAllInner {
                crossfilter,
                dimension,
                reduction: RwLock::new(vec![ReduceSpec::count()]),
                cache,
            }),
        }
    }

    pub fn reduce_count(&self) -> &Self {
        *self.inner.reduction.write() = vec![ReduceSpec::count()];
        self
    }

    pub fn reduce_sum(&self, expression: &str) -> &Self {
        *self.inner.reduction.write() = vec![ReduceSpec::new(expression, AggMode::Sum, "val")];
        self
    }

    /// Several named measures. An empty list falls back to a count.
    pub fn reduce(&self, specs: Vec<ReduceSpec>) -> &Self {
        *self.inner.reduction.write() = if specs.is_empty() {
            vec![ReduceSpec::count()]
        } else {
            specs
        };
        self
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.inner.cache
    }

    /// SQL of the aggregate as it would run now
    pub fn query(&self) -> Result<String> {
        let cf = &self.inner.crossfilter;
        let mut exclude = Vec::new();
        if let Some(dim) = &self.inner.dimension {
            if dim.is_disposed() {
                return Err(CrossfilterError::Disposed);
            }
            if !dim.is_drill_down() {
                exclude.push(dim.slot());
            }
        }
        let mut filters = cf.join_predicates();
        filters.extend(cf.active_filters(&exclude));
        let measures = reduce::projection(&self.inner.reduction.read(), None);
        Ok(SelectStatement::new(measures, cf.from_clause())
            .filter(filters)
            .to_sql())
    }

    /// Every measure of the aggregate row
    pub fn values(&self) -> Result<Row> {
        let rows = self.inner.cache.query(&self.query()?, &[])?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    pub async fn values_async(&self) -> Result<Row> {
        let sql = self.query()?;
        let rows = self.inner.cache.query_async(&sql, &[]).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// The first measure
    pub fn value(&self) -> Result<Value> {
        Ok(first_value(self.values()?))
    }

    pub async fn value_async(&self) -> Result<Value> {
        Ok(first_value(self.values_async().await?))
    }

    /// Drop cached results
    pub fn dispose(&self) {
        self.inner.cache.clear();
    }
}

fn first_value(row: Row) -> Value {
    row.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::flights_dataset;
    use cf_core::row;

    #[test]
    fn test_dataset_scope_observes_every_filter() {
        let (cf, conn) = flights_dataset();
        let carrier = cf.dimension(["carrier"]);
        carrier.filter_exact("AA").unwrap();
        conn.respond("COUNT(*)", vec![row([("val", Value::Int(7))])]);

        let all = cf.group_all();
        assert_eq!(all.value().unwrap(), Value::Int(7));
        assert_eq!(
            conn.last_query().unwrap(),
            "SELECT COUNT(*) AS val FROM flights WHERE carrier = 'AA'"
        );

        let scoped = carrier.group_all();
        assert_eq!(
            scoped.query().unwrap(),
            "SELECT COUNT(*) AS val FROM flights"
        );
    }

    #[test]
    fn test_multiple_measures() {
        let (cf, conn) = flights_dataset();
        conn.set_default_rows(vec![row([
            ("flights", Value::Int(3)),
            ("delay", Value::Float(4.5)),
        ])]);
        let all = cf.group_all();
        all.reduce(vec![
            ReduceSpec::new("*", AggMode::Count, "flights"),
            ReduceSpec::new("dep_delay", AggMode::Sum, "delay"),
        ]);

        let values = all.values().unwrap();
        assert_eq!(values["delay"], Value::Float(4.5));
        assert_eq!(
            conn.last_query().unwrap(),
            "SELECT COUNT(*) AS flights, SUM(dep_delay) AS delay FROM flights"
        );
    }

    #[tokio::test]
    async fn test_empty_result_is_null() {
        let (cf, _) = flights_dataset();
        let all = cf.group_all();
        all.reduce_sum("dep_delay");
        assert_eq!(all.value_async().await.unwrap(), Value::Null);
    }
}
