//! Dataset handle
//!
//! Owns the filter store, the column metadata and the event bus of one
//! dataset. Dimensions and groups hold a clone of the handle and reach the
//! shared state through it.

use std::sync::{Arc, Weak};

use cf_core::events::events::{DataSetLoaded, FilterApplied, FilterCleared};
use cf_core::{ColumnMeta, Connector, EventBus, Value};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::cache::QueryCache;
use crate::config::CrossfilterConfig;
use crate::dimension::Dimension;
use crate::filter::{FilterStore, SlotId, SlotTransition};
use crate::group_all::GroupAll;
use crate::reduce::ReduceSpec;
use crate::sql::{conjunction, SelectStatement, SqlDialect};
use crate::{CrossfilterError, Result};

struct CrossfilterInner {
    connector: Arc<dyn Connector>,
    config: CrossfilterConfig,
    tables: RwLock<Vec<String>>,
    joins: RwLock<Vec<(String, String)>>,
    /// Keyed by bare column name; the first table wins on clashes
    columns: RwLock<IndexMap<String, ColumnMeta>>,
    filters: RwLock<FilterStore>,
    /// Grouping expressions of every live dimension, in registration order
    dimensions: RwLock<IndexMap<SlotId, Vec<String>>>,
    caches: Mutex<Vec<Weak<QueryCache>>>,
    cache: Arc<QueryCache>,
    events: Arc<EventBus>,
}

/// Handle to one dataset: a table, or several tables joined on equality
#[derive(Clone)]
pub struct Crossfilter {
    inner: Arc<CrossfilterInner>,
}

impl std::fmt::Debug for Crossfilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crossfilter")
            .field("source", &self.inner.connector.source_name())
            .field("tables", &*self.inner.tables.read())
            .finish()
    }
}

impl Crossfilter {
    /// Open a dataset over `tables`, loading their column metadata
    pub fn new<I, S>(connector: Arc<dyn Connector>, tables: I, config: CrossfilterConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_event_bus(connector, tables, config, Arc::new(EventBus::new()))
    }

    /// Like [`Crossfilter::new`], publishing on an existing bus
    pub fn with_event_bus<I, S>(
        connector: Arc<dyn Connector>,
        tables: I,
        config: CrossfilterConfig,
        events: Arc<EventBus>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cache = Arc::new(QueryCache::new(connector.clone(), config.max_cache_size));
        let crossfilter = Self {
            inner: Arc::new(CrossfilterInner {
                connector,
                config,
                tables: RwLock::new(Vec::new()),
                joins: RwLock::new(Vec::new()),
                columns: RwLock::new(IndexMap::new()),
                filters: RwLock::new(FilterStore::new()),
                dimensions: RwLock::new(IndexMap::new()),
                caches: Mutex::new(Vec::new()),
                cache,
                events,
            }),
        };
        crossfilter.set_tables(tables)?;
        Ok(crossfilter)
    }

    /// Re-point the handle at other tables. Reloads column metadata and
    /// clears every cache created from this dataset.
    pub fn set_tables<I, S>(&self, tables: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables: Vec<String> = tables.into_iter().map(Into::into).collect();
        let mut columns = IndexMap::new();
        for table in &tables {
            let metas = self
                .inner
                .connector
                .columns(table)
                .map_err(CrossfilterError::Connector)?;
            if metas.is_empty() {
                return Err(CrossfilterError::UnknownTable(table.clone()));
            }
            for meta in metas {
                columns.entry(meta.name.clone()).or_insert(meta);
            }
        }

        let column_count = columns.len();
        *self.inner.tables.write() = tables.clone();
        *self.inner.columns.write() = columns;
        self.dispose();

        tracing::info!(
            source = self.inner.connector.source_name(),
            ?tables,
            column_count,
            "loaded dataset"
        );
        self.inner.events.publish(DataSetLoaded {
            tables,
            column_count,
        });
        Ok(())
    }

    /// Add an equality join between two qualified columns
    pub fn with_join(self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.inner.joins.write().push((left.into(), right.into()));
        self
    }

    pub fn tables(&self) -> Vec<String> {
        self.inner.tables.read().clone()
    }

    pub fn columns(&self) -> Vec<ColumnMeta> {
        self.inner.columns.read().values().cloned().collect()
    }

    pub fn column(&self, name: &str) -> Option<ColumnMeta> {
        let bare = name.rsplit('.').next().unwrap_or(name);
        self.inner.columns.read().get(bare).cloned()
    }

    pub fn config(&self) -> &CrossfilterConfig {
        &self.inner.config
    }

    pub fn dialect(&self) -> SqlDialect {
        self.inner.config.dialect
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.inner.connector
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.inner.events.clone()
    }

    /// New dimension over one or more grouping expressions
    pub fn dimension<I, S>(&self, expressions: I) -> Dimension
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dimension::new(self.clone(), expressions.into_iter().map(Into::into).collect())
    }

    /// Aggregate over the whole dataset, observing every filter
    pub fn group_all(&self) -> GroupAll {
        GroupAll::new(self.clone(), None)
    }

    fn size_statement(&self) -> String {
        SelectStatement::new(vec![ReduceSpec::count().to_sql()], self.from_clause())
            .filter(self.join_predicates())
            .to_sql()
    }

    /// Unfiltered row count
    pub fn size(&self) -> Result<i64> {
        let rows = self.inner.cache.query(&self.size_statement(), &[])?;
        Ok(first_count(&rows))
    }

    pub async fn size_async(&self) -> Result<i64> {
        let sql = self.size_statement();
        let rows = self.inner.cache.query_async(&sql, &[]).await?;
        Ok(first_count(&rows))
    }

    /// Every active filter ANDed together
    pub fn filter_string(&self) -> String {
        conjunction(self.inner.filters.read().active_filters(&[]))
    }

    pub fn set_target_filter(&self, slot: Option<SlotId>) {
        self.inner.filters.write().set_target(slot);
    }

    pub fn target_filter(&self) -> Option<SlotId> {
        self.inner.filters.read().target()
    }

    /// Empty every filter slot. Range snapshots held by dimensions are kept.
    pub fn clear_all_filters(&self) {
        let cleared = self.inner.filters.write().clear_all();
        for slot in cleared {
            self.inner.events.publish(FilterCleared { slot: slot.raw() });
        }
    }

    /// Drop every cached result of this dataset and of everything created
    /// from it
    pub fn dispose(&self) {
        self.inner.cache.clear();
        let mut caches = self.inner.caches.lock();
        caches.retain(|weak| match weak.upgrade() {
            Some(cache) => {
                cache.clear();
                true
            }
            None => false,
        });
    }

    /// Cache statistics of the dataset-level cache
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.inner.cache
    }

    pub(crate) fn new_cache(&self) -> Arc<QueryCache> {
        let cache = Arc::new(QueryCache::new(
            self.inner.connector.clone(),
            self.inner.config.max_cache_size,
        ));
        self.inner.caches.lock().push(Arc::downgrade(&cache));
        cache
    }

    pub(crate) fn register_dimension(&self, expressions: Vec<String>) -> SlotId {
        let slot = self.inner.filters.write().allocate();
        self.inner.dimensions.write().insert(slot, expressions);
        slot
    }

    pub(crate) fn retire_dimension(&self, slot: SlotId) {
        self.inner.dimensions.write().shift_remove(&slot);
        let transition = self.inner.filters.write().retire(slot);
        if transition == SlotTransition::Cleared {
            self.inner.events.publish(FilterCleared { slot: slot.raw() });
        }
    }

    /// Every expression of every live dimension, de-duplicated
    pub(crate) fn dimension_expressions(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for expr in self.inner.dimensions.read().values().flatten() {
            if !seen.contains(expr) {
                seen.push(expr.clone());
            }
        }
        seen
    }

    /// The single writer of filter slots
    pub(crate) fn write_filter(&self, slot: SlotId, text: String) {
        let transition = self.inner.filters.write().set(slot, text.clone());
        tracing::debug!(%slot, filter = text.as_str(), "filter updated");
        match transition {
            SlotTransition::Applied => self.inner.events.publish(FilterApplied {
                slot: slot.raw(),
                filter: text,
            }),
            SlotTransition::Cleared => {
                self.inner.events.publish(FilterCleared { slot: slot.raw() })
            }
            SlotTransition::Replaced | SlotTransition::Unchanged => {}
        }
    }

    pub(crate) fn filter_text(&self, slot: SlotId) -> String {
        self.inner
            .filters
            .read()
            .get(slot)
            .unwrap_or_default()
            .to_string()
    }

    pub(crate) fn active_filters(&self, exclude: &[SlotId]) -> Vec<String> {
        self.inner.filters.read().active_filters(exclude)
    }

    /// Target slot and its text, when a non-empty target is set
    pub(crate) fn target(&self) -> Option<(SlotId, String)> {
        let filters = self.inner.filters.read();
        let slot = filters.target()?;
        filters.target_filter().map(|text| (slot, text.to_string()))
    }

    pub(crate) fn from_clause(&self) -> Vec<String> {
        self.inner.tables.read().clone()
    }

    pub(crate) fn join_predicates(&self) -> Vec<String> {
        self.inner
            .joins
            .read()
            .iter()
            .map(|(l, r)| format!("{} = {}", l, r))
            .collect()
    }

    pub(crate) fn is_array_column(&self, expr: &str) -> bool {
        self.column(expr).map(|c| c.is_array).unwrap_or(false)
    }
}

fn first_count(rows: &[cf_core::Row]) -> i64 {
    rows.first()
        .and_then(|row| row.values().next())
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
