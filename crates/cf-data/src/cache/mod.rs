//! Query result caching

use std::sync::Arc;

use ahash::AHashMap;
use cf_core::{Connector, Row};
use parking_lot::Mutex;

use crate::{CrossfilterError, Result};

/// Transformation applied to raw connector rows before they are cached
pub type PostProcess = Arc<dyn Fn(Vec<Row>) -> Vec<Row> + Send + Sync>;

/// Hit/miss counters of one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    rows: Vec<Row>,
    time: u64,
}

struct CacheState {
    entries: AHashMap<String, CacheEntry>,
    /// Logical clock, bumped on every insert and hit
    clock: u64,
    max_size: usize,
    stats: CacheStats,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Drop least recently used entries until `len() <= keep`
    fn evict_to(&mut self, keep: usize) {
        while self.entries.len() > keep {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.time)
                .map(|(sql, _)| sql.clone());
            match oldest {
                Some(sql) => {
                    self.entries.remove(&sql);
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }
    }
}

/// Bounded LRU cache of query results keyed by exact SQL text
pub struct QueryCache {
    connector: Arc<dyn Connector>,
    state: Mutex<CacheState>,
}

impl QueryCache {
    pub fn new(connector: Arc<dyn Connector>, max_size: usize) -> Self {
        Self {
            connector,
            state: Mutex::new(CacheState {
                entries: AHashMap::new(),
                clock: 0,
                max_size,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Run `sql` synchronously, serving it from the cache when possible.
    /// On a miss the raw rows go through `post` in order before caching.
    pub fn query(&self, sql: &str, post: &[PostProcess]) -> Result<Vec<Row>> {
        if let Some(rows) = self.lookup(sql) {
            return Ok(rows);
        }
        let raw = self
            .connector
            .query(sql)
            .map_err(CrossfilterError::Connector)?;
        Ok(self.store(sql, raw, post))
    }

    /// Async variant of [`QueryCache::query`]. A hit resolves on first poll
    /// without touching the connector.
    pub async fn query_async(&self, sql: &str, post: &[PostProcess]) -> Result<Vec<Row>> {
        if let Some(rows) = self.lookup(sql) {
            return Ok(rows);
        }
        let raw = self
            .connector
            .query_async(sql)
            .await
            .map_err(CrossfilterError::Connector)?;
        Ok(self.store(sql, raw, post))
    }

    fn lookup(&self, sql: &str) -> Option<Vec<Row>> {
        let mut state = self.state.lock();
        let time = state.tick();
        match state.entries.get_mut(sql) {
            Some(entry) => {
                entry.time = time;
                let rows = entry.rows.clone();
                state.stats.hits += 1;
                tracing::trace!(sql, "query cache hit");
                Some(rows)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    fn store(&self, sql: &str, raw: Vec<Row>, post: &[PostProcess]) -> Vec<Row> {
        let rows = post.iter().fold(raw, |rows, step| step(rows));

        let mut state = self.state.lock();
        if state.max_size == 0 {
            return rows;
        }
        if !state.entries.contains_key(sql) {
            let keep = state.max_size - 1;
            state.evict_to(keep);
        }
        let time = state.tick();
        state.entries.insert(
            sql.to_string(),
            CacheEntry {
                rows: rows.clone(),
                time,
            },
        );
        tracing::debug!(sql, entries = state.entries.len(), "cached query result");
        rows
    }

    /// Cached rows without refreshing their recency
    pub fn peek(&self, sql: &str) -> Option<Vec<Row>> {
        self.state.lock().entries.get(sql).map(|e| e.rows.clone())
    }

    /// Logical time of the last insert or hit of `sql`
    pub fn entry_time(&self, sql: &str) -> Option<u64> {
        self.state.lock().entries.get(sql).map(|e| e.time)
    }

    pub fn contains(&self, sql: &str) -> bool {
        self.state.lock().entries.contains_key(sql)
    }

    pub fn evict(&self, sql: &str) -> bool {
        self.state.lock().entries.remove(sql).is_some()
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.state.lock().max_size
    }

    /// Change the bound, evicting least recently used entries if needed
    pub fn set_max_size(&self, max_size: usize) {
        let mut state = self.state.lock();
        state.max_size = max_size;
        state.evict_to(max_size);
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ScriptedConnector;
    use cf_core::{row, Value};
    use futures::FutureExt;

    fn connector() -> Arc<ScriptedConnector> {
        let connector = Arc::new(ScriptedConnector::new("test"));
        connector.set_default_rows(vec![row([("val", Value::Int(1))])]);
        connector
    }

    #[test]
    fn test_repeated_query_hits_cache() {
        let conn = connector();
        let cache = QueryCache::new(conn.clone(), 10);

        cache.query("SELECT 1", &[]).unwrap();
        let first = cache.entry_time("SELECT 1").unwrap();
        cache.query("SELECT 1", &[]).unwrap();
        let second = cache.entry_time("SELECT 1").unwrap();
        cache.query("SELECT 1", &[]).unwrap();
        let third = cache.entry_time("SELECT 1").unwrap();

        assert_eq!(conn.query_count(), 1);
        assert!(first < second && second < third);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1, evictions: 0 });
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let conn = connector();
        let cache = QueryCache::new(conn.clone(), 2);

        cache.query("a", &[]).unwrap();
        cache.query("b", &[]).unwrap();
        // touch a so b becomes the oldest
        cache.query("a", &[]).unwrap();
        cache.query("c", &[]).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let conn = connector();
        let cache = QueryCache::new(conn.clone(), 10);

        conn.fail_with(Some("boom"));
        let err = cache.query("SELECT 1", &[]).unwrap_err();
        assert!(matches!(err, CrossfilterError::Connector(_)));
        assert!(cache.is_empty());

        conn.fail_with(None);
        cache.query("SELECT 1", &[]).unwrap();
        assert_eq!(conn.query_count(), 2);
    }

    #[test]
    fn test_post_processors_run_in_order_before_caching() {
        let conn = connector();
        let cache = QueryCache::new(conn.clone(), 10);
        let double: PostProcess = Arc::new(|rows: Vec<Row>| {
            rows.into_iter().flat_map(|r| vec![r.clone(), r]).collect()
        });
        let tag: PostProcess = Arc::new(|rows: Vec<Row>| {
            rows.into_iter()
                .enumerate()
                .map(|(i, mut r)| {
                    r.insert("i".into(), Value::Int(i as i64));
                    r
                })
                .collect()
        });

        let rows = cache.query("q", &[double, tag]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["i"], Value::Int(1));
        assert_eq!(cache.peek("q").unwrap(), rows);
    }

    #[test]
    fn test_zero_size_disables_caching() {
        let conn = connector();
        let cache = QueryCache::new(conn.clone(), 0);
        cache.query("q", &[]).unwrap();
        cache.query("q", &[]).unwrap();
        assert_eq!(conn.query_count(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shrinking_evicts_oldest() {
        let conn = connector();
        let cache = QueryCache::new(conn, 10);
        for sql in ["a", "b", "c"] {
            cache.query(sql, &[]).unwrap();
        }
        cache.set_max_size(1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("c"));
    }

    #[tokio::test]
    async fn test_async_hit_resolves_immediately() {
        let conn = connector();
        let cache = QueryCache::new(conn.clone(), 10);

        // a miss has to wait on the connector
        assert!(cache.query_async("q", &[]).now_or_never().is_none());
        cache.query_async("q", &[]).await.unwrap();
        assert!(cache.contains("q"));

        let hit = cache.query_async("q", &[]).now_or_never();
        assert!(matches!(hit, Some(Ok(_))));
        assert_eq!(conn.query_count(), 1);
    }
}
