use std::fmt;
use std::sync::Arc;

use contquery_error::Result;
use indexmap::IndexMap;
use tracing::debug;

use super::splitter::SplitQueryTriple;

/// Identifies a continuous view definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// A query at one compile generation.
///
/// Redefining or dropping a view bumps its generation, so stale entries are
/// never returned even before they're evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SplitCacheKey {
    pub query: QueryId,
    pub generation: u64,
}

/// Split results of recently compiled views, least recently used first.
#[derive(Debug)]
pub struct SplitCache {
    capacity: usize,
    entries: IndexMap<SplitCacheKey, Arc<SplitQueryTriple>>,
    hits: u64,
    misses: u64,
}

impl SplitCache {
    pub fn new(capacity: usize) -> Self {
        SplitCache {
            capacity,
            entries: IndexMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn get(&mut self, key: SplitCacheKey) -> Option<Arc<SplitQueryTriple>> {
        let idx = self.entries.get_index_of(&key)?;
        // Most recently used entries live at the end.
        let last = self.entries.len() - 1;
        self.entries.move_index(idx, last);
        self.entries.get(&key).cloned()
    }

    /// Get the cached split, computing and caching it on a miss. Errors
    /// aren't cached.
    pub fn get_or_try_insert_with(
        &mut self,
        key: SplitCacheKey,
        split: impl FnOnce() -> Result<SplitQueryTriple>,
    ) -> Result<Arc<SplitQueryTriple>> {
        if let Some(triple) = self.get(key) {
            self.hits += 1;
            return Ok(triple);
        }
        self.misses += 1;

        let triple = Arc::new(split()?);
        if self.capacity > 0 {
            self.entries.insert(key, triple.clone());
            self.evict();
        }
        Ok(triple)
    }

    /// Drop every generation of a query.
    pub fn invalidate(&mut self, query: QueryId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.query != query);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(%query, removed, "invalidated cached splits");
        }
        removed
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict();
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            if let Some((key, _)) = self.entries.shift_remove_index(0) {
                debug!(query = %key.query, generation = key.generation, "evicted cached split");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use contquery_error::DbError;
    use contquery_parser::ast::SelectNode;

    use super::*;

    fn triple() -> SplitQueryTriple {
        SplitQueryTriple {
            worker: SelectNode::default(),
            combiner: SelectNode::default(),
            overlay: SelectNode::default(),
            hoisted: Vec::new(),
            has_aggregation: false,
            view_combines: false,
            window: None,
            step: None,
            bucket_column: None,
        }
    }

    fn key(query: u64, generation: u64) -> SplitCacheKey {
        SplitCacheKey {
            query: QueryId(query),
            generation,
        }
    }

    #[test]
    fn hit_after_miss() {
        let mut cache = SplitCache::new(4);
        cache.get_or_try_insert_with(key(1, 0), || Ok(triple())).unwrap();
        cache
            .get_or_try_insert_with(key(1, 0), || panic!("should be cached"))
            .unwrap();
        assert_eq!((1, 1), (cache.hits(), cache.misses()));

        // New generation is a miss.
        cache.get_or_try_insert_with(key(1, 1), || Ok(triple())).unwrap();
        assert_eq!(2, cache.misses());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = SplitCache::new(2);
        cache.get_or_try_insert_with(key(1, 0), || Ok(triple())).unwrap();
        cache.get_or_try_insert_with(key(2, 0), || Ok(triple())).unwrap();
        assert!(cache.get(key(1, 0)).is_some());
        cache.get_or_try_insert_with(key(3, 0), || Ok(triple())).unwrap();

        assert!(cache.get(key(2, 0)).is_none());
        assert!(cache.get(key(1, 0)).is_some());
        assert!(cache.get(key(3, 0)).is_some());
    }

    #[test]
    fn errors_not_cached() {
        let mut cache = SplitCache::new(2);
        let res = cache.get_or_try_insert_with(key(1, 0), || Err(DbError::new("bad")));
        assert!(res.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_all_generations() {
        let mut cache = SplitCache::new(8);
        for generation in 0..3 {
            cache
                .get_or_try_insert_with(key(7, generation), || Ok(triple()))
                .unwrap();
        }
        cache.get_or_try_insert_with(key(8, 0), || Ok(triple())).unwrap();
        assert_eq!(3, cache.invalidate(QueryId(7)));
        assert_eq!(1, cache.len());
    }
}
