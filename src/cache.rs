//! Engine-scoped caches for compiled regexes and attribute-value search results.
//!
//! Both maps are capped at 256 entries; when a map is full it is cleared and
//! rebuilt on demand. Span entries are keyed by the registry generation they
//! were computed under, so a run on an older snapshot can never hand its
//! results to a run on a newer one. Syncing to a newer generation drops
//! everything derived from older pattern sets.

use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Arc;

const MAX_CACHE_ENTRIES: usize = 256;

/// Byte spans `(start, end)` found in one attribute value.
pub type Spans = Arc<Vec<(usize, usize)>>;

/// (registry generation, pattern id, attribute value)
type SpanKey = (u64, String, String);

#[derive(Debug, Default)]
pub struct MatchCache {
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    generation: u64,
    // Key is (source, case_insensitive) so the same source compiled with
    // different flags never collides.
    regexes: HashMap<(String, bool), Arc<Regex>>,
    spans: HashMap<SpanKey, Spans>,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub generation: u64,
    pub regexes: usize,
    pub spans: usize,
    pub hits: u64,
    pub misses: u64,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry if `generation` is newer than the one the cache was
    /// filled under. Runs on older snapshots leave newer entries alone.
    pub fn sync(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if generation > inner.generation {
            inner.regexes.clear();
            inner.spans.clear();
            inner.generation = generation;
        }
    }

    /// Drop every entry.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.regexes.clear();
        inner.spans.clear();
    }

    /// Get a compiled regex from cache, or compile and cache it.
    pub fn regex(&self, source: &str, case_insensitive: bool) -> Result<Arc<Regex>, regex::Error> {
        let key = (source.to_string(), case_insensitive);
        if let Some(re) = self.inner.lock().regexes.get(&key) {
            return Ok(Arc::clone(re));
        }

        let compiled = Arc::new(
            RegexBuilder::new(source)
                .case_insensitive(case_insensitive)
                .build()?,
        );

        let mut inner = self.inner.lock();
        if inner.regexes.len() >= MAX_CACHE_ENTRIES {
            inner.regexes.clear();
        }
        inner.regexes.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Look up the spans the pattern registered as `pattern_id` in
    /// `generation` produced for `value`, computing them on a miss.
    pub fn spans<F>(&self, generation: u64, pattern_id: &str, value: &str, compute: F) -> Spans
    where
        F: FnOnce() -> Vec<(usize, usize)>,
    {
        let key = (generation, pattern_id.to_string(), value.to_string());
        {
            let mut inner = self.inner.lock();
            if let Some(spans) = inner.spans.get(&key).cloned() {
                inner.hits += 1;
                return spans;
            }
            inner.misses += 1;
        }

        let spans: Spans = Arc::new(compute());

        let mut inner = self.inner.lock();
        if inner.spans.len() >= MAX_CACHE_ENTRIES {
            inner.spans.clear();
        }
        inner.spans.insert(key, Arc::clone(&spans));
        spans
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            generation: inner.generation,
            regexes: inner.regexes.len(),
            spans: inner.spans.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}
