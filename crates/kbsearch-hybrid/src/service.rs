//! Search surface: request validation, response cache, counters and timeouts
//! around [`HybridSearchEngine`].

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use kbsearch_core::config::SearchSettings;
use kbsearch_core::filter::MetadataFilter;
use kbsearch_core::types::{SearchMode, SearchResponse};

use crate::engine::HybridSearchEngine;

fn default_mode() -> String {
    SearchMode::Hybrid.as_str().to_string()
}

/// One search call as received from the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Result count; `None` uses `max_results`.
    #[serde(default)]
    pub k: Option<i64>,
    #[serde(default)]
    pub filter: MetadataFilter,
}

impl SearchRequest {
    pub fn new(query: &str, mode: SearchMode, k: usize) -> Self {
        Self {
            query: query.to_string(),
            mode: mode.as_str().to_string(),
            k: Some(i64::try_from(k).unwrap_or(i64::MAX)),
            filter: MetadataFilter::default(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub total_searches: u64,
    pub cache_hits: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub searches_by_mode: BTreeMap<String, u64>,
    /// Running mean over searches that reached the cache or the engine.
    pub avg_latency_ms: f64,
    pub latency_samples: u64,
    pub cache_entries: usize,
    pub cache_capacity: usize,
}

impl SearchStats {
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_searches == 0 { 0.0 } else { self.cache_hits as f64 / self.total_searches as f64 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    mode: SearchMode,
    k: usize,
    filter: String,
}

struct CachedResponse {
    response: SearchResponse,
    inserted: Instant,
}

/// Bounded LRU of full responses; entries older than the TTL are misses.
pub struct ResponseCache {
    entries: Mutex<LruCache<CacheKey, CachedResponse>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(cap)), ttl }
    }

    fn get(&self, key: &CacheKey) -> Option<SearchResponse> {
        let mut entries = self.entries.lock();
        let fresh = entries.get(key).map(|c| c.inserted.elapsed() <= self.ttl)?;
        if !fresh {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|c| c.response.clone())
    }

    fn put(&self, key: CacheKey, response: SearchResponse) {
        self.entries.lock().put(key, CachedResponse { response, inserted: Instant::now() });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub struct SearchService {
    engine: HybridSearchEngine,
    cache: ResponseCache,
    stats: Mutex<SearchStats>,
    timeout: Duration,
    max_results: usize,
}

impl SearchService {
    pub fn new(engine: HybridSearchEngine, settings: &SearchSettings) -> Self {
        Self {
            engine,
            cache: ResponseCache::new(
                settings.response_cache_capacity,
                Duration::from_secs(settings.response_cache_ttl_secs),
            ),
            stats: Mutex::new(SearchStats::default()),
            timeout: Duration::from_millis(settings.search_timeout_ms),
            max_results: settings.max_results,
        }
    }

    pub fn engine(&self) -> &HybridSearchEngine {
        &self.engine
    }

    /// Never fails: bad input yields an empty response, engine errors and
    /// timeouts yield an empty response carrying `error`.
    pub async fn search(&self, request: &SearchRequest) -> SearchResponse {
        let start = Instant::now();
        let query = request.query.trim();
        self.stats.lock().total_searches += 1;

        let mode = match request.mode.parse::<SearchMode>() {
            Ok(mode) => mode,
            Err(e) => {
                warn!(mode = %request.mode, error = %e, "rejecting search");
                return SearchResponse::empty(query, &request.mode);
            }
        };
        let k = match request.k {
            None => self.max_results,
            Some(k) if k <= 0 => return SearchResponse::empty(query, mode.as_str()),
            Some(k) => usize::try_from(k).unwrap_or(usize::MAX),
        };
        *self.stats.lock().searches_by_mode.entry(mode.as_str().to_string()).or_default() += 1;
        if query.is_empty() || self.engine.live_chunks() == 0 {
            return SearchResponse::empty(query, mode.as_str());
        }

        let key = CacheKey { query: normalize_query(query), mode, k, filter: request.filter.cache_key() };
        if let Some(mut cached) = self.cache.get(&key) {
            cached.from_cache = true;
            let mut stats = self.stats.lock();
            stats.cache_hits += 1;
            record_latency(&mut stats, start.elapsed());
            debug!(query, mode = %mode, "response cache hit");
            return cached;
        }

        let outcome = tokio::time::timeout(self.timeout, self.engine.search(query, mode, k, &request.filter)).await;
        let elapsed = start.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let mut stats = self.stats.lock();
        record_latency(&mut stats, elapsed);
        match outcome {
            Ok(Ok(results)) => {
                let response = SearchResponse::new(query, mode.as_str(), results, elapsed_ms);
                self.cache.put(key, response.clone());
                debug!(query, mode = %mode, total = response.total, elapsed_ms, "search");
                response
            }
            Ok(Err(e)) => {
                stats.errors += 1;
                warn!(query, mode = %mode, error = %e, "search failed");
                SearchResponse::failed(query, mode.as_str(), e, elapsed_ms)
            }
            Err(_) => {
                stats.timeouts += 1;
                warn!(query, mode = %mode, timeout_ms = self.timeout.as_millis() as u64, "search timed out");
                SearchResponse::failed(query, mode.as_str(), "search timed out", elapsed_ms)
            }
        }
    }

    pub fn stats(&self) -> SearchStats {
        let mut stats = self.stats.lock().clone();
        stats.cache_entries = self.cache.len();
        stats.cache_capacity = self.cache.capacity();
        stats
    }

    /// Drop every cached response; called whenever the index changes.
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

fn record_latency(stats: &mut SearchStats, elapsed: Duration) {
    stats.latency_samples += 1;
    let ms = elapsed.as_secs_f64() * 1000.0;
    stats.avg_latency_ms += (ms - stats.avg_latency_ms) / stats.latency_samples as f64;
}
