use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::cqrs::envelope::Body;
use crate::cqrs::handler::{from_fn, BoxedPayload, BoxedResponse, HandlerFn, Middleware};
use crate::errors::CqrsResult;
use crate::metrics::BusMetrics;

// ============================================================================
// Query Cache
// ============================================================================
//
// Key = "<type tag>:<fingerprint>", the fingerprint being the canonical JSON
// of the query's fields. Entries expire after `ttl`; when `capacity` is
// reached the oldest entry is evicted. Only successful responses are kept.
//
// ============================================================================

struct CacheEntry {
    response: BoxedResponse,
    stored_at: Instant,
}

pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
    metrics: Option<Arc<BusMetrics>>,
}

impl QueryCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
            metrics: None,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.cache_ttl, config.cache_capacity)
    }

    /// Count hits and misses in `query_cache_{hits,misses}_total`
    pub fn with_metrics(mut self, metrics: Arc<BusMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// `None` for bodies without a fingerprint (commands)
    pub fn cache_key(body: &Body) -> Option<String> {
        body.fingerprint()
            .map(|fingerprint| format!("{}:{}", body.type_tag(), fingerprint))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop every entry of one query type; returns how many were removed
    pub fn invalidate(&self, type_tag: &str) -> usize {
        let prefix = format!("{type_tag}:");
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - entries.len();

        tracing::debug!(type_tag = %type_tag, removed = removed, "Invalidated cached queries");
        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &str, type_tag: &str) -> Option<BoxedResponse> {
        let hit = {
            let mut entries = self.lock();
            let fresh = entries
                .get(key)
                .map(|entry| entry.stored_at.elapsed() <= self.ttl);
            match fresh {
                Some(true) => entries.get(key).map(|entry| entry.response.clone()),
                Some(false) => {
                    entries.remove(key);
                    None
                }
                None => None,
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(type_tag, hit.is_some());
        }
        hit
    }

    fn store(&self, key: String, response: BoxedResponse) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response,
                stored_at: Instant::now(),
            },
        );
    }
}

/// Serves repeated queries from a `QueryCache`. Commands pass straight through.
#[derive(Clone)]
pub struct CachingMiddleware {
    cache: Arc<QueryCache>,
}

impl CachingMiddleware {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }
}

impl Middleware for CachingMiddleware {
    fn wrap(&self, next: HandlerFn) -> HandlerFn {
        let cache = self.cache.clone();
        from_fn(move |ctx, payload| serve_cached(cache.clone(), next.clone(), ctx, payload))
    }
}

async fn serve_cached(
    cache: Arc<QueryCache>,
    next: HandlerFn,
    ctx: Context,
    payload: BoxedPayload,
) -> CqrsResult<BoxedResponse> {
    let Some(key) = QueryCache::cache_key(&payload.data) else {
        return next(ctx, payload).await;
    };
    let type_tag = payload.data.type_tag();

    if let Some(response) = cache.lookup(&key, type_tag) {
        ctx.logger().debug(
            "Query served from cache",
            &[("type", type_tag.to_string()), ("trace_id", payload.trace_id.clone())],
        );
        return Ok(response);
    }

    let result = next(ctx, payload).await;
    if let Ok(response) = &result {
        if response.is_success() && response.data.is_some() {
            cache.store(key, response.clone());
        }
    }
    result
}
