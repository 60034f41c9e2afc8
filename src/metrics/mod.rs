use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for the command and query buses
// ============================================================================
//
// Provides:
// - Request throughput per kind and type tag
// - Request failures per kind, type tag and error kind
// - Handler latency (wall clock around the composed handler)
// - Query cache hits and misses
//
// Each BusMetrics owns its registry so several buses (or tests) never clash
// on metric registration.
// ============================================================================

pub struct BusMetrics {
    registry: Registry,

    pub requests_total: IntCounterVec,
    pub request_errors_total: IntCounterVec,
    pub request_duration: HistogramVec,

    pub cache_hits_total: IntCounterVec,
    pub cache_misses_total: IntCounterVec,
}

impl BusMetrics {
    pub fn new(namespace: &str) -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Total requests dispatched through a bus")
                .namespace(namespace),
            &["kind", "type_tag"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_errors_total = IntCounterVec::new(
            Opts::new("request_errors_total", "Total requests that ended in an error")
                .namespace(namespace),
            &["kind", "type_tag", "error_kind"],
        )?;
        registry.register(Box::new(request_errors_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "Handler duration including inner middleware")
                .namespace(namespace)
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["kind", "type_tag"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let cache_hits_total = IntCounterVec::new(
            Opts::new("query_cache_hits_total", "Queries answered from the cache")
                .namespace(namespace),
            &["type_tag"],
        )?;
        registry.register(Box::new(cache_hits_total.clone()))?;

        let cache_misses_total = IntCounterVec::new(
            Opts::new("query_cache_misses_total", "Queries that reached their handler")
                .namespace(namespace),
            &["type_tag"],
        )?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_errors_total,
            request_duration,
            cache_hits_total,
            cache_misses_total,
        })
    }

    /// Get the Prometheus registry for exposing metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one dispatched request. `error_kind` is `None` on success.
    pub fn record_request(&self, kind: &str, type_tag: &str, duration_secs: f64, error_kind: Option<&str>) {
        self.requests_total.with_label_values(&[kind, type_tag]).inc();
        if let Some(error_kind) = error_kind {
            self.request_errors_total
                .with_label_values(&[kind, type_tag, error_kind])
                .inc();
        }
        self.request_duration
            .with_label_values(&[kind, type_tag])
            .observe(duration_secs);
    }

    /// Record a query cache lookup
    pub fn record_cache_lookup(&self, type_tag: &str, hit: bool) {
        if hit {
            self.cache_hits_total.with_label_values(&[type_tag]).inc();
        } else {
            self.cache_misses_total.with_label_values(&[type_tag]).inc();
        }
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
