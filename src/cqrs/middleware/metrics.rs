use std::sync::Arc;
use std::time::Instant;

use crate::context::Context;
use crate::cqrs::handler::{from_fn, BoxedPayload, BoxedResponse, HandlerFn, Middleware};
use crate::errors::{CqrsError, CqrsResult};
use crate::metrics::BusMetrics;

/// Counts requests, failures and latency. Never alters the result.
#[derive(Clone)]
pub struct MetricsMiddleware {
    metrics: Arc<BusMetrics>,
}

impl MetricsMiddleware {
    pub fn new(metrics: Arc<BusMetrics>) -> Self {
        Self { metrics }
    }
}

impl Middleware for MetricsMiddleware {
    fn wrap(&self, next: HandlerFn) -> HandlerFn {
        let metrics = self.metrics.clone();
        from_fn(move |ctx, payload| measure(metrics.clone(), next.clone(), ctx, payload))
    }
}

async fn measure(
    metrics: Arc<BusMetrics>,
    next: HandlerFn,
    ctx: Context,
    payload: BoxedPayload,
) -> CqrsResult<BoxedResponse> {
    let kind = payload.data.kind();
    let type_tag = payload.data.type_tag();

    let started = Instant::now();
    let result = next(ctx, payload).await;
    let error_kind = match &result {
        Ok(response) => response.error.as_ref().map(CqrsError::kind),
        Err(err) => Some(err.kind()),
    };

    metrics.record_request(kind.as_str(), type_tag, started.elapsed().as_secs_f64(), error_kind);
    result
}
